use std::{
	fmt::Write as _,
	fs,
	net::{IpAddr, Ipv4Addr, SocketAddr},
	path::Path,
	time::Duration,
};

use cidr::Ipv4Inet;
use serde::{Deserialize, Serialize};

use crate::{
	error::{ReplayError, Result},
	session::{ManagerOptions, SeidStrategy},
};

/// Looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	pub smf: SmfConfig,
	pub upf: UpfConfig,
	pub association: AssociationConfig,
	pub session: SessionConfig,
	pub timing: TimingConfig,
	pub input: InputConfig,
	pub logging: LoggingConfig,
	pub stats: StatsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmfConfig {
	/// Local address the replayer binds to and announces in the CP F-SEID
	pub address: String,
	pub port: u16,
	/// Node ID announced to the peer, `address` when empty
	pub node_id: String,
}

impl Default for SmfConfig {
	fn default() -> Self {
		SmfConfig {
			address: String::new(),
			port: libpfcp::PFCP_PORT,
			node_id: String::new(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpfConfig {
	pub address: String,
	pub port: u16,
}

impl Default for UpfConfig {
	fn default() -> Self {
		UpfConfig {
			address: String::new(),
			port: libpfcp::PFCP_PORT,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
	pub enabled: bool,
}

impl Default for AssociationConfig {
	fn default() -> Self {
		AssociationConfig { enabled: true }
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
	pub seid_start: u64,
	pub seid_strategy: String,
	pub ue_ip_pool: String,
	pub strip_ipv6: bool,
	pub cleanup_on_exit: bool,
	pub issue_broadcast_address: bool,
	pub strict_session_lookup: bool,
}

impl Default for SessionConfig {
	fn default() -> Self {
		SessionConfig {
			seid_start: 1,
			seid_strategy: "sequential".to_string(),
			ue_ip_pool: String::new(),
			strip_ipv6: true,
			cleanup_on_exit: false,
			issue_broadcast_address: true,
			strict_session_lookup: false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
	pub message_interval_ms: u64,
	pub response_timeout_ms: u64,
	pub max_retries: u32,
}

impl Default for TimingConfig {
	fn default() -> Self {
		TimingConfig {
			message_interval_ms: 100,
			response_timeout_ms: 5000,
			max_retries: 3,
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
	pub pcap_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
	pub level: String,
	/// Appended to when set
	pub file: String,
	pub console: bool,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		LoggingConfig {
			level: "info".to_string(),
			file: String::new(),
			console: true,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
	pub enabled: bool,
	pub report_interval_sec: u64,
	pub export_file: String,
}

impl Default for StatsConfig {
	fn default() -> Self {
		StatsConfig {
			enabled: true,
			report_interval_sec: 10,
			export_file: String::new(),
		}
	}
}

/// Command line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
	pub pcap_file: Option<String>,
	pub smf_ip: Option<String>,
	pub upf_ip: Option<String>,
	pub upf_port: Option<u16>,
	pub ue_pool: Option<String>,
	pub seid_start: Option<u64>,
	pub seid_strategy: Option<String>,
	pub message_interval_ms: Option<u64>,
	pub response_timeout_ms: Option<u64>,
	pub max_retries: Option<u32>,
	pub log_level: Option<String>,
	pub cleanup: bool,
	pub no_association: bool,
	pub strip_ipv6: Option<bool>,
}

impl Config {
	/// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_FILE`] is used if present.
	pub fn load(path: Option<&Path>) -> Result<Config> {
		let (path, required) = match path {
			Some(p) => (p, true),
			None => (Path::new(DEFAULT_CONFIG_FILE), false),
		};
		let text = match fs::read_to_string(path) {
			Ok(t) => t,
			Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
			Err(e) => {
				return Err(ReplayError::Config(format!(
					"cannot read config file {}: {}",
					path.display(),
					e
				)))
			}
		};
		Config::from_yaml(&text)
			.map_err(|e| ReplayError::Config(format!("{}: {}", path.display(), e)))
	}

	pub fn from_yaml(text: &str) -> Result<Config> {
		if text.trim().is_empty() {
			return Ok(Config::default());
		}
		serde_yaml::from_str(text).map_err(|e| ReplayError::Config(e.to_string()))
	}

	pub fn apply(&mut self, cli: &CliOverrides) {
		if let Some(v) = &cli.pcap_file {
			self.input.pcap_file = v.clone();
		}
		if let Some(v) = &cli.smf_ip {
			self.smf.address = v.clone();
		}
		if let Some(v) = &cli.upf_ip {
			self.upf.address = v.clone();
		}
		if let Some(v) = cli.upf_port {
			self.upf.port = v;
		}
		if let Some(v) = &cli.ue_pool {
			self.session.ue_ip_pool = v.clone();
		}
		if let Some(v) = cli.seid_start {
			self.session.seid_start = v;
		}
		if let Some(v) = &cli.seid_strategy {
			self.session.seid_strategy = v.clone();
		}
		if let Some(v) = cli.message_interval_ms {
			self.timing.message_interval_ms = v;
		}
		if let Some(v) = cli.response_timeout_ms {
			self.timing.response_timeout_ms = v;
		}
		if let Some(v) = cli.max_retries {
			self.timing.max_retries = v;
		}
		if let Some(v) = &cli.log_level {
			self.logging.level = v.clone();
		}
		if cli.cleanup {
			self.session.cleanup_on_exit = true;
		}
		if cli.no_association {
			self.association.enabled = false;
		}
		if let Some(v) = cli.strip_ipv6 {
			self.session.strip_ipv6 = v;
		}
	}

	/// Everything a live run needs, first violation wins
	pub fn validate(&self) -> Result<()> {
		parse_ip("smf.address", &self.smf.address)?;
		if self.smf.port == 0 {
			return Err(invalid("smf.port must be non-zero"));
		}
		if !self.smf.node_id.is_empty() {
			parse_ip("smf.node_id", &self.smf.node_id)?;
		}
		parse_ip("upf.address", &self.upf.address)?;
		if self.upf.port == 0 {
			return Err(invalid("upf.port must be non-zero"));
		}
		self.validate_for_dry_run()?;
		if self.session.seid_start == 0 {
			return Err(invalid("session.seid_start must be greater than 0"));
		}
		self.seid_strategy()?;
		if self.timing.response_timeout_ms == 0 {
			return Err(invalid("timing.response_timeout_ms must be greater than 0"));
		}
		match self.logging.level.as_str() {
			"debug" | "info" | "warn" | "error" => Ok(()),
			other => Err(invalid(&format!(
				"logging.level {:?} is not one of debug, info, warn, error",
				other
			))),
		}
	}

	/// Offline rewriting only needs the recording and the UE pool
	pub fn validate_for_dry_run(&self) -> Result<()> {
		if self.input.pcap_file.is_empty() {
			return Err(invalid("input.pcap_file is required"));
		}
		if !Path::new(&self.input.pcap_file).is_file() {
			return Err(invalid(&format!("pcap file {} does not exist", self.input.pcap_file)));
		}
		if self.session.ue_ip_pool.is_empty() {
			return Err(invalid("session.ue_ip_pool is required"));
		}
		self.session
			.ue_ip_pool
			.trim()
			.parse::<Ipv4Inet>()
			.map_err(|e| invalid(&format!("session.ue_ip_pool {:?}: {}", self.session.ue_ip_pool, e)))?;
		Ok(())
	}

	pub fn seid_strategy(&self) -> Result<SeidStrategy> {
		self.session.seid_strategy.parse()
	}

	pub fn smf_ip(&self) -> Option<IpAddr> {
		self.smf.address.parse().ok()
	}

	pub fn node_id(&self) -> Option<IpAddr> {
		self.smf.node_id.parse().ok()
	}

	/// Where the replayer binds, the unspecified address when no SMF address is set
	pub fn local_addr(&self) -> SocketAddr {
		let ip = self.smf_ip().unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
		SocketAddr::new(ip, self.smf.port)
	}

	pub fn upf_addr(&self) -> Result<SocketAddr> {
		Ok(SocketAddr::new(parse_ip("upf.address", &self.upf.address)?, self.upf.port))
	}

	pub fn message_interval(&self) -> Duration {
		Duration::from_millis(self.timing.message_interval_ms)
	}

	pub fn response_timeout(&self) -> Duration {
		Duration::from_millis(self.timing.response_timeout_ms)
	}

	pub fn manager_options(&self) -> ManagerOptions {
		ManagerOptions {
			smf_ip: self.smf_ip(),
			node_id: self.node_id(),
			strip_ipv6: self.session.strip_ipv6,
			association_enabled: self.association.enabled,
			message_interval: self.message_interval(),
			strict_session_lookup: self.session.strict_session_lookup,
		}
	}

	pub fn summary(&self) -> String {
		let or_unset = |s: &str| if s.is_empty() { "(unset)".to_string() } else { s.to_string() };
		let mut out = String::new();
		let _ = writeln!(out, "=== PFCP Replay Configuration ===");
		let _ = writeln!(out, "SMF:          {}:{}", or_unset(&self.smf.address), self.smf.port);
		if !self.smf.node_id.is_empty() {
			let _ = writeln!(out, "Node ID:      {}", self.smf.node_id);
		}
		let _ = writeln!(out, "UPF:          {}:{}", or_unset(&self.upf.address), self.upf.port);
		let _ = writeln!(out, "PCAP:         {}", or_unset(&self.input.pcap_file));
		let _ = writeln!(out, "UE IP pool:   {}", or_unset(&self.session.ue_ip_pool));
		let _ = writeln!(
			out,
			"SEID:         start={} strategy={}",
			self.session.seid_start, self.session.seid_strategy
		);
		let _ = writeln!(
			out,
			"Timing:       interval={}ms timeout={}ms retries={}",
			self.timing.message_interval_ms, self.timing.response_timeout_ms, self.timing.max_retries
		);
		let _ = writeln!(
			out,
			"Options:      association={} strip_ipv6={} cleanup={}",
			self.association.enabled, self.session.strip_ipv6, self.session.cleanup_on_exit
		);
		let _ = write!(out, "=================================");
		out
	}
}

fn invalid(msg: &str) -> ReplayError {
	ReplayError::Config(msg.to_string())
}

fn parse_ip(field: &str, value: &str) -> Result<IpAddr> {
	if value.is_empty() {
		return Err(invalid(&format!("{} is required", field)));
	}
	value
		.parse()
		.map_err(|_| invalid(&format!("{} {:?} is not an IP address", field, value)))
}

#[cfg(test)]
mod test {
	use super::*;
	use std::io::Write;

	fn valid(pcap: &Path) -> Config {
		let mut cfg = Config::default();
		cfg.smf.address = "10.0.0.1".into();
		cfg.upf.address = "10.0.0.2".into();
		cfg.session.ue_ip_pool = "10.60.0.0/16".into();
		cfg.input.pcap_file = pcap.to_string_lossy().into_owned();
		cfg
	}

	#[test]
	fn test_defaults_fill_missing_fields() {
		let cfg = Config::from_yaml("upf:\n  address: 10.0.0.2\ntiming:\n  max_retries: 5\n").unwrap();
		assert_eq!(cfg.upf.address, "10.0.0.2");
		assert_eq!(cfg.upf.port, 8805);
		assert_eq!(cfg.smf.port, 8805);
		assert_eq!(cfg.timing.max_retries, 5);
		assert_eq!(cfg.timing.response_timeout_ms, 5000);
		assert_eq!(cfg.timing.message_interval_ms, 100);
		assert!(cfg.association.enabled);
		assert!(cfg.session.strip_ipv6);
		assert_eq!(cfg.session.seid_strategy, "sequential");
		assert_eq!(cfg.logging.level, "info");
		assert_eq!(cfg.stats.report_interval_sec, 10);
		assert_eq!(Config::from_yaml("").unwrap(), Config::default());
	}

	#[test]
	fn test_load_explicit_path() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "session:\n  seid_start: 4096\n  seid_strategy: random").unwrap();
		let cfg = Config::load(Some(file.path())).unwrap();
		assert_eq!(cfg.session.seid_start, 4096);
		assert_eq!(cfg.seid_strategy().unwrap(), SeidStrategy::Random);

		let missing = file.path().with_extension("missing");
		assert!(matches!(Config::load(Some(&missing)), Err(ReplayError::Config(_))));
	}

	#[test]
	fn test_load_rejects_bad_yaml() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "timing:\n  max_retries: lots").unwrap();
		assert!(matches!(Config::load(Some(file.path())), Err(ReplayError::Config(_))));
	}

	#[test]
	fn test_cli_overrides_file() {
		let mut cfg = Config::from_yaml("association:\n  enabled: true\nupf:\n  port: 9000\n").unwrap();
		cfg.apply(&CliOverrides {
			upf_ip: Some("192.168.0.9".into()),
			max_retries: Some(0),
			no_association: true,
			cleanup: true,
			strip_ipv6: Some(false),
			..Default::default()
		});
		assert_eq!(cfg.upf.address, "192.168.0.9");
		assert_eq!(cfg.upf.port, 9000);
		assert_eq!(cfg.timing.max_retries, 0);
		assert!(!cfg.association.enabled);
		assert!(cfg.session.cleanup_on_exit);
		assert!(!cfg.session.strip_ipv6);
		assert_eq!(cfg.upf_addr().unwrap(), "192.168.0.9:9000".parse().unwrap());
	}

	#[test]
	fn test_validate() {
		let pcap = tempfile::NamedTempFile::new().unwrap();
		let cfg = valid(pcap.path());
		assert!(cfg.validate().is_ok());

		let mut bad = cfg.clone();
		bad.upf.address = "upf.local".into();
		assert!(bad.validate().is_err());

		let mut bad = cfg.clone();
		bad.smf.node_id = "nope".into();
		assert!(bad.validate().is_err());

		let mut bad = cfg.clone();
		bad.session.ue_ip_pool = "10.60.0.0/33".into();
		assert!(bad.validate().is_err());

		let mut bad = cfg.clone();
		bad.session.seid_start = 0;
		assert!(bad.validate().is_err());

		let mut bad = cfg.clone();
		bad.session.seid_strategy = "shuffled".into();
		assert!(bad.validate().is_err());

		let mut bad = cfg.clone();
		bad.timing.response_timeout_ms = 0;
		assert!(bad.validate().is_err());

		let mut bad = cfg.clone();
		bad.logging.level = "trace".into();
		assert!(bad.validate().is_err());

		let mut bad = cfg;
		bad.input.pcap_file = "/nonexistent/capture.pcap".into();
		assert!(bad.validate().is_err());
	}

	#[test]
	fn test_dry_run_needs_no_addresses() {
		let pcap = tempfile::NamedTempFile::new().unwrap();
		let mut cfg = valid(pcap.path());
		cfg.smf.address.clear();
		cfg.upf.address.clear();
		assert!(cfg.validate().is_err());
		assert!(cfg.validate_for_dry_run().is_ok());
		assert_eq!(cfg.local_addr(), "0.0.0.0:8805".parse().unwrap());
		assert_eq!(cfg.manager_options().smf_ip, None);
	}

	#[test]
	fn test_summary_mentions_endpoints() {
		let pcap = tempfile::NamedTempFile::new().unwrap();
		let summary = valid(pcap.path()).summary();
		assert!(summary.contains("10.0.0.1:8805"));
		assert!(summary.contains("10.60.0.0/16"));
	}
}
