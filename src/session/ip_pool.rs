use std::{collections::HashSet, net::Ipv4Addr, sync::Mutex};

use cidr::Ipv4Inet;

use crate::error::{ReplayError, Result};

#[derive(Debug)]
struct PoolState {
	cursor: u64,
	allocated: HashSet<Ipv4Addr>,
}

/// UE IPv4 addresses carved from one CIDR block.
///
/// The network address is never issued. Whether the top address of the block
/// is issued is decided at construction.
#[derive(Debug)]
pub struct IpPool {
	network: Ipv4Addr,
	prefix: u8,
	first: u64,
	/// One past the last issuable address
	end: u64,
	state: Mutex<PoolState>,
}

impl IpPool {
	/// Host bits in `cidr` are ignored, "10.60.0.7/24" is the 10.60.0.0/24 block.
	pub fn new(cidr: &str, issue_broadcast: bool) -> Result<IpPool> {
		let inet: Ipv4Inet = cidr
			.trim()
			.parse()
			.map_err(|e| ReplayError::Config(format!("invalid UE IP pool {:?}: {}", cidr, e)))?;
		let block = inet.network();
		let first = u64::from(u32::from(block.first_address())) + 1;
		let top = u64::from(u32::from(block.last_address()));
		// may be empty for /31 and /32 blocks
		let end = if issue_broadcast { top + 1 } else { top };
		let end = end.max(first);
		Ok(IpPool {
			network: block.first_address(),
			prefix: block.network_length(),
			first,
			end,
			state: Mutex::new(PoolState {
				cursor: first,
				allocated: HashSet::new(),
			}),
		})
	}

	pub fn capacity(&self) -> usize {
		(self.end - self.first) as usize
	}

	pub fn contains(&self, addr: Ipv4Addr) -> bool {
		let v = u64::from(u32::from(addr));
		v >= self.first && v < self.end
	}

	pub fn allocate(&self) -> Result<Ipv4Addr> {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		if state.cursor < self.first || state.cursor >= self.end {
			state.cursor = self.first;
		}
		for _ in 0..self.capacity() {
			let candidate = Ipv4Addr::from(state.cursor as u32);
			state.cursor = if state.cursor + 1 >= self.end {
				self.first
			} else {
				state.cursor + 1
			};
			if state.allocated.insert(candidate) {
				return Ok(candidate);
			}
		}
		Err(ReplayError::pool_exhausted(self.network, self.prefix))
	}

	/// Releasing an address that is not held is a no-op
	pub fn release(&self, addr: Ipv4Addr) {
		self.state.lock().unwrap_or_else(|e| e.into_inner()).allocated.remove(&addr);
	}

	pub fn available(&self) -> usize {
		let allocated = self.allocated_count();
		self.capacity().saturating_sub(allocated)
	}

	pub fn allocated_count(&self) -> usize {
		self.state.lock().unwrap_or_else(|e| e.into_inner()).allocated.len()
	}

	pub fn cidr(&self) -> String {
		format!("{}/{}", self.network, self.prefix)
	}
}
