use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use libpfcp::PFCPMessage;
use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use super::transaction::TransactionTracker;
use crate::error::{ReplayError, Result};

/// Outbound half of the N4 channel towards the peer under test
#[async_trait]
pub trait Transport: Send + Sync {
	async fn send(&self, data: &[u8]) -> Result<()>;
}

/// One UDP socket bound to the local PFCP address, talking to one fixed peer.
pub struct UdpTransport {
	socket: Arc<UdpSocket>,
	peer: SocketAddr,
}

impl UdpTransport {
	pub async fn bind(local: SocketAddr, peer: SocketAddr) -> Result<UdpTransport> {
		let socket = UdpSocket::bind(local)
			.await
			.map_err(|e| ReplayError::Transport(format!("failed to bind UDP to {}: {}", local, e)))?;
		info!("PFCP socket bound to {}, peer {}", socket.local_addr()?, peer);
		Ok(UdpTransport {
			socket: Arc::new(socket),
			peer,
		})
	}

	/// Shared with the receive loop
	pub fn socket(&self) -> Arc<UdpSocket> {
		self.socket.clone()
	}

	pub fn peer(&self) -> SocketAddr {
		self.peer
	}

	pub fn local_addr(&self) -> Result<SocketAddr> {
		Ok(self.socket.local_addr()?)
	}
}

#[async_trait]
impl Transport for UdpTransport {
	async fn send(&self, data: &[u8]) -> Result<()> {
		self.socket
			.send_to(data, self.peer)
			.await
			.map_err(|e| ReplayError::Transport(format!("failed to send to {}: {}", self.peer, e)))?;
		Ok(())
	}
}

/// Read responses from `peer` off `socket` and hand them to the tracker until
/// `token` fires. Datagrams from any other source are dropped.
pub async fn run_receiver(
	socket: Arc<UdpSocket>,
	peer: SocketAddr,
	tracker: Arc<TransactionTracker>,
	token: CancellationToken,
) {
	let mut buf = vec![0u8; 65535];
	loop {
		let (n, from) = tokio::select! {
			_ = token.cancelled() => break,
			r = socket.recv_from(&mut buf) => match r {
				Ok(r) => r,
				Err(e) => {
					warn!("Error reading from UDP: {}", e);
					continue;
				}
			}
		};
		if from != peer {
			warn!("Discarding {} octets from unexpected source {}, expected {}", n, from, peer);
			continue;
		}
		let msg = match PFCPMessage::decode(&buf[..n]) {
			Ok(m) => m,
			Err(e) => {
				warn!("Failed to parse PFCP message from {}: {}", from, e);
				continue;
			}
		};
		if msg.header.is_request() {
			debug!("Ignoring {} request from {}", msg.type_name(), from);
			continue;
		}
		debug!("Received {} seq {} from {}", msg.type_name(), msg.seq(), from);
		tracker.resolve(msg);
	}
	debug!("Receiver stopped");
}

#[cfg(test)]
pub mod test_util {
	use std::sync::Mutex;

	use super::*;

	/// Keeps every datagram instead of sending it
	#[derive(Default)]
	pub struct RecordingTransport {
		sent: Mutex<Vec<Vec<u8>>>,
	}

	impl RecordingTransport {
		pub fn sent(&self) -> Vec<Vec<u8>> {
			self.sent.lock().unwrap().clone()
		}
	}

	#[async_trait]
	impl Transport for RecordingTransport {
		async fn send(&self, data: &[u8]) -> Result<()> {
			self.sent.lock().unwrap().push(data.to_vec());
			Ok(())
		}
	}
}
