use async_trait::async_trait;
use log::{debug, error, warn};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use super::messages::{PFCPMessage, IE};
use super::models::MsgType;
use std::{net::SocketAddr, sync::Arc};

/// Response header SEID and response IEs, or `None` to stay silent
pub type HandlerResult = Option<(Option<u64>, Vec<IE>)>;

#[async_trait]
pub trait SessionRequestHandlers {
	async fn handle_session_establishment(&self, request: &PFCPMessage, src: SocketAddr) -> HandlerResult;
	async fn handle_session_modification(&self, request: &PFCPMessage, src: SocketAddr) -> HandlerResult;
	async fn handle_session_deletion(&self, request: &PFCPMessage, src: SocketAddr) -> HandlerResult;
}

#[async_trait]
pub trait NodeRequestHandlers {
	async fn handle_heartbeat(&self, request: &PFCPMessage, src: SocketAddr) -> HandlerResult;
	async fn handle_association_setup(&self, request: &PFCPMessage, src: SocketAddr) -> HandlerResult;
}

async fn req_handle_task<C>(handlers: C, request: PFCPMessage, resp_socket: Arc<UdpSocket>, src_addr: SocketAddr)
where
	C: SessionRequestHandlers + NodeRequestHandlers + Send + Sync,
{
	let msg_type = match MsgType::from_u8(request.msg_type()) {
		Some(t) => t,
		None => {
			debug!("Ignoring message type {} from {}", request.msg_type(), src_addr);
			return;
		}
	};
	let response = match msg_type {
		MsgType::HeartbeatRequest => handlers.handle_heartbeat(&request, src_addr).await,
		MsgType::AssociationSetupRequest => handlers.handle_association_setup(&request, src_addr).await,
		MsgType::SessionEstablishmentRequest => handlers.handle_session_establishment(&request, src_addr).await,
		MsgType::SessionModificationRequest => handlers.handle_session_modification(&request, src_addr).await,
		MsgType::SessionDeletionRequest => handlers.handle_session_deletion(&request, src_addr).await,
		_ => {
			debug!("No handler for {} from {}", msg_type.name(), src_addr);
			return;
		}
	};
	let (seid, ies) = match response {
		Some(r) => r,
		None => return,
	};
	let response = PFCPMessage::response_to(&request, seid, ies);
	let resp_msg = match response.encode() {
		Ok(b) => b,
		Err(e) => {
			error!("Failed to encode {} response: {}", msg_type.name(), e);
			return;
		}
	};
	if let Err(e) = resp_socket.send_to(resp_msg.as_slice(), src_addr).await {
		error!("Failed to send response to {}: {}", src_addr, e);
	}
}

/// Answer PFCP requests arriving on `socket` until `shutdown` fires.
pub async fn serve<C>(handlers: C, socket: Arc<UdpSocket>, shutdown: CancellationToken)
where
	C: SessionRequestHandlers + NodeRequestHandlers + Send + Sync + Clone + 'static,
{
	let mut buf = vec![0u8; 65536];
	loop {
		let (number_of_bytes, src_addr) = tokio::select! {
			_ = shutdown.cancelled() => return,
			r = socket.recv_from(&mut buf) => match r {
				Ok(r) => r,
				Err(e) => {
					warn!("Receive error on request socket: {}", e);
					continue;
				}
			}
		};
		let request = match PFCPMessage::decode(&buf[..number_of_bytes]) {
			Ok(m) => m,
			Err(e) => {
				warn!("Failed to decode PFCP message from {}, message discarded: {}", src_addr, e);
				continue;
			}
		};
		if !request.header.is_request() {
			debug!("Response received on request socket from {}, ignored", src_addr);
			continue;
		}
		let handlers_cloned = handlers.clone();
		let socket_cloned = socket.clone();
		tokio::spawn(async move {
			req_handle_task(handlers_cloned, request, socket_cloned, src_addr).await;
		});
	}
}
