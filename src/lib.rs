//! Replays recorded PFCP control traffic against a live UPF.
//!
//! Recorded requests are rewritten per session (SEIDs, UE addresses, sequence
//! numbers, node identity) so that a capture taken against one UPF drives a
//! different one, then sent over N4 one at a time with retransmission.

pub mod config;
pub mod error;
pub mod mockupf;
pub mod n4;
pub mod pcap;
pub mod sequence;
pub mod session;
pub mod stats;

pub use config::Config;
pub use error::{ReplayError, Result};
