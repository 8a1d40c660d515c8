//! The N4 side of the replayer: request rewriting, transactions and the UDP channel.

pub mod modifier;
pub mod transaction;
pub mod transport;

pub use modifier::MessageModifier;
pub use transaction::{TransactionOutcome, TransactionResult, TransactionTracker};
pub use transport::{run_receiver, Transport, UdpTransport};
