//! Network subsystem: the transport session the bridge runs against

pub mod loopback;
#[cfg(test)]
pub(crate) mod mock;
pub mod transport;

pub use loopback::{LoopbackConfig, LoopbackStats, LoopbackTransport};
pub use transport::{NetTransport, SessionParams, SyncOutcome};
