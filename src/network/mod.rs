//! Connectivity tracking.

mod monitor;

pub use crate::record::Connectivity;
pub use monitor::NetworkMonitor;
