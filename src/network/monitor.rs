use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::bus::EventBus;
use crate::record::{Connectivity, EventKind};

/// Turns host connectivity notifications into bus events.
///
/// Each real transition emits `online-mode` or `offline-mode`; going online
/// also wakes the sync processor. Reporting the current state again does
/// nothing.
#[derive(Clone)]
pub struct NetworkMonitor {
    bus: EventBus,
}

impl NetworkMonitor {
    pub fn new(bus: EventBus) -> Self {
        NetworkMonitor { bus }
    }

    pub fn connectivity(&self) -> Connectivity {
        self.bus.connectivity()
    }

    /// Record the host's current connectivity. Returns true on a transition.
    pub fn report(&self, connectivity: Connectivity) -> bool {
        let previous = self.bus.swap_connectivity(connectivity);
        if previous == connectivity {
            return false;
        }

        info!(from = ?previous, to = ?connectivity, "connectivity changed");
        match connectivity {
            Connectivity::Online => {
                self.bus
                    .emit_status(EventKind::OnlineMode, json!({ "queued": self.bus.queued_len() }));
                self.bus.sync_wake().notify_waiters();
            }
            Connectivity::Offline => {
                self.bus
                    .emit_status(EventKind::OfflineMode, json!({ "queued": self.bus.queued_len() }));
            }
        }
        true
    }

    pub fn set_online(&self) -> bool {
        self.report(Connectivity::Online)
    }

    pub fn set_offline(&self) -> bool {
        self.report(Connectivity::Offline)
    }

    /// Follow a host connectivity signal until its sender is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch(&self, mut signal: watch::Receiver<Connectivity>) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let current = *signal.borrow_and_update();
            monitor.report(current);
            while signal.changed().await.is_ok() {
                let current = *signal.borrow_and_update();
                monitor.report(current);
            }
        })
    }
}
