use std::sync::Arc;
use std::time::Duration;

use audit_bus::{
    BusConfig, EventBus, InMemorySink, NetworkMonitor, RetryPolicy, SyncConfig, SyncProcessor,
};

pub struct Field {
    pub bus: EventBus,
    pub monitor: NetworkMonitor,
    pub sink: InMemorySink,
    pub processor: Arc<SyncProcessor>,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A bus wired to an in-memory sink through a jitter-free processor.
pub fn field(sync: SyncConfig) -> Field {
    init_tracing();
    let bus = EventBus::in_memory(BusConfig::default().with_actor("shelter-lead"));
    field_for(bus, sync)
}

pub fn field_for(bus: EventBus, sync: SyncConfig) -> Field {
    let sink = InMemorySink::new();
    let policy = RetryPolicy::new(&sync).without_jitter();
    let processor = SyncProcessor::new(bus.clone(), Arc::new(sink.clone()), sync).with_policy(policy);
    Field {
        monitor: NetworkMonitor::new(bus.clone()),
        bus,
        sink,
        processor: Arc::new(processor),
    }
}

/// Poll until the bus queue is empty, letting (paused) time move forward.
pub async fn wait_until_drained(bus: &EventBus) -> bool {
    for _ in 0..100 {
        if bus.queued_len() == 0 {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    bus.queued_len() == 0
}
