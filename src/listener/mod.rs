//! Listener registry: in-memory dispatch of event records to subscribers,
//! keyed by event kind.

mod once;
mod registry;

pub use once::Once;
pub use registry::{DispatchReport, Handler, ListenerId, ListenerRegistry, Subscription, SubscriptionGuard};
