use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed set of state changes the dashboard records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    OperationCreated,
    OperationUpdated,
    OperationClosed,
    CountyAdded,
    CountyRemoved,
    ServiceLineUpdated,
    FacilityCreated,
    FacilityUpdated,
    FacilityRemoved,
    ShelterOpened,
    ShelterClosed,
    ContactAdded,
    ContactRemoved,
    IapSectionUpdated,
    SyncStarted,
    SyncCompleted,
    SyncFailed,
    OnlineMode,
    OfflineMode,
    QueueEvicted,
}

impl EventKind {
    pub const ALL: [EventKind; 20] = [
        EventKind::OperationCreated,
        EventKind::OperationUpdated,
        EventKind::OperationClosed,
        EventKind::CountyAdded,
        EventKind::CountyRemoved,
        EventKind::ServiceLineUpdated,
        EventKind::FacilityCreated,
        EventKind::FacilityUpdated,
        EventKind::FacilityRemoved,
        EventKind::ShelterOpened,
        EventKind::ShelterClosed,
        EventKind::ContactAdded,
        EventKind::ContactRemoved,
        EventKind::IapSectionUpdated,
        EventKind::SyncStarted,
        EventKind::SyncCompleted,
        EventKind::SyncFailed,
        EventKind::OnlineMode,
        EventKind::OfflineMode,
        EventKind::QueueEvicted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::OperationCreated => "operation-created",
            EventKind::OperationUpdated => "operation-updated",
            EventKind::OperationClosed => "operation-closed",
            EventKind::CountyAdded => "county-added",
            EventKind::CountyRemoved => "county-removed",
            EventKind::ServiceLineUpdated => "service-line-updated",
            EventKind::FacilityCreated => "facility-created",
            EventKind::FacilityUpdated => "facility-updated",
            EventKind::FacilityRemoved => "facility-removed",
            EventKind::ShelterOpened => "shelter-opened",
            EventKind::ShelterClosed => "shelter-closed",
            EventKind::ContactAdded => "contact-added",
            EventKind::ContactRemoved => "contact-removed",
            EventKind::IapSectionUpdated => "iap-section-updated",
            EventKind::SyncStarted => "sync-started",
            EventKind::SyncCompleted => "sync-completed",
            EventKind::SyncFailed => "sync-failed",
            EventKind::OnlineMode => "online-mode",
            EventKind::OfflineMode => "offline-mode",
            EventKind::QueueEvicted => "queue-evicted",
        }
    }

    /// The kind that undoes this one, when the pairing is unambiguous.
    ///
    /// Updates have no natural inverse; callers that want them reversible
    /// must supply an explicit `InverseDescriptor` carrying the prior value.
    pub fn inverse(&self) -> Option<EventKind> {
        match self {
            EventKind::CountyAdded => Some(EventKind::CountyRemoved),
            EventKind::CountyRemoved => Some(EventKind::CountyAdded),
            EventKind::FacilityCreated => Some(EventKind::FacilityRemoved),
            EventKind::FacilityRemoved => Some(EventKind::FacilityCreated),
            EventKind::ShelterOpened => Some(EventKind::ShelterClosed),
            EventKind::ShelterClosed => Some(EventKind::ShelterOpened),
            EventKind::ContactAdded => Some(EventKind::ContactRemoved),
            EventKind::ContactRemoved => Some(EventKind::ContactAdded),
            _ => None,
        }
    }

    /// Status kinds are dispatched to listeners but never queued for the
    /// remote sink or recorded in undo history.
    pub fn is_local_only(&self) -> bool {
        matches!(
            self,
            EventKind::SyncStarted
                | EventKind::SyncCompleted
                | EventKind::SyncFailed
                | EventKind::OnlineMode
                | EventKind::OfflineMode
                | EventKind::QueueEvicted
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}
