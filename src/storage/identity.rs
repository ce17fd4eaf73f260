use tracing::warn;
use uuid::Uuid;

use super::store::Storage;

const DEVICE_ID_KEY: &str = "audit_bus.device_id";

/// Device and session identifiers stamped onto every record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub session_id: String,
}

impl DeviceIdentity {
    /// Reuse the stored device id, minting and storing one on first run.
    /// The session id is always fresh.
    ///
    /// Storage failures fall back to an ephemeral device id.
    pub fn load_or_create(storage: &dyn Storage) -> Self {
        let stored = match storage.read(DEVICE_ID_KEY) {
            Ok(Some(bytes)) => String::from_utf8(bytes).ok().filter(|id| !id.is_empty()),
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "failed to read device id; using an ephemeral one");
                None
            }
        };

        let device_id = match stored {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                if let Err(err) = storage.write(DEVICE_ID_KEY, id.as_bytes()) {
                    warn!(error = %err, "failed to persist device id");
                }
                id
            }
        };

        DeviceIdentity {
            device_id,
            session_id: Uuid::new_v4().to_string(),
        }
    }
}
