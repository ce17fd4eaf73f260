use std::collections::BTreeMap;

use tracing::warn;

use crate::record::{EventKind, InverseDescriptor};

/// How an emitted event can be undone.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Reversibility {
    /// Reversible when the kind has a natural inverse; the inverse carries the
    /// same payload.
    #[default]
    Natural,
    Irreversible,
    Inverse(InverseDescriptor),
}

impl Reversibility {
    pub(crate) fn resolve(self, kind: EventKind, payload: &serde_json::Value) -> Option<InverseDescriptor> {
        if kind.is_local_only() {
            return None;
        }
        match self {
            Reversibility::Natural => kind
                .inverse()
                .map(|inverse| InverseDescriptor::new(inverse, payload.clone())),
            Reversibility::Irreversible => None,
            Reversibility::Inverse(descriptor) if descriptor.kind.is_local_only() => {
                warn!(
                    kind = %kind,
                    inverse = %descriptor.kind,
                    "status kinds cannot undo an action; emitting as irreversible"
                );
                None
            }
            Reversibility::Inverse(descriptor) => Some(descriptor),
        }
    }
}

/// Per-emit knobs beyond kind and payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EmitOptions {
    pub reversibility: Reversibility,
    pub extra: BTreeMap<String, String>,
}

impl EmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn irreversible(mut self) -> Self {
        self.reversibility = Reversibility::Irreversible;
        self
    }

    pub fn with_inverse(mut self, inverse: InverseDescriptor) -> Self {
        self.reversibility = Reversibility::Inverse(inverse);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}
