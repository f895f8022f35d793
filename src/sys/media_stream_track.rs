use std::cell::Cell;

use crate::proto::MediaKind;

#[derive(Debug)]
pub struct MediaStreamTrack {
    id: String,
    kind: MediaKind,
    enabled: Cell<bool>,
}

impl MediaStreamTrack {
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: Cell::new(true),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        tracing::debug!(track = %self.id, kind = %self.kind, enabled, "Set enabled");
        self.enabled.set(enabled);
    }

    pub fn set_muted(&self, muted: bool) {
        self.set_enabled(!muted);
    }
}
