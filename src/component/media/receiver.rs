use std::rc::Rc;

use futures::stream::LocalBoxStream;
use medea_reactive::ObservableCell;

use crate::proto::{MediaKind, TransceiverDirection};

/// Media section received from the remote party, as answered locally.
pub struct Receiver {
    mid: String,
    kind: MediaKind,
    direction: ObservableCell<TransceiverDirection>,
}

impl Receiver {
    pub fn new(
        mid: impl Into<String>,
        kind: MediaKind,
        direction: TransceiverDirection,
    ) -> Rc<Self> {
        Rc::new(Self {
            mid: mid.into(),
            kind,
            direction: ObservableCell::new(direction),
        })
    }

    pub fn mid(&self) -> &str {
        &self.mid
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn direction(&self) -> TransceiverDirection {
        self.direction.get()
    }

    pub fn is_receiving(&self) -> bool {
        self.direction.get().is_recv()
    }

    pub fn on_direction_change(
        &self,
    ) -> LocalBoxStream<'static, TransceiverDirection> {
        self.direction.subscribe()
    }

    pub(crate) fn set_direction(&self, direction: TransceiverDirection) {
        if self.direction.get() != direction {
            tracing::info!(
                mid = %self.mid,
                kind = %self.kind,
                %direction,
                "Receiver direction changed",
            );
            self.direction.set(direction);
        }
    }
}
