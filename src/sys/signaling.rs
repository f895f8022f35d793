use std::cell::RefCell;

use async_trait::async_trait;
use futures::{
    channel::mpsc,
    stream::{self, LocalBoxStream},
    StreamExt as _,
};

use crate::{error::TransportError, proto::SignalingMessage};

#[async_trait(?Send)]
pub trait SignalingTransport {
    async fn send(&self, message: SignalingMessage) -> Result<(), TransportError>;

    /// Stream of incoming messages. Only the first call receives messages.
    fn on_message(&self) -> LocalBoxStream<'static, SignalingMessage>;
}

/// In-memory [`SignalingTransport`] connected to its pair.
pub struct LoopbackSignaling {
    tx: mpsc::UnboundedSender<SignalingMessage>,
    rx: RefCell<Option<mpsc::UnboundedReceiver<SignalingMessage>>>,
}

impl LoopbackSignaling {
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded();
        let (b_tx, b_rx) = mpsc::unbounded();
        (
            Self {
                tx: b_tx,
                rx: RefCell::new(Some(a_rx)),
            },
            Self {
                tx: a_tx,
                rx: RefCell::new(Some(b_rx)),
            },
        )
    }

    /// Stops delivering outgoing messages.
    pub fn disconnect(&self) {
        self.tx.close_channel();
    }
}

#[async_trait(?Send)]
impl SignalingTransport for LoopbackSignaling {
    async fn send(&self, message: SignalingMessage) -> Result<(), TransportError> {
        self.tx
            .unbounded_send(message)
            .map_err(|_| TransportError::Closed)
    }

    fn on_message(&self) -> LocalBoxStream<'static, SignalingMessage> {
        match self.rx.borrow_mut().take() {
            Some(rx) => rx.boxed_local(),
            None => stream::empty().boxed_local(),
        }
    }
}
