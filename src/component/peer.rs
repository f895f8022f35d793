use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
};

use futures::{
    channel::oneshot, future, stream::LocalBoxStream, StreamExt as _,
};
use medea_reactive::ObservableCell;
use tokio::task::spawn_local;

use crate::{
    component,
    config::{Config, NegotiationConfig, SimulcastConfig},
    error::{CandidateApplyError, NegotiationError, RtcError},
    proto::{
        IceCandidate, MediaKind, OfferOptions, SessionDescription,
        SignalingMessage, TransceiverDirection, TransceiverInit,
    },
    sdp::SessionDescriptionModel,
    sys::{
        MediaStreamTrack, RtcPeerConnection, SignalingState,
        SignalingTransport,
    },
};

/// One side of a peer connection pair.
///
/// Owns the negotiation state of the session: at most one offer/answer
/// round is in flight, requests arriving meanwhile are dropped.
pub struct Peer {
    id: String,
    pc: Rc<dyn RtcPeerConnection>,
    transport: Rc<dyn SignalingTransport>,
    negotiation: NegotiationConfig,
    simulcast: SimulcastConfig,
    is_negotiating: ObservableCell<bool>,
    signaling_state: ObservableCell<SignalingState>,
    last_error: ObservableCell<Option<Rc<NegotiationError>>>,
    rounds: Cell<u32>,
    senders: RefCell<Vec<Rc<component::Sender>>>,
    receivers: RefCell<Vec<Rc<component::Receiver>>>,
    pending_candidates: RefCell<VecDeque<IceCandidate>>,
    pending_answer: RefCell<Option<oneshot::Sender<SessionDescription>>>,
    closed: Cell<bool>,
}

impl Peer {
    pub fn new(
        id: impl Into<String>,
        pc: Rc<dyn RtcPeerConnection>,
        transport: Rc<dyn SignalingTransport>,
        config: &Config,
    ) -> Rc<Self> {
        let signaling_state = pc.signaling_state();
        Rc::new(Self {
            id: id.into(),
            pc,
            transport,
            negotiation: config.negotiation.clone(),
            simulcast: config.simulcast.clone(),
            is_negotiating: ObservableCell::new(false),
            signaling_state: ObservableCell::new(signaling_state),
            last_error: ObservableCell::new(None),
            rounds: Cell::new(0),
            senders: RefCell::default(),
            receivers: RefCell::default(),
            pending_candidates: RefCell::default(),
            pending_answer: RefCell::new(None),
            closed: Cell::new(false),
        })
    }

    pub fn spawn_tasks(self: Rc<Self>) {
        Rc::clone(&self).spawn_on_signaling_state_change();
        Rc::clone(&self).spawn_on_ice_candidate();
        Rc::clone(&self).spawn_on_message();
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_negotiating(&self) -> bool {
        self.is_negotiating.get()
    }

    pub async fn when_negotiation_finished(&self) {
        let _ = self.is_negotiating.when_eq(false).await;
    }

    pub fn signaling_state(&self) -> SignalingState {
        self.signaling_state.get()
    }

    pub fn negotiation_rounds(&self) -> u32 {
        self.rounds.get()
    }

    pub fn last_error(&self) -> Option<Rc<NegotiationError>> {
        self.last_error.get()
    }

    pub fn on_error(&self) -> LocalBoxStream<'static, Rc<NegotiationError>> {
        self.last_error
            .subscribe()
            .skip(1)
            .filter_map(future::ready)
            .boxed_local()
    }

    pub fn senders(&self) -> Vec<Rc<component::Sender>> {
        self.senders.borrow().clone()
    }

    pub fn receivers(&self) -> Vec<Rc<component::Receiver>> {
        self.receivers.borrow().clone()
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.borrow().len()
    }

    /// Starts an offer/answer round unless one is already in flight.
    ///
    /// Returns `false` if the request was dropped. A dropped request is not
    /// retried.
    pub fn request_negotiation(self: &Rc<Self>) -> bool {
        if self.closed.get() {
            tracing::debug!(peer = %self.id, "Session closed, not negotiating");
            return false;
        }
        if self.is_negotiating.get() {
            tracing::debug!(peer = %self.id, "Skipping nested negotiation");
            return false;
        }
        self.is_negotiating.set(true);

        let this = Rc::clone(self);
        spawn_local(async move {
            let round = this.rounds.get() + 1;
            this.rounds.set(round);
            tracing::info!(peer = %this.id, round, "Negotiation started");

            match this.negotiate().await {
                Ok(()) => {
                    tracing::info!(peer = %this.id, round, "Negotiation finished");
                }
                Err(err) => {
                    this.report(err);
                    this.roll_back_pending_offer().await;
                    this.is_negotiating.set(false);
                }
            }
        });
        true
    }

    /// Releases the lock taken by [`Peer::request_negotiation`] once the
    /// engine settles in `Stable`.
    pub fn on_signaling_state_settled(&self, state: SignalingState) {
        tracing::debug!(peer = %self.id, ?state, "Signaling state settled");
        self.signaling_state.set(state);
        self.is_negotiating.set(state != SignalingState::Stable);
    }

    /// Applies a remote candidate, or queues it until a remote description
    /// is set. `None` marks the end of remote candidates.
    pub async fn on_remote_candidate(
        &self,
        candidate: Option<IceCandidate>,
    ) -> Result<(), CandidateApplyError> {
        let candidate = match candidate {
            Some(candidate) => candidate,
            None => {
                tracing::debug!(peer = %self.id, "All remote candidates received");
                return Ok(());
            }
        };

        if self.pc.has_remote_description() {
            self.apply_candidate(candidate).await
        } else {
            tracing::debug!(peer = %self.id, "Queueing early remote candidate");
            self.pending_candidates.borrow_mut().push_back(candidate);
            Ok(())
        }
    }

    /// Adds `track` on a new `sendrecv` transceiver, or on a free one of the
    /// same kind.
    pub fn add_track(
        self: &Rc<Self>,
        track: Rc<MediaStreamTrack>,
    ) -> Result<Rc<component::Sender>, RtcError> {
        self.add_transceiver(track, TransceiverInit::send_recv())
    }

    /// Adds `track` on a `sendonly` transceiver. Video gets the configured
    /// simulcast layers.
    pub fn add_simulcast_transceiver(
        self: &Rc<Self>,
        track: Rc<MediaStreamTrack>,
    ) -> Result<Rc<component::Sender>, RtcError> {
        let send_encodings = match track.kind() {
            MediaKind::Video => self.simulcast.encodings(),
            MediaKind::Audio => Vec::new(),
        };
        self.add_transceiver(
            track,
            TransceiverInit {
                direction: TransceiverDirection::SendOnly,
                send_encodings,
            },
        )
    }

    pub fn add_transceiver(
        self: &Rc<Self>,
        track: Rc<MediaStreamTrack>,
        init: TransceiverInit,
    ) -> Result<Rc<component::Sender>, RtcError> {
        let kind = track.kind();
        let id = self.pc.add_transceiver(Some(Rc::clone(&track)), init)?;

        let existing = self
            .senders
            .borrow()
            .iter()
            .find(|s| s.id() == id)
            .cloned();
        let sender = match existing {
            Some(sender) => {
                sender.bind(track);
                sender
            }
            None => {
                let sender = component::Sender::new(
                    id,
                    kind,
                    track,
                    Rc::clone(&self.pc),
                );
                self.senders.borrow_mut().push(Rc::clone(&sender));
                sender
            }
        };
        tracing::info!(peer = %self.id, %kind, transceiver = %id, "Track added");

        self.request_negotiation();
        Ok(sender)
    }

    /// Detaches the track of `sender`. The transceiver stays and loses its
    /// send direction, which the next round communicates to the remote side.
    pub fn remove_track(
        self: &Rc<Self>,
        sender: &component::Sender,
    ) -> Result<(), RtcError> {
        self.pc.remove_track(sender.id())?;
        sender.unbind();
        tracing::info!(
            peer = %self.id,
            kind = %sender.kind(),
            transceiver = %sender.id(),
            "Track removed",
        );

        self.request_negotiation();
        Ok(())
    }

    /// Errors of rounds still in flight are not reported after this.
    pub fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        tracing::info!(peer = %self.id, "Closing session");
        self.pending_answer.borrow_mut().take();
        self.pc.close();
    }

    fn spawn_on_signaling_state_change(self: Rc<Self>) {
        let mut on_state_change = self.pc.on_signaling_state_change();
        spawn_local(async move {
            while let Some(state) = on_state_change.next().await {
                self.on_signaling_state_settled(state);
            }
        });
    }

    fn spawn_on_ice_candidate(self: Rc<Self>) {
        let mut on_candidate = self.pc.on_ice_candidate();
        spawn_local(async move {
            while let Some(candidate) = on_candidate.next().await {
                if candidate.is_none() {
                    tracing::debug!(peer = %self.id, "All local candidates sent");
                }
                let msg = SignalingMessage::Candidate(candidate);
                if let Err(err) = self.transport.send(msg).await {
                    tracing::warn!(peer = %self.id, %err, "Failed to send candidate");
                }
            }
        });
    }

    fn spawn_on_message(self: Rc<Self>) {
        let mut on_message = self.transport.on_message();
        spawn_local(async move {
            while let Some(msg) = on_message.next().await {
                self.handle_message(msg).await;
            }
        });
    }

    async fn handle_message(&self, msg: SignalingMessage) {
        match msg {
            SignalingMessage::Offer(offer) => {
                if let Err(err) = self.handle_remote_offer(offer).await {
                    self.report(err);
                    self.roll_back_pending_offer().await;
                    self.is_negotiating.set(false);
                }
            }
            SignalingMessage::Answer(answer) => {
                match self.pending_answer.borrow_mut().take() {
                    Some(tx) => {
                        if tx.send(answer).is_err() {
                            tracing::debug!(
                                peer = %self.id,
                                "SDP answer arrived after the round ended",
                            );
                        }
                    }
                    None => {
                        tracing::warn!(peer = %self.id, "Unexpected SDP answer");
                    }
                }
            }
            SignalingMessage::Candidate(candidate) => {
                if let Err(err) = self.on_remote_candidate(candidate).await {
                    tracing::warn!(peer = %self.id, %err, "Candidate not applied");
                }
            }
        }
    }

    async fn negotiate(&self) -> Result<(), NegotiationError> {
        let options = if self.negotiation.force_sendonly {
            OfferOptions::send_only()
        } else {
            OfferOptions::default()
        };

        tracing::debug!(peer = %self.id, "createOffer()");
        let offer = self
            .pc
            .create_offer(options)
            .await
            .map_err(NegotiationError::CreateOffer)?;
        self.log_sdp(&offer);

        tracing::debug!(peer = %self.id, "setLocalDescription()");
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(NegotiationError::SetLocalDescription)?;

        let (tx, rx) = oneshot::channel();
        self.pending_answer.replace(Some(tx));
        if let Err(err) = self.transport.send(SignalingMessage::Offer(offer)).await {
            self.pending_answer.borrow_mut().take();
            return Err(err.into());
        }

        let timeout = self.negotiation.answer_timeout();
        let answer = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(oneshot::Canceled)) => return Err(NegotiationError::Closed),
            Err(_) => {
                self.pending_answer.borrow_mut().take();
                return Err(NegotiationError::AnswerTimeout(timeout));
            }
        };

        tracing::debug!(peer = %self.id, "setRemoteDescription()");
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(NegotiationError::SetRemoteDescription)?;
        self.flush_pending_candidates().await;
        Ok(())
    }

    async fn handle_remote_offer(
        &self,
        offer: SessionDescription,
    ) -> Result<(), NegotiationError> {
        if self.pc.signaling_state() == SignalingState::HaveLocalOffer {
            tracing::warn!(
                peer = %self.id,
                "Ignoring remote offer while own offer is in flight",
            );
            return Ok(());
        }
        self.log_sdp(&offer);

        tracing::debug!(peer = %self.id, "setRemoteDescription()");
        self.pc
            .set_remote_description(offer.clone())
            .await
            .map_err(NegotiationError::SetRemoteDescription)?;
        self.flush_pending_candidates().await;

        tracing::debug!(peer = %self.id, "createAnswer()");
        let mut answer = self
            .pc
            .create_answer()
            .await
            .map_err(NegotiationError::CreateAnswer)?;
        if self.negotiation.simulcast_answer_workaround {
            answer = self.declare_simulcast_recv(&offer, answer);
        }
        self.log_sdp(&answer);

        tracing::debug!(peer = %self.id, "setLocalDescription()");
        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(NegotiationError::SetLocalDescription)?;
        self.update_receivers(&answer);

        self.transport
            .send(SignalingMessage::Answer(answer))
            .await?;
        Ok(())
    }

    /// Patches `answer` to declare reception of the simulcast layers the
    /// offer sends. Engines that advertise it natively are left untouched.
    fn declare_simulcast_recv(
        &self,
        offer: &SessionDescription,
        answer: SessionDescription,
    ) -> SessionDescription {
        let parsed = SessionDescriptionModel::parse(&offer.sdp).and_then(
            |offer| Ok((offer, SessionDescriptionModel::parse(&answer.sdp)?)),
        );
        let (offer, mut model) = match parsed {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(peer = %self.id, %err, "Cannot patch SDP answer");
                return answer;
            }
        };

        if model.declare_simulcast_recv(&offer) {
            tracing::debug!(peer = %self.id, "Declared simulcast reception");
            SessionDescription::answer(model.to_string())
        } else {
            answer
        }
    }

    fn update_receivers(&self, answer: &SessionDescription) {
        let model = match SessionDescriptionModel::parse(&answer.sdp) {
            Ok(model) => model,
            Err(err) => {
                tracing::warn!(peer = %self.id, %err, "Malformed local answer");
                return;
            }
        };

        for section in model.media() {
            let (mid, kind) = match (section.mid(), section.kind()) {
                (Some(mid), Some(kind)) => (mid, kind),
                _ => continue,
            };
            let existing = self
                .receivers
                .borrow()
                .iter()
                .find(|r| r.mid() == mid)
                .cloned();
            match existing {
                Some(receiver) => receiver.set_direction(section.direction()),
                None => {
                    let receiver =
                        component::Receiver::new(mid, kind, section.direction());
                    tracing::info!(
                        peer = %self.id,
                        %mid,
                        %kind,
                        direction = %section.direction(),
                        "Receiver created",
                    );
                    self.receivers.borrow_mut().push(receiver);
                }
            }
        }
    }

    async fn flush_pending_candidates(&self) {
        loop {
            let candidate = self.pending_candidates.borrow_mut().pop_front();
            let candidate = match candidate {
                Some(candidate) => candidate,
                None => break,
            };
            if let Err(err) = self.apply_candidate(candidate).await {
                tracing::warn!(peer = %self.id, %err, "Candidate not applied");
            }
        }
    }

    async fn apply_candidate(
        &self,
        candidate: IceCandidate,
    ) -> Result<(), CandidateApplyError> {
        self.pc
            .add_ice_candidate(candidate.clone())
            .await
            .map_err(|source| CandidateApplyError {
                candidate: candidate.candidate,
                source,
            })
    }

    /// Returns the engine to `Stable` after a failed round.
    async fn roll_back_pending_offer(&self) {
        match self.pc.signaling_state() {
            SignalingState::HaveLocalOffer | SignalingState::HaveRemoteOffer => {}
            _ => return,
        }
        match self.pc.rollback().await {
            Ok(()) => tracing::info!(peer = %self.id, "Pending offer rolled back"),
            Err(err) => {
                tracing::warn!(peer = %self.id, %err, "Rollback failed");
            }
        }
    }

    fn report(&self, err: NegotiationError) {
        if self.closed.get() {
            tracing::debug!(peer = %self.id, %err, "Ignoring error of closed session");
            return;
        }
        tracing::error!(peer = %self.id, %err, "Negotiation failed");
        // Equal consecutive errors must still reach subscribers.
        self.last_error.set(None);
        self.last_error.set(Some(Rc::new(err)));
    }

    fn log_sdp(&self, desc: &SessionDescription) {
        if self.negotiation.log_sdp {
            tracing::debug!(
                peer = %self.id,
                kind = ?desc.kind,
                sdp = %desc.sdp,
                "Session description",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use crate::sys::{LoopbackPeerConnection, LoopbackSignaling};

    use super::*;

    fn peer() -> Rc<Peer> {
        let (transport, _) = LoopbackSignaling::pair();
        Peer::new(
            "solo",
            Rc::new(LoopbackPeerConnection::new("solo")),
            Rc::new(transport),
            &Config::default(),
        )
    }

    #[tokio::test]
    #[traced_test]
    async fn stray_answers_are_logged() {
        let peer = peer();
        let (tx, rx) = oneshot::channel();
        drop(rx);
        peer.pending_answer.replace(Some(tx));

        let answer = SessionDescription::answer("v=0\r\n");
        peer.handle_message(SignalingMessage::Answer(answer.clone()))
            .await;
        assert!(peer.pending_answer.borrow().is_none());
        assert!(logs_contain("SDP answer arrived after the round ended"));

        peer.handle_message(SignalingMessage::Answer(answer)).await;
        assert!(logs_contain("Unexpected SDP answer"));
    }
}
