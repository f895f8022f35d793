//! In-process session engine.
//!
//! Generates deterministic SDP, enforces signaling state transitions and
//! mimics the quirks negotiation code has to cope with: candidates are
//! rejected before a remote description is set, in-place track swaps fail
//! across media kinds, and generated answers never declare simulcast
//! reception.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use async_trait::async_trait;
use futures::{
    channel::mpsc,
    stream::{self, LocalBoxStream},
    StreamExt as _,
};
use medea_reactive::ObservableCell;
use tokio::task::yield_now;

use crate::{
    error::RtcError,
    proto::{
        Encoding, IceCandidate, MediaKind, OfferOptions, SdpType,
        SendParameters, SessionDescription, TransceiverDirection,
        TransceiverId, TransceiverInit,
    },
    sdp::{MediaSection, RidDirection, SessionDescriptionModel},
    sys::{MediaStreamTrack, RtcPeerConnection, SignalingState},
};

/// Engine operation that can be made to fail once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    CreateOffer,
    CreateAnswer,
    SetLocalDescription,
    SetRemoteDescription,
    AddIceCandidate,
    ReplaceTrack,
    SetParameters,
}

#[derive(Debug)]
struct Transceiver {
    kind: MediaKind,
    direction: TransceiverDirection,
    current_direction: Option<TransceiverDirection>,
    track: Option<Rc<MediaStreamTrack>>,
    encodings: Vec<Encoding>,
    simulcast_negotiated: bool,
    /// Created by a remote offer that is not answered yet.
    pending_remote: bool,
}

impl Transceiver {
    fn is_simulcast(&self) -> bool {
        self.encodings.len() > 1
    }
}

pub struct LoopbackPeerConnection {
    name: String,
    signaling_state: ObservableCell<SignalingState>,
    transceivers: RefCell<Vec<Transceiver>>,
    local_description: RefCell<Option<SessionDescription>>,
    remote_description: RefCell<Option<SessionDescription>>,
    stable_descriptions:
        RefCell<(Option<SessionDescription>, Option<SessionDescription>)>,
    ice_tx: mpsc::UnboundedSender<Option<IceCandidate>>,
    ice_rx: RefCell<Option<mpsc::UnboundedReceiver<Option<IceCandidate>>>>,
    gathered: Cell<bool>,
    applied_candidates: RefCell<Vec<IceCandidate>>,
    create_offer_calls: Cell<usize>,
    session_version: Cell<u64>,
    injected_failure: RefCell<Option<(Operation, RtcError)>>,
}

impl LoopbackPeerConnection {
    pub fn new(name: impl Into<String>) -> Self {
        let (ice_tx, ice_rx) = mpsc::unbounded();
        Self {
            name: name.into(),
            signaling_state: ObservableCell::new(SignalingState::Stable),
            transceivers: RefCell::new(Vec::new()),
            local_description: RefCell::new(None),
            remote_description: RefCell::new(None),
            stable_descriptions: RefCell::new((None, None)),
            ice_tx,
            ice_rx: RefCell::new(Some(ice_rx)),
            gathered: Cell::new(false),
            applied_candidates: RefCell::new(Vec::new()),
            create_offer_calls: Cell::new(0),
            session_version: Cell::new(1),
            injected_failure: RefCell::new(None),
        }
    }

    pub fn inject_failure(&self, operation: Operation, error: RtcError) {
        self.injected_failure.replace(Some((operation, error)));
    }

    pub fn create_offer_calls(&self) -> usize {
        self.create_offer_calls.get()
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.local_description.borrow().clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote_description.borrow().clone()
    }

    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.applied_candidates.borrow().clone()
    }

    pub fn transceivers_count(&self) -> usize {
        self.transceivers.borrow().len()
    }

    pub fn direction(&self, id: TransceiverId) -> Option<TransceiverDirection> {
        self.transceivers.borrow().get(id.0).map(|t| t.direction)
    }

    pub fn current_direction(
        &self,
        id: TransceiverId,
    ) -> Option<TransceiverDirection> {
        self.transceivers
            .borrow()
            .get(id.0)
            .and_then(|t| t.current_direction)
    }

    /// Layers that actually flow for the given sender.
    ///
    /// Without negotiated simulcast only the first layer is sent.
    pub fn sending_layers(&self, id: TransceiverId) -> Vec<String> {
        let transceivers = self.transceivers.borrow();
        let t = match transceivers.get(id.0) {
            Some(t) => t,
            None => return Vec::new(),
        };
        let sending = t.track.as_ref().map_or(false, |track| track.enabled())
            && t.current_direction.map_or(false, |d| d.is_send());
        if !sending {
            return Vec::new();
        }

        let layers = if t.simulcast_negotiated {
            &t.encodings[..]
        } else {
            &t.encodings[..t.encodings.len().min(1)]
        };
        layers
            .iter()
            .filter(|e| e.active)
            .map(|e| e.rid.clone())
            .collect()
    }

    fn check(&self, operation: Operation) -> Result<(), RtcError> {
        if self.signaling_state.get() == SignalingState::Closed {
            return Err(RtcError::Closed);
        }
        let injected = self.injected_failure.borrow_mut().take();
        match injected {
            Some((op, err)) if op == operation => Err(err),
            other => {
                self.injected_failure.replace(other);
                Ok(())
            }
        }
    }

    fn parse(&self, desc: &SessionDescription) -> Result<SessionDescriptionModel, RtcError> {
        SessionDescriptionModel::parse(&desc.sdp)
            .map_err(|e| RtcError::Operation(e.to_string()))
    }

    fn render(&self, sections: Vec<MediaSection>) -> String {
        let version = self.session_version.get();
        self.session_version.set(version + 1);

        let mut sdp = format!(
            "v=0\r\no=- {} {} IN IP4 127.0.0.1\r\ns={}\r\nt=0 0\r\n",
            self.name.len() as u64 * 1000 + 1,
            version,
            self.name,
        );
        for line in sections.iter().flat_map(|s| s.lines()) {
            sdp.push_str(line);
            sdp.push_str("\r\n");
        }
        sdp
    }

    fn set_state(&self, state: SignalingState) {
        if self.signaling_state.get() != state {
            tracing::trace!(pc = %self.name, ?state, "Signaling state changed");
            self.signaling_state.set(state);
        }
    }

    fn commit(&self) {
        self.stable_descriptions.replace((
            self.local_description.borrow().clone(),
            self.remote_description.borrow().clone(),
        ));
        for t in self.transceivers.borrow_mut().iter_mut() {
            t.pending_remote = false;
        }
    }

    fn gather_candidates(&self) {
        if self.gathered.replace(true) {
            return;
        }
        let candidate = IceCandidate {
            candidate: format!(
                "candidate:1 1 udp 2122260223 127.0.0.1 {} typ host",
                9000 + self.name.len()
            ),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        };
        let _ = self.ice_tx.unbounded_send(Some(candidate));
        let _ = self.ice_tx.unbounded_send(None);
    }
}

#[async_trait(?Send)]
impl RtcPeerConnection for LoopbackPeerConnection {
    fn signaling_state(&self) -> SignalingState {
        self.signaling_state.get()
    }

    fn on_signaling_state_change(&self) -> LocalBoxStream<'static, SignalingState> {
        self.signaling_state.subscribe().skip(1).boxed_local()
    }

    fn on_ice_candidate(&self) -> LocalBoxStream<'static, Option<IceCandidate>> {
        match self.ice_rx.borrow_mut().take() {
            Some(rx) => rx.boxed_local(),
            None => stream::empty().boxed_local(),
        }
    }

    async fn create_offer(
        &self,
        options: OfferOptions,
    ) -> Result<SessionDescription, RtcError> {
        yield_now().await;
        self.check(Operation::CreateOffer)?;
        self.create_offer_calls.set(self.create_offer_calls.get() + 1);

        let sections = self
            .transceivers
            .borrow()
            .iter()
            .enumerate()
            .map(|(mid, t)| {
                let mut section = MediaSection::new(t.kind, &mid.to_string());
                let direction = if options.receives(t.kind) {
                    t.direction
                } else {
                    t.direction.without_recv()
                };
                section.set_direction(direction);
                if t.is_simulcast() {
                    let rids: Vec<&str> =
                        t.encodings.iter().map(|e| e.rid.as_str()).collect();
                    section.declare_simulcast_send(&rids);
                }
                section
            })
            .collect();

        Ok(SessionDescription::offer(self.render(sections)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, RtcError> {
        yield_now().await;
        self.check(Operation::CreateAnswer)?;
        if self.signaling_state.get() != SignalingState::HaveRemoteOffer {
            return Err(RtcError::InvalidState(
                "createAnswer without remote offer".to_string(),
            ));
        }
        let offer = match self.remote_description.borrow().as_ref() {
            Some(offer) => self.parse(offer)?,
            None => {
                return Err(RtcError::InvalidState(
                    "no remote description".to_string(),
                ))
            }
        };

        let transceivers = self.transceivers.borrow();
        let sections = offer
            .media()
            .iter()
            .zip(transceivers.iter())
            .enumerate()
            .map(|(i, (offered, t))| {
                let remote = offered.direction();
                let send = remote.is_recv()
                    && t.direction.is_send()
                    && t.track.is_some();
                let recv = remote.is_send() && t.direction.is_recv();
                let mid = offered.mid().map_or_else(|| i.to_string(), String::from);
                let mut section = MediaSection::new(t.kind, &mid);
                section.set_direction(TransceiverDirection::from_flags(send, recv));
                section
            })
            .collect();
        drop(transceivers);

        Ok(SessionDescription::answer(self.render(sections)))
    }

    async fn set_local_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), RtcError> {
        yield_now().await;
        self.check(Operation::SetLocalDescription)?;
        let state = self.signaling_state.get();
        let next = match (desc.kind, state) {
            (SdpType::Offer, SignalingState::Stable)
            | (SdpType::Offer, SignalingState::HaveLocalOffer) => {
                SignalingState::HaveLocalOffer
            }
            (SdpType::Answer, SignalingState::HaveRemoteOffer) => {
                let answer = self.parse(&desc)?;
                let mut transceivers = self.transceivers.borrow_mut();
                for (t, section) in transceivers.iter_mut().zip(answer.media()) {
                    t.current_direction = Some(section.direction());
                }
                SignalingState::Stable
            }
            (kind, state) => {
                return Err(RtcError::InvalidState(format!(
                    "cannot set local {:?} in {:?}",
                    kind, state
                )))
            }
        };

        self.local_description.replace(Some(desc));
        if next == SignalingState::Stable {
            self.commit();
        }
        self.set_state(next);
        self.gather_candidates();
        Ok(())
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), RtcError> {
        yield_now().await;
        self.check(Operation::SetRemoteDescription)?;
        let state = self.signaling_state.get();
        let model = self.parse(&desc)?;
        let next = match (desc.kind, state) {
            (SdpType::Offer, SignalingState::Stable)
            | (SdpType::Offer, SignalingState::HaveRemoteOffer) => {
                let mut transceivers = self.transceivers.borrow_mut();
                for section in model.media().iter().skip(transceivers.len()) {
                    let kind = section.kind().ok_or_else(|| {
                        RtcError::Operation(format!(
                            "unsupported media section '{}'",
                            section.lines()[0]
                        ))
                    })?;
                    transceivers.push(Transceiver {
                        kind,
                        direction: TransceiverDirection::RecvOnly,
                        current_direction: None,
                        track: None,
                        encodings: Vec::new(),
                        simulcast_negotiated: false,
                        pending_remote: true,
                    });
                }
                SignalingState::HaveRemoteOffer
            }
            (SdpType::Answer, SignalingState::HaveLocalOffer) => {
                let mut transceivers = self.transceivers.borrow_mut();
                for (t, section) in transceivers.iter_mut().zip(model.media()) {
                    t.current_direction = Some(section.direction().reverse());
                    if t.is_simulcast() {
                        t.simulcast_negotiated =
                            section.has_simulcast(RidDirection::Recv);
                    }
                }
                SignalingState::Stable
            }
            (kind, state) => {
                return Err(RtcError::InvalidState(format!(
                    "cannot set remote {:?} in {:?}",
                    kind, state
                )))
            }
        };

        self.remote_description.replace(Some(desc));
        if next == SignalingState::Stable {
            self.commit();
        }
        self.set_state(next);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), RtcError> {
        yield_now().await;
        match self.signaling_state.get() {
            SignalingState::Closed => return Err(RtcError::Closed),
            SignalingState::Stable => return Ok(()),
            SignalingState::HaveLocalOffer => {
                let local = self.stable_descriptions.borrow().0.clone();
                self.local_description.replace(local);
            }
            SignalingState::HaveRemoteOffer => {
                let remote = self.stable_descriptions.borrow().1.clone();
                self.remote_description.replace(remote);
                let mut transceivers = self.transceivers.borrow_mut();
                while transceivers.last().map_or(false, |t| t.pending_remote) {
                    transceivers.pop();
                }
            }
        }
        tracing::trace!(pc = %self.name, "Pending offer rolled back");
        self.set_state(SignalingState::Stable);
        Ok(())
    }

    fn has_remote_description(&self) -> bool {
        self.remote_description.borrow().is_some()
    }

    async fn add_ice_candidate(
        &self,
        candidate: IceCandidate,
    ) -> Result<(), RtcError> {
        yield_now().await;
        self.check(Operation::AddIceCandidate)?;
        if !self.has_remote_description() {
            return Err(RtcError::InvalidState(
                "remote description is not set".to_string(),
            ));
        }
        if !candidate.candidate.starts_with("candidate:") {
            return Err(RtcError::Operation(format!(
                "malformed candidate '{}'",
                candidate.candidate
            )));
        }
        self.applied_candidates.borrow_mut().push(candidate);
        Ok(())
    }

    fn add_transceiver(
        &self,
        track: Option<Rc<MediaStreamTrack>>,
        init: TransceiverInit,
    ) -> Result<TransceiverId, RtcError> {
        if self.signaling_state.get() == SignalingState::Closed {
            return Err(RtcError::Closed);
        }
        let mut transceivers = self.transceivers.borrow_mut();

        if let Some(track) = &track {
            if init.send_encodings.is_empty() {
                let free = transceivers.iter().position(|t| {
                    t.kind == track.kind()
                        && t.track.is_none()
                        && !t.direction.is_send()
                });
                if let Some(i) = free {
                    let t = &mut transceivers[i];
                    t.track = Some(Rc::clone(track));
                    t.pending_remote = false;
                    t.direction =
                        TransceiverDirection::from_flags(true, t.direction.is_recv());
                    return Ok(TransceiverId(i));
                }
            }
        }

        let kind = match &track {
            Some(track) => track.kind(),
            None => {
                return Err(RtcError::Operation(
                    "transceiver needs a track to infer its kind".to_string(),
                ))
            }
        };
        transceivers.push(Transceiver {
            kind,
            direction: init.direction,
            current_direction: None,
            track,
            encodings: init.send_encodings,
            simulcast_negotiated: false,
            pending_remote: false,
        });
        Ok(TransceiverId(transceivers.len() - 1))
    }

    fn remove_track(&self, sender: TransceiverId) -> Result<(), RtcError> {
        if self.signaling_state.get() == SignalingState::Closed {
            return Err(RtcError::Closed);
        }
        let mut transceivers = self.transceivers.borrow_mut();
        let t = transceivers.get_mut(sender.0).ok_or_else(|| {
            RtcError::Operation(format!("unknown sender {}", sender))
        })?;
        t.track = None;
        t.direction = t.direction.without_send();
        Ok(())
    }

    async fn replace_track(
        &self,
        sender: TransceiverId,
        track: Option<Rc<MediaStreamTrack>>,
    ) -> Result<(), RtcError> {
        yield_now().await;
        self.check(Operation::ReplaceTrack)?;
        let mut transceivers = self.transceivers.borrow_mut();
        let t = transceivers.get_mut(sender.0).ok_or_else(|| {
            RtcError::Operation(format!("unknown sender {}", sender))
        })?;
        if let Some(track) = &track {
            if track.kind() != t.kind {
                return Err(RtcError::InvalidModification(format!(
                    "cannot send {} track on {} transceiver",
                    track.kind(),
                    t.kind
                )));
            }
        }
        t.track = track;
        Ok(())
    }

    fn get_parameters(
        &self,
        sender: TransceiverId,
    ) -> Result<SendParameters, RtcError> {
        self.transceivers
            .borrow()
            .get(sender.0)
            .map(|t| SendParameters {
                encodings: t.encodings.clone(),
            })
            .ok_or_else(|| {
                RtcError::Operation(format!("unknown sender {}", sender))
            })
    }

    async fn set_parameters(
        &self,
        sender: TransceiverId,
        params: SendParameters,
    ) -> Result<(), RtcError> {
        yield_now().await;
        self.check(Operation::SetParameters)?;
        let mut transceivers = self.transceivers.borrow_mut();
        let t = transceivers.get_mut(sender.0).ok_or_else(|| {
            RtcError::Operation(format!("unknown sender {}", sender))
        })?;
        let same_layers = t.encodings.len() == params.encodings.len()
            && t
                .encodings
                .iter()
                .zip(&params.encodings)
                .all(|(old, new)| old.rid == new.rid);
        if !same_layers {
            return Err(RtcError::InvalidModification(
                "encodings cannot be added, removed or reordered".to_string(),
            ));
        }
        t.encodings = params.encodings;
        Ok(())
    }

    fn close(&self) {
        tracing::debug!(pc = %self.name, "Closing peer connection");
        self.set_state(SignalingState::Closed);
        self.injected_failure.replace(None);
        self.ice_tx.close_channel();
    }
}
