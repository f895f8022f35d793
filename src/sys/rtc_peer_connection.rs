use std::rc::Rc;

use async_trait::async_trait;
use futures::stream::LocalBoxStream;

use crate::{
    error::RtcError,
    proto::{
        IceCandidate, OfferOptions, SendParameters, SessionDescription,
        TransceiverId, TransceiverInit,
    },
    sys::MediaStreamTrack,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    Closed,
}

/// Underlying real-time session engine.
#[async_trait(?Send)]
pub trait RtcPeerConnection {
    fn signaling_state(&self) -> SignalingState;

    fn on_signaling_state_change(&self) -> LocalBoxStream<'static, SignalingState>;

    /// Emits locally gathered candidates, `None` once gathering is complete.
    fn on_ice_candidate(&self) -> LocalBoxStream<'static, Option<IceCandidate>>;

    async fn create_offer(
        &self,
        options: OfferOptions,
    ) -> Result<SessionDescription, RtcError>;

    async fn create_answer(&self) -> Result<SessionDescription, RtcError>;

    async fn set_local_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), RtcError>;

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), RtcError>;

    /// Discards the pending local or remote offer, returning to
    /// [`SignalingState::Stable`] with the last negotiated descriptions.
    async fn rollback(&self) -> Result<(), RtcError>;

    fn has_remote_description(&self) -> bool;

    async fn add_ice_candidate(
        &self,
        candidate: IceCandidate,
    ) -> Result<(), RtcError>;

    /// Binds `track` to a transceiver. May repurpose an existing transceiver
    /// of the same kind that currently has no track.
    fn add_transceiver(
        &self,
        track: Option<Rc<MediaStreamTrack>>,
        init: TransceiverInit,
    ) -> Result<TransceiverId, RtcError>;

    /// Unbinds the track and drops the send direction of the transceiver.
    fn remove_track(&self, sender: TransceiverId) -> Result<(), RtcError>;

    async fn replace_track(
        &self,
        sender: TransceiverId,
        track: Option<Rc<MediaStreamTrack>>,
    ) -> Result<(), RtcError>;

    fn get_parameters(
        &self,
        sender: TransceiverId,
    ) -> Result<SendParameters, RtcError>;

    async fn set_parameters(
        &self,
        sender: TransceiverId,
        params: SendParameters,
    ) -> Result<(), RtcError>;

    fn close(&self);
}
