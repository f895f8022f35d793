//! Offer/answer negotiation of a two-party media session.
//!
//! A [`component::Peer`] drives one side of the session over an
//! [`sys::RtcPeerConnection`] and a [`sys::SignalingTransport`]. Everything
//! runs on a single thread, spawned on a `tokio::task::LocalSet`.

pub mod component;
pub mod config;
pub mod error;
pub mod proto;
pub mod sdp;
pub mod sys;

pub use self::{
    component::{MediaControls, Peer, Receiver, Room, Sender, Toggle},
    config::Config,
    error::{NegotiationError, TrackError},
};
