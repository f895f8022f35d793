//! Contracts of the collaborators negotiation runs against, and their
//! in-process implementations.

mod loopback;
mod media_devices;
mod media_stream_track;
mod rtc_peer_connection;
mod signaling;

pub use self::{
    loopback::{LoopbackPeerConnection, Operation},
    media_devices::{FakeMediaDevices, MediaDevices},
    media_stream_track::MediaStreamTrack,
    rtc_peer_connection::{RtcPeerConnection, SignalingState},
    signaling::{LoopbackSignaling, SignalingTransport},
};
