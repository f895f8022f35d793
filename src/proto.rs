use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    pub fn from_sdp(token: &str) -> Option<Self> {
        match token {
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Negotiated direction of a transceiver, from the local point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransceiverDirection {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl TransceiverDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            TransceiverDirection::SendRecv => "sendrecv",
            TransceiverDirection::SendOnly => "sendonly",
            TransceiverDirection::RecvOnly => "recvonly",
            TransceiverDirection::Inactive => "inactive",
        }
    }

    pub fn from_sdp(token: &str) -> Option<Self> {
        match token {
            "sendrecv" => Some(TransceiverDirection::SendRecv),
            "sendonly" => Some(TransceiverDirection::SendOnly),
            "recvonly" => Some(TransceiverDirection::RecvOnly),
            "inactive" => Some(TransceiverDirection::Inactive),
            _ => None,
        }
    }

    pub fn is_send(self) -> bool {
        matches!(
            self,
            TransceiverDirection::SendRecv | TransceiverDirection::SendOnly
        )
    }

    pub fn is_recv(self) -> bool {
        matches!(
            self,
            TransceiverDirection::SendRecv | TransceiverDirection::RecvOnly
        )
    }

    /// Same direction as seen by the other party.
    pub fn reverse(self) -> Self {
        match self {
            TransceiverDirection::SendOnly => TransceiverDirection::RecvOnly,
            TransceiverDirection::RecvOnly => TransceiverDirection::SendOnly,
            other => other,
        }
    }

    pub fn without_send(self) -> Self {
        Self::from_flags(false, self.is_recv())
    }

    pub fn without_recv(self) -> Self {
        Self::from_flags(self.is_send(), false)
    }

    pub fn from_flags(send: bool, recv: bool) -> Self {
        match (send, recv) {
            (true, true) => TransceiverDirection::SendRecv,
            (true, false) => TransceiverDirection::SendOnly,
            (false, true) => TransceiverDirection::RecvOnly,
            (false, false) => TransceiverDirection::Inactive,
        }
    }
}

impl fmt::Display for TransceiverDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SdpType {
    Offer,
    Answer,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

/// Message carried by a [`SignalingTransport`].
///
/// `Candidate(None)` is the end-of-candidates sentinel.
///
/// [`SignalingTransport`]: crate::sys::SignalingTransport
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignalingMessage {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(Option<IceCandidate>),
}

/// Single simulcast layer of a sender.
#[derive(Clone, Debug, PartialEq)]
pub struct Encoding {
    pub rid: String,
    pub active: bool,
    pub max_bitrate_bps: u32,
    pub scale_resolution_down_by: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SendParameters {
    pub encodings: Vec<Encoding>,
}

impl SendParameters {
    pub fn active_rids(&self) -> Vec<&str> {
        self.encodings
            .iter()
            .filter(|e| e.active)
            .map(|e| e.rid.as_str())
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransceiverInit {
    pub direction: TransceiverDirection,
    pub send_encodings: Vec<Encoding>,
}

impl TransceiverInit {
    /// Init used by `addTrack`-style insertion.
    pub fn send_recv() -> Self {
        Self {
            direction: TransceiverDirection::SendRecv,
            send_encodings: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransceiverId(pub usize);

impl fmt::Display for TransceiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Options of `createOffer`.
///
/// Setting both flags to `false` forces `sendonly` media sections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OfferOptions {
    pub offer_to_receive_audio: bool,
    pub offer_to_receive_video: bool,
}

impl Default for OfferOptions {
    fn default() -> Self {
        Self {
            offer_to_receive_audio: true,
            offer_to_receive_video: true,
        }
    }
}

impl OfferOptions {
    pub fn send_only() -> Self {
        Self {
            offer_to_receive_audio: false,
            offer_to_receive_video: false,
        }
    }

    pub fn receives(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => self.offer_to_receive_audio,
            MediaKind::Video => self.offer_to_receive_video,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MediaStreamConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaStreamConstraints {
    pub fn kinds(&self) -> Vec<MediaKind> {
        let mut kinds = Vec::new();
        if self.audio {
            kinds.push(MediaKind::Audio);
        }
        if self.video {
            kinds.push(MediaKind::Video);
        }
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removing_send_downgrades_direction() {
        assert_eq!(
            TransceiverDirection::SendRecv.without_send(),
            TransceiverDirection::RecvOnly
        );
        assert_eq!(
            TransceiverDirection::SendOnly.without_send(),
            TransceiverDirection::Inactive
        );
    }

    #[test]
    fn reverse_swaps_one_way_directions() {
        assert_eq!(
            TransceiverDirection::SendOnly.reverse(),
            TransceiverDirection::RecvOnly
        );
        assert_eq!(
            TransceiverDirection::Inactive.reverse(),
            TransceiverDirection::Inactive
        );
    }

    #[test]
    fn empty_constraints_request_nothing() {
        let constraints = MediaStreamConstraints {
            audio: false,
            video: false,
        };
        assert!(constraints.kinds().is_empty());
    }
}
