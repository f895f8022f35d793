use std::{fmt, time::Duration};

use thiserror::Error;

/// Rejection reported by the underlying session engine.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RtcError {
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Requested change is incompatible with the negotiated parameters.
    #[error("invalid modification: {0}")]
    InvalidModification(String),

    #[error("operation failed: {0}")]
    Operation(String),

    #[error("peer connection is closed")]
    Closed,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("signaling channel is closed")]
    Closed,
}

/// Failure of a single offer/answer round.
#[derive(Debug, Error, PartialEq)]
pub enum NegotiationError {
    #[error("createOffer failed: {0}")]
    CreateOffer(#[source] RtcError),

    #[error("createAnswer failed: {0}")]
    CreateAnswer(#[source] RtcError),

    #[error("setLocalDescription failed: {0}")]
    SetLocalDescription(#[source] RtcError),

    #[error("setRemoteDescription failed: {0}")]
    SetRemoteDescription(#[source] RtcError),

    #[error("failed to deliver signaling message: {0}")]
    Transport(#[from] TransportError),

    #[error("no SDP answer received within {0:?}")]
    AnswerTimeout(Duration),

    #[error("session closed during negotiation")]
    Closed,
}

impl NegotiationError {
    /// Underlying engine error, if any.
    pub fn rtc_error(&self) -> Option<&RtcError> {
        match self {
            NegotiationError::CreateOffer(e)
            | NegotiationError::CreateAnswer(e)
            | NegotiationError::SetLocalDescription(e)
            | NegotiationError::SetRemoteDescription(e) => Some(e),
            _ => None,
        }
    }
}

/// Error of the track/transceiver operations.
#[derive(Debug, Error, PartialEq)]
pub enum TrackError {
    /// In-place swap is not possible without a new offer/answer round.
    #[error("renegotiation required: {0}")]
    RenegotiationRequired(String),

    #[error("simulcast layer index '{0}' is not a number")]
    InvalidLayer(String),

    #[error("simulcast layer {index} is out of range (sender has {len})")]
    LayerOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Rtc(RtcError),
}

impl From<RtcError> for TrackError {
    fn from(err: RtcError) -> Self {
        match err {
            RtcError::InvalidModification(msg) => {
                TrackError::RenegotiationRequired(msg)
            }
            other => TrackError::Rtc(other),
        }
    }
}

/// Non-fatal failure to apply a remote ICE candidate.
#[derive(Debug, Error)]
#[error("failed to apply remote ICE candidate '{candidate}': {source}")]
pub struct CandidateApplyError {
    pub candidate: String,
    #[source]
    pub source: RtcError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaAccessReason {
    DeviceNotFound,
    DeviceBusy,
    ConstraintsUnsatisfiable,
    PermissionDenied,
    InvalidRequest,
    Unknown,
}

impl MediaAccessReason {
    /// Maps error names raised by capture APIs, including legacy aliases.
    pub fn from_error_name(name: &str) -> Self {
        match name {
            "NotFoundError" | "DevicesNotFoundError" => Self::DeviceNotFound,
            "NotReadableError" | "TrackStartError" => Self::DeviceBusy,
            "OverconstrainedError" | "ConstraintNotSatisfiedError" => {
                Self::ConstraintsUnsatisfiable
            }
            "NotAllowedError" | "PermissionDeniedError" => {
                Self::PermissionDenied
            }
            "TypeError" => Self::InvalidRequest,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::DeviceNotFound => "device-not-found",
            Self::DeviceBusy => "device-busy",
            Self::ConstraintsUnsatisfiable => "constraints-unsatisfiable",
            Self::PermissionDenied => "permission-denied",
            Self::InvalidRequest => "invalid-request",
            Self::Unknown => "unknown",
        }
    }

    pub fn explain(self) -> &'static str {
        match self {
            Self::DeviceNotFound => "Missing capture device for required tracks",
            Self::DeviceBusy => "Capture device is already in use",
            Self::ConstraintsUnsatisfiable => {
                "Capture device doesn't provide required tracks"
            }
            Self::PermissionDenied => {
                "Capture permission has been denied by the user"
            }
            Self::InvalidRequest => "No media tracks have been requested",
            Self::Unknown => "Unknown capture error",
        }
    }
}

impl fmt::Display for MediaAccessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("media access failed [{reason}]: {}", reason.explain())]
pub struct MediaAccessError {
    pub reason: MediaAccessReason,
}

impl MediaAccessError {
    pub fn new(reason: MediaAccessReason) -> Self {
        Self { reason }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
