use std::{cell::RefCell, rc::Rc};

use crate::{
    error::TrackError,
    proto::{MediaKind, SendParameters, TransceiverId},
    sys::{MediaStreamTrack, RtcPeerConnection},
};

/// Sending side of a transceiver.
///
/// Nothing done through a [`Sender`] renegotiates the session: muting only
/// toggles the source, and track swaps and layer changes are applied in
/// place.
pub struct Sender {
    id: TransceiverId,
    kind: MediaKind,
    track: RefCell<Option<Rc<MediaStreamTrack>>>,
    pc: Rc<dyn RtcPeerConnection>,
}

impl Sender {
    pub fn new(
        id: TransceiverId,
        kind: MediaKind,
        track: Rc<MediaStreamTrack>,
        pc: Rc<dyn RtcPeerConnection>,
    ) -> Rc<Self> {
        Rc::new(Self {
            id,
            kind,
            track: RefCell::new(Some(track)),
            pc,
        })
    }

    pub fn id(&self) -> TransceiverId {
        self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn track(&self) -> Option<Rc<MediaStreamTrack>> {
        self.track.borrow().clone()
    }

    pub(crate) fn bind(&self, track: Rc<MediaStreamTrack>) {
        self.track.replace(Some(track));
    }

    pub(crate) fn unbind(&self) {
        self.track.replace(None);
    }

    pub fn set_muted(&self, muted: bool) {
        if let Some(track) = self.track() {
            track.set_muted(muted);
        }
    }

    /// Swaps the sent track without a new offer/answer round.
    ///
    /// # Errors
    ///
    /// [`TrackError::RenegotiationRequired`] if the engine can't swap the
    /// track within the negotiated parameters.
    pub async fn replace_track(
        &self,
        track: Option<Rc<MediaStreamTrack>>,
    ) -> Result<(), TrackError> {
        self.pc.replace_track(self.id, track.clone()).await?;
        tracing::debug!(
            transceiver = %self.id,
            track = ?track.as_ref().map(|t| t.id()),
            "Track replaced",
        );
        self.track.replace(track);
        Ok(())
    }

    pub fn parameters(&self) -> Result<SendParameters, TrackError> {
        Ok(self.pc.get_parameters(self.id)?)
    }

    /// Activates exactly the encoding at `index` and deactivates the rest.
    ///
    /// The index is checked before anything is changed.
    pub async fn set_active_layer(&self, index: usize) -> Result<(), TrackError> {
        let mut params = self.pc.get_parameters(self.id)?;
        let len = params.encodings.len();
        if index >= len {
            return Err(TrackError::LayerOutOfRange { index, len });
        }

        for (i, encoding) in params.encodings.iter_mut().enumerate() {
            encoding.active = i == index;
        }
        tracing::info!(transceiver = %self.id, index, "Simulcast layer selected");
        self.pc.set_parameters(self.id, params).await?;
        Ok(())
    }

    /// Same as [`Sender::set_active_layer`] for textual input.
    pub async fn select_layer(&self, value: &str) -> Result<(), TrackError> {
        let index = value
            .trim()
            .parse::<usize>()
            .map_err(|_| TrackError::InvalidLayer(value.to_string()))?;
        self.set_active_layer(index).await
    }
}
