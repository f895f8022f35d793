use std::{cell::Cell, rc::Rc};

use async_trait::async_trait;

use crate::{
    error::{MediaAccessError, MediaAccessReason},
    proto::{MediaKind, MediaStreamConstraints},
    sys::MediaStreamTrack,
};

#[async_trait(?Send)]
pub trait MediaDevices {
    async fn get_user_media(
        &self,
        constraints: MediaStreamConstraints,
    ) -> Result<Vec<Rc<MediaStreamTrack>>, MediaAccessError>;
}

/// Capture device that produces synthetic tracks.
pub struct FakeMediaDevices {
    available: Vec<MediaKind>,
    failure: Cell<Option<MediaAccessReason>>,
    next_id: Cell<u32>,
}

impl FakeMediaDevices {
    pub fn new() -> Self {
        Self::with_kinds(vec![MediaKind::Audio, MediaKind::Video])
    }

    pub fn with_kinds(available: Vec<MediaKind>) -> Self {
        Self {
            available,
            failure: Cell::new(None),
            next_id: Cell::new(0),
        }
    }

    /// Makes every following capture fail with `reason`.
    pub fn fail_with(&self, reason: MediaAccessReason) {
        self.failure.set(Some(reason));
    }
}

impl Default for FakeMediaDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl MediaDevices for FakeMediaDevices {
    async fn get_user_media(
        &self,
        constraints: MediaStreamConstraints,
    ) -> Result<Vec<Rc<MediaStreamTrack>>, MediaAccessError> {
        tokio::task::yield_now().await;

        if let Some(reason) = self.failure.get() {
            return Err(MediaAccessError::new(reason));
        }
        let kinds = constraints.kinds();
        if kinds.is_empty() {
            return Err(MediaAccessError::new(MediaAccessReason::InvalidRequest));
        }
        if kinds.iter().any(|k| !self.available.contains(k)) {
            return Err(MediaAccessError::new(MediaAccessReason::DeviceNotFound));
        }

        Ok(kinds
            .into_iter()
            .map(|kind| {
                let id = self.next_id.get();
                self.next_id.set(id + 1);
                Rc::new(MediaStreamTrack::new(format!("{}-{}", kind, id), kind))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraints(audio: bool, video: bool) -> MediaStreamConstraints {
        MediaStreamConstraints { audio, video }
    }

    #[tokio::test]
    async fn captures_requested_kinds_in_order() {
        let devices = FakeMediaDevices::new();
        let tracks = devices.get_user_media(constraints(true, true)).await.unwrap();

        assert_eq!(
            tracks.iter().map(|t| t.kind()).collect::<Vec<_>>(),
            vec![MediaKind::Audio, MediaKind::Video]
        );
        assert_ne!(tracks[0].id(), tracks[1].id());
        assert!(tracks.iter().all(|t| t.enabled()));
    }

    #[tokio::test]
    async fn reports_typed_reasons() {
        let devices = FakeMediaDevices::with_kinds(vec![MediaKind::Audio]);

        let err = devices
            .get_user_media(constraints(false, false))
            .await
            .unwrap_err();
        assert_eq!(err.reason, MediaAccessReason::InvalidRequest);

        let err = devices
            .get_user_media(constraints(true, true))
            .await
            .unwrap_err();
        assert_eq!(err.reason, MediaAccessReason::DeviceNotFound);

        devices.fail_with(MediaAccessReason::DeviceBusy);
        let err = devices
            .get_user_media(constraints(true, false))
            .await
            .unwrap_err();
        assert_eq!(err.reason, MediaAccessReason::DeviceBusy);
    }
}
