use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::{
    component::{Peer, Sender},
    error::{RtcError, TrackError},
    sys::MediaStreamTrack,
};

/// Checkbox-like switch.
#[derive(Debug, Default)]
pub struct Toggle {
    checked: Cell<bool>,
    disabled: Cell<bool>,
}

impl Toggle {
    pub fn is_checked(&self) -> bool {
        self.checked.get()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.get()
    }
}

/// Disable, replace and remove switches of one local track.
///
/// Each switch locks the other two while it is on. A failed operation rolls
/// its switch back.
pub struct MediaControls {
    peer: Rc<Peer>,
    track: Rc<MediaStreamTrack>,
    sender: RefCell<Rc<Sender>>,
    replacement: RefCell<Option<Rc<MediaStreamTrack>>>,
    pub disable: Toggle,
    pub replace: Toggle,
    pub remove: Toggle,
}

impl MediaControls {
    pub fn new(
        peer: Rc<Peer>,
        track: Rc<MediaStreamTrack>,
        sender: Rc<Sender>,
    ) -> Self {
        Self {
            peer,
            track,
            sender: RefCell::new(sender),
            replacement: RefCell::new(None),
            disable: Toggle::default(),
            replace: Toggle::default(),
            remove: Toggle::default(),
        }
    }

    pub fn track(&self) -> Rc<MediaStreamTrack> {
        Rc::clone(&self.track)
    }

    pub fn sender(&self) -> Rc<Sender> {
        Rc::clone(&self.sender.borrow())
    }

    /// Track sent while the replace switch is on. `None` sends nothing.
    pub fn set_replacement(&self, track: Option<Rc<MediaStreamTrack>>) {
        self.replacement.replace(track);
    }

    pub fn toggle_disable(&self, checked: bool) {
        let kind = self.track.kind();
        tracing::info!(%kind, on = checked, "Set DISABLE");
        self.disable.checked.set(checked);
        self.track.set_muted(checked);

        self.replace.disabled.set(checked);
        self.remove.disabled.set(checked);
    }

    pub async fn toggle_replace(&self, checked: bool) -> Result<(), TrackError> {
        let kind = self.track.kind();
        tracing::info!(%kind, on = checked, "Set REPLACE");
        self.replace.checked.set(checked);

        let new_track = if checked {
            self.replacement.borrow().clone()
        } else {
            Some(Rc::clone(&self.track))
        };
        if let Err(err) = self.sender().replace_track(new_track).await {
            match &err {
                TrackError::RenegotiationRequired(_) => {
                    tracing::warn!(%kind, %err, "Replace failed, renegotiation needed");
                }
                _ => tracing::warn!(%kind, %err, "Replace failed"),
            }
            self.replace.checked.set(!checked);
            return Err(err);
        }

        self.disable.disabled.set(checked);
        self.remove.disabled.set(checked);
        Ok(())
    }

    pub fn toggle_remove(&self, checked: bool) -> Result<(), RtcError> {
        let kind = self.track.kind();
        tracing::info!(%kind, on = checked, "Set REMOVE");
        self.remove.checked.set(checked);

        let result = if checked {
            self.peer.remove_track(&self.sender())
        } else {
            self.peer
                .add_track(Rc::clone(&self.track))
                .map(|sender| drop(self.sender.replace(sender)))
        };
        if let Err(err) = result {
            tracing::warn!(%kind, %err, "Remove failed");
            self.remove.checked.set(!checked);
            return Err(err);
        }

        self.disable.disabled.set(checked);
        self.replace.disabled.set(checked);
        Ok(())
    }
}
