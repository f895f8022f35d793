mod media;
mod peer;
mod room;

pub use self::{
    media::{MediaControls, Receiver, Sender, Toggle},
    peer::Peer,
    room::Room,
};
