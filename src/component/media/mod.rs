mod controls;
mod receiver;
mod sender;

pub use self::{
    controls::{MediaControls, Toggle},
    receiver::Receiver,
    sender::Sender,
};
