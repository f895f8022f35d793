use std::rc::Rc;

use crate::{
    component::Peer,
    config::Config,
    sys::{LoopbackPeerConnection, LoopbackSignaling},
};

/// Local (offering) and remote (answering) [`Peer`]s connected in-process.
pub struct Room {
    local: Rc<Peer>,
    remote: Rc<Peer>,
    local_pc: Rc<LoopbackPeerConnection>,
    remote_pc: Rc<LoopbackPeerConnection>,
    local_signaling: Rc<LoopbackSignaling>,
    remote_signaling: Rc<LoopbackSignaling>,
}

impl Room {
    /// Creates both [`Peer`]s and spawns their tasks on the current
    /// `LocalSet`.
    pub fn new(config: &Config) -> Rc<Self> {
        let local_pc = Rc::new(LoopbackPeerConnection::new("local"));
        let remote_pc = Rc::new(LoopbackPeerConnection::new("remote"));
        let (local_signaling, remote_signaling) = LoopbackSignaling::pair();
        let local_signaling = Rc::new(local_signaling);
        let remote_signaling = Rc::new(remote_signaling);

        let local = Peer::new(
            "local",
            Rc::clone(&local_pc) as _,
            Rc::clone(&local_signaling) as _,
            config,
        );
        let remote = Peer::new(
            "remote",
            Rc::clone(&remote_pc) as _,
            Rc::clone(&remote_signaling) as _,
            config,
        );
        Rc::clone(&local).spawn_tasks();
        Rc::clone(&remote).spawn_tasks();

        Rc::new(Self {
            local,
            remote,
            local_pc,
            remote_pc,
            local_signaling,
            remote_signaling,
        })
    }

    pub fn local(&self) -> &Rc<Peer> {
        &self.local
    }

    pub fn remote(&self) -> &Rc<Peer> {
        &self.remote
    }

    pub fn local_pc(&self) -> &Rc<LoopbackPeerConnection> {
        &self.local_pc
    }

    pub fn remote_pc(&self) -> &Rc<LoopbackPeerConnection> {
        &self.remote_pc
    }

    pub fn local_signaling(&self) -> &Rc<LoopbackSignaling> {
        &self.local_signaling
    }

    pub fn remote_signaling(&self) -> &Rc<LoopbackSignaling> {
        &self.remote_signaling
    }

    /// Waits until neither side has a round in flight.
    pub async fn when_settled(&self) {
        self.local.when_negotiation_finished().await;
        self.remote.when_negotiation_finished().await;
    }

    pub fn close(&self) {
        self.local.close();
        self.remote.close();
    }
}
