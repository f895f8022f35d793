#![allow(dead_code)]

use std::{future::Future, rc::Rc, time::Duration};

use peer_negotiator::{proto::MediaKind, sys::MediaStreamTrack};
use tokio::task::LocalSet;

/// Runs `fut` on a fresh [`LocalSet`], so `spawn_local` works inside.
pub async fn local<F: Future>(fut: F) -> F::Output {
    LocalSet::new().run_until(fut).await
}

/// Waits until `cond` holds, panicking after a second.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition was not met in time");
}

/// Lets spawned tasks run for a while.
pub async fn idle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn track(id: &str, kind: MediaKind) -> Rc<MediaStreamTrack> {
    Rc::new(MediaStreamTrack::new(id, kind))
}
