mod common;

use std::{rc::Rc, time::Duration};

use futures::StreamExt as _;
use peer_negotiator::{
    error::{NegotiationError, RtcError, TransportError},
    proto::{IceCandidate, MediaKind, TransceiverDirection},
    sys::{
        LoopbackPeerConnection, LoopbackSignaling, Operation,
        SignalingState,
    },
    Config, Peer, Room,
};

use self::common::{eventually, idle, local, track};

async fn next_error(peer: &Peer) -> Rc<NegotiationError> {
    let mut errors = peer.on_error();
    tokio::time::timeout(Duration::from_secs(1), errors.next())
        .await
        .expect("no error reported")
        .expect("error stream ended")
}

/// Waits until `peer` is back in `Stable` with no round in flight.
async fn settled(peer: &Peer) {
    eventually(|| {
        !peer.is_negotiating()
            && peer.signaling_state() == SignalingState::Stable
    })
    .await;
}

#[tokio::test]
async fn requests_during_round_are_coalesced() {
    local(async {
        let room = Room::new(&Config::default());

        room.local().add_track(track("a", MediaKind::Audio)).unwrap();
        room.local().add_track(track("v", MediaKind::Video)).unwrap();
        assert!(room.local().is_negotiating());
        assert!(!room.local().request_negotiation());

        room.when_settled().await;

        assert_eq!(room.local_pc().create_offer_calls(), 1);
        assert_eq!(room.local().negotiation_rounds(), 1);
        assert_eq!(room.local().signaling_state(), SignalingState::Stable);
        assert_eq!(room.remote().receivers().len(), 2);
        assert!(room.remote().receivers().iter().all(|r| r.is_receiving()));
    })
    .await;
}

#[tokio::test]
async fn lock_is_released_after_round() {
    local(async {
        let room = Room::new(&Config::default());
        room.local().add_track(track("a", MediaKind::Audio)).unwrap();
        room.when_settled().await;

        assert!(!room.local().is_negotiating());
        assert!(room.local().request_negotiation());
        room.when_settled().await;
        assert_eq!(room.local_pc().create_offer_calls(), 2);
    })
    .await;
}

#[tokio::test]
async fn muting_does_not_renegotiate() {
    local(async {
        let room = Room::new(&Config::default());
        let audio = track("a", MediaKind::Audio);
        let sender = room.local().add_track(audio.clone()).unwrap();
        room.when_settled().await;
        let offer = room.local_pc().local_description();

        sender.set_muted(true);
        idle().await;

        assert!(!audio.enabled());
        assert!(!room.local().is_negotiating());
        assert_eq!(room.local_pc().create_offer_calls(), 1);
        assert_eq!(room.local_pc().local_description(), offer);
        assert!(room.local_pc().sending_layers(sender.id()).is_empty());

        sender.set_muted(false);
        assert!(audio.enabled());
        assert_eq!(room.local_pc().create_offer_calls(), 1);
    })
    .await;
}

#[tokio::test]
async fn remove_then_add_in_one_round() {
    local(async {
        let room = Room::new(&Config::default());
        let audio = track("a", MediaKind::Audio);
        let sender = room.local().add_track(audio.clone()).unwrap();
        room.when_settled().await;

        room.local().remove_track(&sender).unwrap();
        let readded = room.local().add_track(audio).unwrap();
        room.when_settled().await;

        assert_eq!(readded.id(), sender.id());
        assert_eq!(room.local_pc().create_offer_calls(), 2);
        assert_eq!(room.local_pc().transceivers_count(), 1);
        assert!(room.remote().receivers()[0].is_receiving());
    })
    .await;
}

#[tokio::test]
async fn removed_track_stops_remote_receiver() {
    local(async {
        let room = Room::new(&Config::default());
        let audio = track("a", MediaKind::Audio);
        let sender = room.local().add_track(audio.clone()).unwrap();
        room.when_settled().await;
        let receiver = room.remote().receivers()[0].clone();

        room.local().remove_track(&sender).unwrap();
        room.when_settled().await;
        eventually(|| !receiver.is_receiving()).await;
        assert_eq!(receiver.direction(), TransceiverDirection::Inactive);
        assert!(sender.track().is_none());

        room.local().add_track(audio).unwrap();
        room.when_settled().await;
        eventually(|| receiver.is_receiving()).await;

        assert_eq!(room.local_pc().create_offer_calls(), 3);
        assert_eq!(room.remote().receivers().len(), 1);
    })
    .await;
}

#[tokio::test]
async fn failed_round_releases_lock() {
    local(async {
        let room = Room::new(&Config::default());
        room.local_pc().inject_failure(
            Operation::CreateOffer,
            RtcError::Operation("boom".to_string()),
        );

        room.local().add_track(track("a", MediaKind::Audio)).unwrap();
        let err = next_error(room.local()).await;
        assert!(matches!(&*err, NegotiationError::CreateOffer(_)));
        assert_eq!(
            err.rtc_error(),
            Some(&RtcError::Operation("boom".to_string())),
        );

        eventually(|| !room.local().is_negotiating()).await;
        assert!(room.local().last_error().is_some());
        assert!(room.local().request_negotiation());
        room.when_settled().await;
        assert_eq!(room.local_pc().create_offer_calls(), 1);
        assert_eq!(room.remote().receivers().len(), 1);
    })
    .await;
}

#[tokio::test]
async fn disconnected_transport_fails_round() {
    local(async {
        let room = Room::new(&Config::default());
        room.local_signaling().disconnect();

        room.local().add_track(track("a", MediaKind::Audio)).unwrap();
        let err = next_error(room.local()).await;

        assert_eq!(
            *err,
            NegotiationError::Transport(TransportError::Closed),
        );

        settled(room.local()).await;
        assert!(room.local_pc().local_description().is_none());
        assert!(room.local().request_negotiation());
    })
    .await;
}

#[tokio::test]
async fn missing_answer_times_out() {
    local(async {
        let mut config = Config::default();
        config.negotiation.answer_timeout_ms = 100;
        let room = Room::new(&config);
        let mut local_errors = room.local().on_error();
        let mut remote_errors = room.remote().on_error();
        room.remote_pc().inject_failure(
            Operation::CreateAnswer,
            RtcError::Operation("no answer".to_string()),
        );

        room.local().add_track(track("a", MediaKind::Audio)).unwrap();

        let remote_err = remote_errors.next().await.unwrap();
        assert!(matches!(&*remote_err, NegotiationError::CreateAnswer(_)));
        let local_err = local_errors.next().await.unwrap();
        assert_eq!(
            *local_err,
            NegotiationError::AnswerTimeout(Duration::from_millis(100)),
        );

        settled(room.local()).await;
        settled(room.remote()).await;
        assert_eq!(room.remote_pc().transceivers_count(), 0);

        assert!(room.local().request_negotiation());
        room.when_settled().await;
        assert_eq!(room.local_pc().create_offer_calls(), 2);
        assert_eq!(room.remote().receivers().len(), 1);
    })
    .await;
}

#[tokio::test]
async fn simultaneous_offers_do_not_wedge_session() {
    local(async {
        let mut config = Config::default();
        config.negotiation.answer_timeout_ms = 100;
        let room = Room::new(&config);
        let mut local_errors = room.local().on_error();
        let mut remote_errors = room.remote().on_error();

        room.local().add_track(track("a", MediaKind::Audio)).unwrap();
        room.remote().add_track(track("b", MediaKind::Audio)).unwrap();

        let local_err = local_errors.next().await.unwrap();
        let remote_err = remote_errors.next().await.unwrap();
        assert!(matches!(&*local_err, NegotiationError::AnswerTimeout(_)));
        assert!(matches!(&*remote_err, NegotiationError::AnswerTimeout(_)));

        settled(room.local()).await;
        settled(room.remote()).await;

        assert!(room.local().request_negotiation());
        room.when_settled().await;
        eventually(|| room.remote().receivers().len() == 1).await;
        assert!(room.remote().receivers()[0].is_receiving());

        assert!(room.remote().request_negotiation());
        room.when_settled().await;
        eventually(|| room.local().receivers().len() == 1).await;
        assert_eq!(room.local().signaling_state(), SignalingState::Stable);
        assert_eq!(room.remote().signaling_state(), SignalingState::Stable);
    })
    .await;
}

#[tokio::test]
async fn candidates_are_exchanged() {
    local(async {
        let room = Room::new(&Config::default());
        room.local().add_track(track("a", MediaKind::Audio)).unwrap();
        room.when_settled().await;

        eventually(|| room.remote_pc().applied_candidates().len() == 1).await;
        eventually(|| room.local_pc().applied_candidates().len() == 1).await;
        assert_eq!(room.local().pending_candidates(), 0);
        assert_eq!(room.remote().pending_candidates(), 0);
    })
    .await;
}

#[tokio::test]
async fn early_candidates_are_queued() {
    local(async {
        let pc = Rc::new(LoopbackPeerConnection::new("solo"));
        let (transport, _other) = LoopbackSignaling::pair();
        let peer = Peer::new(
            "solo",
            pc.clone(),
            Rc::new(transport),
            &Config::default(),
        );
        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 1 127.0.0.1 9 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        };

        peer.on_remote_candidate(Some(candidate)).await.unwrap();
        assert_eq!(peer.pending_candidates(), 1);
        assert!(pc.applied_candidates().is_empty());

        peer.on_remote_candidate(None).await.unwrap();
        assert_eq!(peer.pending_candidates(), 1);
    })
    .await;
}

#[tokio::test]
async fn malformed_candidate_is_reported() {
    local(async {
        let room = Room::new(&Config::default());
        room.local().add_track(track("a", MediaKind::Audio)).unwrap();
        room.when_settled().await;

        let err = room
            .local()
            .on_remote_candidate(Some(IceCandidate {
                candidate: "garbage".to_string(),
                sdp_mid: None,
                sdp_m_line_index: None,
            }))
            .await
            .unwrap_err();
        assert_eq!(err.candidate, "garbage");
        assert!(room.local().last_error().is_none());
    })
    .await;
}

#[tokio::test]
async fn forced_sendonly_offer() {
    local(async {
        let mut config = Config::default();
        config.negotiation.force_sendonly = true;
        let room = Room::new(&config);

        room.local().add_track(track("a", MediaKind::Audio)).unwrap();
        room.when_settled().await;

        let offer = room.remote_pc().remote_description().unwrap();
        assert!(offer.sdp.contains("a=sendonly"));
        assert_eq!(
            room.remote().receivers()[0].direction(),
            TransceiverDirection::RecvOnly,
        );
    })
    .await;
}

#[tokio::test]
async fn closed_session_is_quiet() {
    local(async {
        let room = Room::new(&Config::default());
        room.local().add_track(track("a", MediaKind::Audio)).unwrap();
        room.close();
        idle().await;

        assert!(room.local().last_error().is_none());
        assert!(!room.local().request_negotiation());
        assert_eq!(
            room.local().add_track(track("b", MediaKind::Audio)).err(),
            Some(RtcError::Closed),
        );
    })
    .await;
}
