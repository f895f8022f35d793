use std::rc::Rc;

use anyhow::Context as _;
use peer_negotiator::{
    proto::{MediaKind, MediaStreamConstraints},
    sys::{FakeMediaDevices, MediaDevices as _, MediaStreamTrack},
    Config, MediaControls, Room,
};
use tokio::task;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Config::load_from_file(Config::DEFAULT_PATH)
        .context("failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    task::LocalSet::new()
        .run_until(async move {
            mute_tracks(&config).await?;
            simulcast(&config).await
        })
        .await
}

/// Sends audio and video, then toggles them without renegotiating where
/// possible.
async fn mute_tracks(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Starting mute tracks demo");
    let room = Room::new(config);
    let devices = FakeMediaDevices::new();

    let tracks = devices
        .get_user_media(MediaStreamConstraints {
            audio: true,
            video: true,
        })
        .await?;

    let mut controls = Vec::new();
    for track in tracks {
        let sender = room.local().add_track(Rc::clone(&track))?;
        controls.push(MediaControls::new(Rc::clone(room.local()), track, sender));
    }
    room.when_settled().await;
    tracing::info!(
        rounds = room.local().negotiation_rounds(),
        "Initial negotiation done",
    );

    for control in &controls {
        control.toggle_disable(true);
        control.toggle_disable(false);

        let kind = control.track().kind();
        control.set_replacement(Some(Rc::new(MediaStreamTrack::new(
            format!("{}-replacement", kind),
            kind,
        ))));
        control.toggle_replace(true).await?;
        control.toggle_replace(false).await?;

        control.toggle_remove(true)?;
        room.when_settled().await;
        control.toggle_remove(false)?;
        room.when_settled().await;
    }

    tracing::info!(
        rounds = room.local().negotiation_rounds(),
        receivers = room.remote().receivers().len(),
        "Mute tracks demo finished",
    );
    room.close();
    Ok(())
}

/// Sends three simulcast layers of one video track and switches between
/// them.
async fn simulcast(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Starting simulcast demo");
    let room = Room::new(config);
    let devices = FakeMediaDevices::with_kinds(vec![MediaKind::Video]);

    let tracks = devices
        .get_user_media(MediaStreamConstraints {
            audio: false,
            video: true,
        })
        .await?;
    let track = tracks
        .into_iter()
        .next()
        .context("no video track captured")?;

    let sender = room.local().add_simulcast_transceiver(track)?;
    room.when_settled().await;
    tracing::info!(
        layers = ?room.local_pc().sending_layers(sender.id()),
        "Simulcast negotiated",
    );

    for layer in ["0", "1", "2"] {
        sender.select_layer(layer).await?;
        tracing::info!(
            layer,
            active = ?sender.parameters()?.active_rids(),
            "Layer selected",
        );
    }

    room.close();
    Ok(())
}
