// src/main.rs
use anyhow::{Context, Result};
use eframe::egui;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use hand_overlay::app::OverlayApp;
use hand_overlay::channel::{BroadcastChannel, LoopbackHub, WebSocketChannel};
use hand_overlay::compositor::{Compositor, PixmapSurface, Surface};
use hand_overlay::config::OverlaySettings;
use hand_overlay::estimator::{HandEstimator, SimulatedEstimator};
use hand_overlay::identity::{IdentityAssigner, PeerIdentity};
use hand_overlay::pose::PoseSource;
use hand_overlay::scheduler::{DisplayClock, FrameScheduler, FrameSnapshot, IntervalClock, Session};
use hand_overlay::video::{self, CameraSource, FrameSource};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let settings = OverlaySettings::load().context("failed to load settings")?;

    let cameras = video::list_cameras();
    info!(count = cameras.len(), "camera detection");
    for (i, name) in cameras.iter().enumerate() {
        info!(index = i, name = %name, "camera found");
    }

    let identity = IdentityAssigner::assign();
    info!(identity = %identity, server = %settings.server_url, "session identity assigned");

    let (frames_tx, frames_rx) = watch::channel(FrameSnapshot::default());
    let cancel = CancellationToken::new();

    let worker = {
        let identity = identity.clone();
        let cancel = cancel.clone();
        std::thread::Builder::new()
            .name("overlay-session".into())
            .spawn(move || run_session_thread(settings, identity, frames_tx, cancel))
            .context("failed to spawn session thread")?
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 640.0])
            .with_min_inner_size([480.0, 360.0]),
        centered: true,
        ..Default::default()
    };

    let result = eframe::run_native(
        "Hand Overlay",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
            Box::new(OverlayApp::new(identity, frames_rx))
        }),
    );

    // Window closed: let the in-flight tick finish and schedule no more.
    cancel.cancel();
    match worker.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %format!("{e:#}"), "session ended with an error"),
        Err(_) => error!("session thread panicked"),
    }

    result.map_err(|e| anyhow::anyhow!("failed to run window: {e:?}"))
}

fn run_session_thread(
    settings: OverlaySettings,
    identity: PeerIdentity,
    frames: watch::Sender<FrameSnapshot>,
    cancel: CancellationToken,
) -> Result<()> {
    // Ticks and the subscription handler share this one thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build session runtime")?;
    runtime.block_on(run_session(settings, identity, frames, cancel))
}

async fn run_session(
    settings: OverlaySettings,
    identity: PeerIdentity,
    frames: watch::Sender<FrameSnapshot>,
    cancel: CancellationToken,
) -> Result<()> {
    let (camera, notice) =
        match CameraSource::open(settings.camera_index, settings.video_width, settings.video_height) {
            Ok(camera) => (Some(camera), None),
            Err(e) => {
                warn!(error = %e, "camera unavailable; rendering peers only");
                (None, Some(e.to_string()))
            }
        };

    let (width, height) = camera
        .as_ref()
        .map(|c| c.resolution())
        .unwrap_or((settings.video_width, settings.video_height));
    let surface = PixmapSurface::new(width, height).context("overlay surface has zero size")?;
    let compositor = Compositor::new(settings.overlay_style());

    let pose_source = PoseSource::new(SimulatedEstimator::new(), identity.clone());
    let mut scheduler =
        FrameScheduler::new(pose_source, IntervalClock::new(settings.refresh_hz), cancel);
    if let Some(notice) = notice {
        scheduler = scheduler.with_notice(notice);
    }

    match WebSocketChannel::connect(&settings.server_url).await {
        Ok(channel) => {
            let session = Session::new(identity, channel, compositor, surface);
            drive(session, &settings, frames, scheduler, camera).await
        }
        Err(e) => {
            warn!(error = %e, "broadcast relay unreachable; running solo");
            let hub = LoopbackHub::new(64);
            let session = Session::new(identity, hub.join(), compositor, surface);
            drive(session, &settings, frames, scheduler, camera).await
        }
    }
}

async fn drive<C, S, E, K, V>(
    session: Session<C, S>,
    settings: &OverlaySettings,
    frames: watch::Sender<FrameSnapshot>,
    mut scheduler: FrameScheduler<E, K>,
    camera: Option<V>,
) -> Result<()>
where
    C: BroadcastChannel,
    S: Surface,
    E: HandEstimator,
    K: DisplayClock,
    V: FrameSource,
{
    let mut session = session
        .with_peer_ttl(settings.peer_ttl())
        .with_frame_sink(frames);
    session
        .listen()
        .context("failed to subscribe to broadcasts")?;

    scheduler.start(&mut session, camera).await?;
    Ok(())
}
