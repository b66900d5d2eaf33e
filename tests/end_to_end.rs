use egui::Color32;
use image::DynamicImage;
use tokio_util::sync::CancellationToken;

use hand_overlay::channel::LoopbackHub;
use hand_overlay::compositor::{Compositor, OverlayStyle, RecordingSurface};
use hand_overlay::error::AcquisitionError;
use hand_overlay::estimator::ScriptedEstimator;
use hand_overlay::identity::PeerIdentity;
use hand_overlay::pose::{PosePayload, PoseSource};
use hand_overlay::scheduler::{DisplayClock, FrameScheduler, Session};
use hand_overlay::video::{FrameSource, VideoFrame};
use hand_overlay::wire::{Prediction, WireMessage};

struct StillCamera;

impl FrameSource for StillCamera {
    fn read_frame(&mut self) -> Result<VideoFrame, AcquisitionError> {
        Ok(DynamicImage::new_rgb8(640, 500))
    }

    fn resolution(&self) -> (u32, u32) {
        (640, 500)
    }
}

struct NoWait;

impl DisplayClock for NoWait {
    async fn next_refresh(&mut self) {}
}

fn origin_hand() -> Vec<Prediction> {
    vec![Prediction {
        landmarks: vec![vec![0.0, 0.0, 0.0]; 21],
    }]
}

fn client(
    hub: &LoopbackHub,
    id: &str,
    script: Vec<Vec<Prediction>>,
) -> (
    Session<hand_overlay::channel::LoopbackChannel, RecordingSurface>,
    FrameScheduler<ScriptedEstimator, NoWait>,
) {
    let identity = PeerIdentity::new(id);
    let session = Session::new(
        identity.clone(),
        hub.join(),
        Compositor::new(OverlayStyle::default()),
        RecordingSurface::new(640.0, 500.0),
    );
    session.listen().unwrap();
    let scheduler = FrameScheduler::new(
        PoseSource::new(ScriptedEstimator::new(script), identity),
        NoWait,
        CancellationToken::new(),
    );
    (session, scheduler)
}

async fn deliver() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn peer_pose_reaches_receiver_and_is_drawn_in_its_color() {
    let hub = LoopbackHub::new(32);
    let (mut sender, mut sender_scheduler) = client(&hub, "#aabbcc", vec![origin_hand()]);
    let (mut receiver, mut receiver_scheduler) = client(&hub, "#111111", vec![]);

    let sent = sender_scheduler
        .tick(&mut sender, Some(&mut StillCamera))
        .await
        .unwrap();
    assert!(sent.published);
    deliver().await;

    let expected = WireMessage {
        user: PeerIdentity::new("#aabbcc"),
        predictions: origin_hand(),
    }
    .into_payload()
    .unwrap();
    let snapshot = receiver.peers.snapshot_all();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].0.as_str(), "#aabbcc");
    assert_eq!(snapshot[0].1, expected);

    // The sender's own echo never lands in its table.
    assert!(sender.peers.is_empty());

    receiver.surface.clear();
    let report = receiver_scheduler
        .tick(&mut receiver, Some(&mut StillCamera))
        .await
        .unwrap();
    assert!(!report.published);
    assert_eq!(report.render.polylines, 5);

    let polylines: Vec<_> = receiver.surface.polylines().collect();
    assert_eq!(polylines.len(), 5);
    for (points, color) in polylines {
        assert_eq!(points.len(), 5);
        assert_eq!(color, Color32::from_rgba_unmultiplied(0xaa, 0xbb, 0xcc, 0xda));
    }
}

#[tokio::test]
async fn malformed_broadcast_cannot_break_rendering_for_other_peers() {
    let hub = LoopbackHub::new(32);
    let (mut sender, mut sender_scheduler) = client(&hub, "#aabbcc", vec![origin_hand()]);
    let (mut receiver, mut receiver_scheduler) = client(&hub, "#111111", vec![]);

    sender_scheduler
        .tick(&mut sender, Some(&mut StillCamera))
        .await
        .unwrap();
    hub.inject_raw(r##"{"user":"#aabbcc","predictions":[{"landmarks":[[1,2,3]]}]}"##);
    hub.inject_raw("garbage");
    deliver().await;

    let stored = receiver.peers.get(&PeerIdentity::new("#aabbcc")).unwrap();
    assert_eq!(stored.skeletons.len(), 1);

    let report = receiver_scheduler
        .tick(&mut receiver, Some(&mut StillCamera))
        .await
        .unwrap();
    assert_eq!(report.render.polylines, 5);
}

#[tokio::test]
async fn later_arrival_wins_even_with_empty_predictions() {
    let hub = LoopbackHub::new(32);
    let (mut sender, mut sender_scheduler) = client(&hub, "#aabbcc", vec![origin_hand()]);
    let (receiver, _) = client(&hub, "#111111", vec![]);

    sender_scheduler
        .tick(&mut sender, Some(&mut StillCamera))
        .await
        .unwrap();
    hub.inject_raw(r##"{"user":"#aabbcc","predictions":[]}"##);
    deliver().await;

    let stored = receiver.peers.get(&PeerIdentity::new("#aabbcc")).unwrap();
    assert_eq!(stored, PosePayload::empty(PeerIdentity::new("#aabbcc")));
}
