// src/scheduler.rs - Per-tick sample, publish, snapshot, composite loop
use std::sync::Arc;
use std::time::Duration;

use egui::ColorImage;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::BroadcastChannel;
use crate::compositor::{Compositor, RenderStats, Surface};
use crate::error::{SchedulerError, TransportError};
use crate::estimator::HandEstimator;
use crate::identity::PeerIdentity;
use crate::peers::PeerStateTable;
use crate::pose::{PosePayload, PoseSource};
use crate::video::FrameSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Source of display refresh boundaries between ticks.
#[allow(async_fn_in_trait)]
pub trait DisplayClock {
    async fn next_refresh(&mut self);
}

/// Fixed-rate refresh. A tick that overruns waits for the next boundary
/// instead of bursting to catch up.
pub struct IntervalClock {
    interval: Interval,
}

impl IntervalClock {
    /// Must be created inside a tokio runtime.
    pub fn new(refresh_hz: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / refresh_hz.max(1) as f64);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

impl DisplayClock for IntervalClock {
    async fn next_refresh(&mut self) {
        self.interval.tick().await;
    }
}

/// What the UI thread sees after each tick.
#[derive(Clone, Default)]
pub struct FrameSnapshot {
    pub tick: u64,
    pub image: Option<Arc<ColorImage>>,
    pub peers: Vec<PeerIdentity>,
    pub local_detected: bool,
    pub notice: Option<String>,
}

/// Everything one overlay session owns.
pub struct Session<C, S> {
    pub identity: PeerIdentity,
    pub peers: PeerStateTable,
    pub channel: C,
    pub compositor: Compositor,
    pub surface: S,
    pub peer_ttl: Option<Duration>,
    frames: Option<watch::Sender<FrameSnapshot>>,
}

impl<C: BroadcastChannel, S: Surface> Session<C, S> {
    pub fn new(identity: PeerIdentity, channel: C, compositor: Compositor, mut surface: S) -> Self {
        compositor.setup(&mut surface);
        Self {
            identity,
            peers: PeerStateTable::new(),
            channel,
            compositor,
            surface,
            peer_ttl: None,
            frames: None,
        }
    }

    pub fn with_peer_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.peer_ttl = ttl;
        self
    }

    pub fn with_frame_sink(mut self, frames: watch::Sender<FrameSnapshot>) -> Self {
        self.frames = Some(frames);
        self
    }

    /// Routes inbound broadcasts into the peer table, dropping our own echo.
    pub fn listen(&self) -> Result<(), TransportError> {
        let peers = self.peers.clone();
        let local = self.identity.clone();
        self.channel.subscribe(Box::new(move |message| {
            peers.ingest(&local, message);
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub local_detected: bool,
    pub published: bool,
    pub peers: usize,
    pub evicted: usize,
    pub render: RenderStats,
}

pub struct FrameScheduler<E, K> {
    pose_source: PoseSource<E>,
    clock: K,
    cancel: CancellationToken,
    state: SchedulerState,
    ticks: u64,
    notice: Option<String>,
    read_error: Option<String>,
}

impl<E: HandEstimator, K: DisplayClock> FrameScheduler<E, K> {
    pub fn new(pose_source: PoseSource<E>, clock: K, cancel: CancellationToken) -> Self {
        Self {
            pose_source,
            clock,
            cancel,
            state: SchedulerState::Idle,
            ticks: 0,
            notice: None,
            read_error: None,
        }
    }

    /// A user-visible message carried on every frame, e.g. a missing camera.
    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Prevents the next tick from being scheduled. An in-flight tick finishes.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Runs ticks until cancelled or the estimator fails.
    ///
    /// `video` is `None` when acquisition failed at startup; ticks then render
    /// peers only and never publish.
    pub async fn start<C, S, V>(
        &mut self,
        session: &mut Session<C, S>,
        mut video: Option<V>,
    ) -> Result<(), SchedulerError>
    where
        C: BroadcastChannel,
        S: Surface,
        V: FrameSource,
    {
        if self.state != SchedulerState::Idle {
            return Err(SchedulerError::AlreadyStarted);
        }
        self.state = SchedulerState::Running;
        info!(identity = %session.identity, camera = video.is_some(), "frame scheduler running");

        let result = self.run(session, &mut video).await;

        self.state = SchedulerState::Stopped;
        match &result {
            Ok(()) => info!(ticks = self.ticks, "frame scheduler stopped"),
            Err(e) => error!(ticks = self.ticks, error = %e, "frame scheduler halted"),
        }
        result
    }

    async fn run<C, S, V>(
        &mut self,
        session: &mut Session<C, S>,
        video: &mut Option<V>,
    ) -> Result<(), SchedulerError>
    where
        C: BroadcastChannel,
        S: Surface,
        V: FrameSource,
    {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            self.tick(session, video.as_mut()).await?;

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                _ = self.clock.next_refresh() => {}
            }
        }
    }

    /// One iteration: sample, publish if a hand was seen, snapshot, composite.
    pub async fn tick<C, S, V>(
        &mut self,
        session: &mut Session<C, S>,
        video: Option<&mut V>,
    ) -> Result<TickReport, SchedulerError>
    where
        C: BroadcastChannel,
        S: Surface,
        V: FrameSource,
    {
        let local = match video {
            Some(source) => match source.read_frame() {
                Ok(frame) => {
                    self.read_error = None;
                    self.pose_source.sample(&frame).await?
                }
                Err(e) => {
                    warn!(error = %e, "no video frame this tick");
                    self.read_error = Some(e.to_string());
                    PosePayload::empty(session.identity.clone())
                }
            },
            None => PosePayload::empty(session.identity.clone()),
        };

        let published = !local.is_empty();
        if published {
            session.channel.publish(&local);
        }

        let evicted = match session.peer_ttl {
            Some(ttl) => session.peers.evict_stale(Instant::now(), ttl).len(),
            None => 0,
        };
        let snapshot = session.peers.snapshot_all();
        let render = session
            .compositor
            .render(&mut session.surface, &local, &snapshot);

        self.ticks += 1;
        let report = TickReport {
            tick: self.ticks,
            local_detected: published,
            published,
            peers: snapshot.len(),
            evicted,
            render,
        };
        debug!(
            tick = report.tick,
            local = report.local_detected,
            peers = report.peers,
            polylines = report.render.polylines,
            "tick"
        );

        if let Some(frames) = &session.frames {
            frames.send_replace(FrameSnapshot {
                tick: self.ticks,
                image: session.surface.to_color_image().map(Arc::new),
                peers: snapshot.into_iter().map(|(identity, _)| identity).collect(),
                local_detected: published,
                notice: self.read_error.clone().or_else(|| self.notice.clone()),
            });
        }

        Ok(report)
    }
}
