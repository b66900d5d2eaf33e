//! Shared live hand-skeleton overlay.
//!
//! Each tick samples the local hand, publishes it, merges the latest pose of
//! every peer and composites everything onto a mirrored, slowly fading surface.

pub mod app;
pub mod channel;
pub mod compositor;
pub mod config;
pub mod error;
pub mod estimator;
pub mod identity;
pub mod peers;
pub mod pose;
pub mod scheduler;
pub mod ui;
pub mod video;
pub mod wire;

pub use channel::{BroadcastChannel, LoopbackHub, WebSocketChannel};
pub use compositor::{Compositor, OverlayStyle, PixmapSurface, RecordingSurface, Surface};
pub use config::OverlaySettings;
pub use identity::{IdentityAssigner, PeerIdentity};
pub use peers::PeerStateTable;
pub use pose::{Finger, PosePayload, PoseSource, Skeleton};
pub use scheduler::{FrameScheduler, FrameSnapshot, IntervalClock, SchedulerState, Session};
pub use wire::WireMessage;
