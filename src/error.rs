// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Camera or video acquisition failed. Never fatal: the tick renders peers only.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("failed to open camera {index}: {reason}")]
    Open { index: u32, reason: String },
    #[error("failed to capture frame: {0}")]
    Capture(String),
    #[error("failed to decode frame: {0}")]
    Decode(String),
}

/// The pose estimator failed. Fatal for the scheduler.
#[derive(Debug, Error)]
pub enum EstimationError {
    #[error("estimator failed: {0}")]
    Inference(String),
    #[error("estimator returned a malformed prediction: {0}")]
    MalformedOutput(#[from] WireError),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("channel already subscribed")]
    AlreadySubscribed,
}

/// An inbound message or estimator output that cannot be turned into a payload.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected 21 landmarks, got {0}")]
    LandmarkCount(usize),
    #[error("landmark {index} has {len} coordinates, expected 2 or 3")]
    CoordinateCount { index: usize, len: usize },
    #[error("landmark {0} has a non-finite coordinate")]
    NonFinite(usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("refresh_hz must be greater than zero")]
    ZeroRefreshRate,
    #[error("video dimensions must be non-zero")]
    EmptyVideo,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler already started")]
    AlreadyStarted,
    #[error(transparent)]
    Estimation(#[from] EstimationError),
}
