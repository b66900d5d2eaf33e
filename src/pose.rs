// src/pose.rs - Hand skeleton model and the per-tick pose source
use nalgebra::Vector3;
use tracing::trace;

use crate::error::{EstimationError, WireError};
use crate::estimator::HandEstimator;
use crate::identity::PeerIdentity;
use crate::video::VideoFrame;

/// A landmark in video pixel space. `z` is kept but never drawn.
pub type Keypoint = Vector3<f64>;

pub const SKELETON_LEN: usize = 21;
pub const WRIST: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    /// Landmark indices of the polyline drawn for this finger, wrist first.
    pub const fn indices(self) -> [usize; 5] {
        match self {
            Finger::Thumb => [WRIST, 1, 2, 3, 4],
            Finger::Index => [WRIST, 5, 6, 7, 8],
            Finger::Middle => [WRIST, 9, 10, 11, 12],
            Finger::Ring => [WRIST, 13, 14, 15, 16],
            Finger::Pinky => [WRIST, 17, 18, 19, 20],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Finger::Thumb => "thumb",
            Finger::Index => "index",
            Finger::Middle => "middle",
            Finger::Ring => "ring",
            Finger::Pinky => "pinky",
        }
    }
}

/// 21 hand landmarks at fixed anatomical indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    points: [Keypoint; SKELETON_LEN],
}

impl Skeleton {
    pub fn new(points: [Keypoint; SKELETON_LEN]) -> Self {
        Self { points }
    }

    /// Builds a skeleton from `[x, y]` or `[x, y, z]` rows. A missing `z` reads as 0.
    pub fn from_landmarks<R: AsRef<[f64]>>(landmarks: &[R]) -> Result<Self, WireError> {
        if landmarks.len() != SKELETON_LEN {
            return Err(WireError::LandmarkCount(landmarks.len()));
        }

        let mut points = Vec::with_capacity(SKELETON_LEN);
        for (index, row) in landmarks.iter().enumerate() {
            let row = row.as_ref();
            let point = match *row {
                [x, y] => Vector3::new(x, y, 0.0),
                [x, y, z] => Vector3::new(x, y, z),
                _ => {
                    return Err(WireError::CoordinateCount {
                        index,
                        len: row.len(),
                    })
                }
            };
            if !point.iter().all(|c| c.is_finite()) {
                return Err(WireError::NonFinite(index));
            }
            points.push(point);
        }

        let points: [Keypoint; SKELETON_LEN] = points
            .try_into()
            .map_err(|rest: Vec<Keypoint>| WireError::LandmarkCount(rest.len()))?;
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Keypoint; SKELETON_LEN] {
        &self.points
    }

    pub fn wrist(&self) -> Keypoint {
        self.points[WRIST]
    }

    pub fn finger(&self, finger: Finger) -> [Keypoint; 5] {
        finger.indices().map(|index| self.points[index])
    }

    pub fn to_landmarks(&self) -> Vec<Vec<f64>> {
        self.points.iter().map(|p| vec![p.x, p.y, p.z]).collect()
    }
}

/// One client's pose for one tick. May hold zero skeletons.
#[derive(Debug, Clone, PartialEq)]
pub struct PosePayload {
    pub identity: PeerIdentity,
    pub skeletons: Vec<Skeleton>,
}

impl PosePayload {
    pub fn new(identity: PeerIdentity, skeletons: Vec<Skeleton>) -> Self {
        Self {
            identity,
            skeletons,
        }
    }

    pub fn empty(identity: PeerIdentity) -> Self {
        Self::new(identity, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.skeletons.is_empty()
    }

    /// The only skeleton the compositor draws.
    pub fn primary(&self) -> Option<&Skeleton> {
        self.skeletons.first()
    }
}

/// Pull-based adapter over the estimator: one payload per call.
pub struct PoseSource<E> {
    estimator: E,
    identity: PeerIdentity,
}

impl<E: HandEstimator> PoseSource<E> {
    pub fn new(estimator: E, identity: PeerIdentity) -> Self {
        Self {
            estimator,
            identity,
        }
    }

    pub fn identity(&self) -> &PeerIdentity {
        &self.identity
    }

    /// Runs one inference call. No hand detected yields an empty payload.
    pub async fn sample(&mut self, frame: &VideoFrame) -> Result<PosePayload, EstimationError> {
        let predictions = self.estimator.estimate(frame).await?;
        let skeletons = predictions
            .iter()
            .map(|prediction| Skeleton::from_landmarks(&prediction.landmarks))
            .collect::<Result<Vec<_>, _>>()?;

        trace!(hands = skeletons.len(), "pose sampled");
        Ok(PosePayload::new(self.identity.clone(), skeletons))
    }
}
