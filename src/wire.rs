// src/wire.rs - JSON broadcast message
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::WireError;
use crate::identity::PeerIdentity;
use crate::pose::{PosePayload, Skeleton};

/// One broadcast: `{ "user": "#rrggbb", "predictions": [{ "landmarks": [[x,y,z], ...] }] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub user: PeerIdentity,
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

/// Estimator output for one hand. Extra estimator fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub landmarks: Vec<Vec<f64>>,
}

impl WireMessage {
    pub fn from_payload(payload: &PosePayload) -> Self {
        Self {
            user: payload.identity.clone(),
            predictions: payload
                .skeletons
                .iter()
                .map(|skeleton| Prediction {
                    landmarks: skeleton.to_landmarks(),
                })
                .collect(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Validates the message into a payload.
    ///
    /// Only the first prediction is kept, and it must be a well-formed skeleton
    /// or the whole message is rejected. Later predictions are never drawn, so
    /// they are dropped unparsed.
    pub fn into_payload(self) -> Result<PosePayload, WireError> {
        let extra = self.predictions.len().saturating_sub(1);
        let Some(first) = self.predictions.into_iter().next() else {
            return Ok(PosePayload::empty(self.user));
        };
        if extra > 0 {
            debug!(user = %self.user, extra, "ignoring extra predictions");
        }

        let skeleton = Skeleton::from_landmarks(&first.landmarks)?;
        Ok(PosePayload::new(self.user, vec![skeleton]))
    }
}
