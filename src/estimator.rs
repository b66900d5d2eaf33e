// src/estimator.rs - Hand estimator collaborators
use std::collections::VecDeque;

use tracing::debug;

use crate::error::EstimationError;
use crate::video::VideoFrame;
use crate::wire::Prediction;

/// The external pose model: one video frame in, zero or more hands out.
#[allow(async_fn_in_trait)]
pub trait HandEstimator {
    async fn estimate(&mut self, frame: &VideoFrame) -> Result<Vec<Prediction>, EstimationError>;
}

/// Fallback used when no model is bundled: a waving hand that periodically
/// leaves the view so the empty-sample path is exercised too.
pub struct SimulatedEstimator {
    sim_time: f64,
    step: f64,
}

// Base angle of each finger from vertical, thumb first.
const FINGER_ANGLES: [f64; 5] = [-1.0, -0.35, -0.05, 0.25, 0.55];

impl SimulatedEstimator {
    pub fn new() -> Self {
        Self {
            sim_time: 0.0,
            step: 0.033,
        }
    }

    fn hand_visible(&self) -> bool {
        (self.sim_time * 0.4).sin() > -0.85
    }

    fn hand_at(&self, width: f64, height: f64) -> Vec<Vec<f64>> {
        let t = self.sim_time;
        let wrist_x = width * (0.5 + 0.2 * (t * 0.5).cos());
        let wrist_y = height * (0.75 + 0.05 * t.sin());
        let scale = width.min(height) * 0.12;

        let mut landmarks = Vec::with_capacity(21);
        landmarks.push(vec![wrist_x, wrist_y, 0.0]);

        for (finger, base_angle) in FINGER_ANGLES.iter().enumerate() {
            let curl = 0.15 * (t * 2.0 + finger as f64).sin();
            for joint in 1..=4 {
                let joint = joint as f64;
                let angle = base_angle + curl * joint;
                let reach = scale * (0.9 + 0.55 * joint);
                landmarks.push(vec![
                    wrist_x + reach * angle.sin(),
                    wrist_y - reach * angle.cos(),
                    -2.0 * joint,
                ]);
            }
        }

        landmarks
    }
}

impl Default for SimulatedEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl HandEstimator for SimulatedEstimator {
    async fn estimate(&mut self, frame: &VideoFrame) -> Result<Vec<Prediction>, EstimationError> {
        self.sim_time += self.step;

        if !self.hand_visible() {
            return Ok(Vec::new());
        }

        let landmarks = self.hand_at(frame.width() as f64, frame.height() as f64);
        Ok(vec![Prediction { landmarks }])
    }
}

/// Replays a fixed queue of results, then reports no hands.
pub struct ScriptedEstimator {
    script: VecDeque<Vec<Prediction>>,
    calls: usize,
}

impl ScriptedEstimator {
    pub fn new(script: Vec<Vec<Prediction>>) -> Self {
        Self {
            script: script.into(),
            calls: 0,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl HandEstimator for ScriptedEstimator {
    async fn estimate(&mut self, _frame: &VideoFrame) -> Result<Vec<Prediction>, EstimationError> {
        self.calls += 1;
        let next = self.script.pop_front().unwrap_or_default();
        debug!(call = self.calls, hands = next.len(), "scripted estimate");
        Ok(next)
    }
}
