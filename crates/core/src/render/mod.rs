//! Render-side collaborators.
//!
//! Painting lives outside this crate. A renderer observes the node graph and
//! cell store and implements [`RenderConsumer::animate_to`]. [`Animator`] is a
//! frame-stepped implementation that writes tweened values back into cells.

use std::{collections::HashMap, f64::consts::PI, time::Duration};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{CellStore, Value};

/// Named easing curve for animations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Curve {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    Spring,
}

impl Curve {
    /// Maps linear progress `t` in `[0, 1]` onto the curve.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseIn => t * t,
            Self::EaseOut => t * (2.0 - t),
            Self::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
            // Damped oscillation pinned to 0 and 1 at the ends.
            Self::Spring => 1.0 - (1.0 - t) * (-6.0 * t).exp() * (3.0 * PI * t).cos(),
        }
    }
}

/// Consumer of the runtime's visual state.
pub trait RenderConsumer: Send + Sync {
    /// Moves `cell_id` toward `target` over `duration` along `curve`.
    fn animate_to(&self, cell_id: &str, target: f64, duration: Duration, curve: Curve);
}

/// Renderer that ignores animation requests.
#[derive(Debug, Default)]
pub struct NullRenderer;

impl RenderConsumer for NullRenderer {
    fn animate_to(&self, _cell_id: &str, _target: f64, _duration: Duration, _curve: Curve) {}
}

#[derive(Debug, Clone)]
struct Tween {
    target: f64,
    duration: Duration,
    curve: Curve,
    /// Filled in on the first frame after the request.
    start: Option<(Duration, f64)>,
}

/// Frame-stepped tween engine.
#[derive(Debug, Default)]
pub struct Animator {
    tweens: Mutex<HashMap<String, Tween>>,
}

impl Animator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> usize {
        self.tweens.lock().len()
    }

    pub fn is_animating(&self, cell_id: &str) -> bool {
        self.tweens.lock().contains_key(cell_id)
    }

    /// Advances every tween to `now` and writes the eased values. Finished
    /// tweens land exactly on their target and are dropped. Only numeric
    /// cells animate; a tween on any other cell is discarded untouched.
    pub fn step(&self, cells: &CellStore, now: Duration) {
        let mut tweens = self.tweens.lock();
        tweens.retain(|cell_id, tween| {
            if !matches!(cells.read(cell_id), Some(Value::Number(_))) {
                tracing::debug!(cell = %cell_id, "tween on missing or non-numeric cell dropped");
                return false;
            }
            let (started, from) = *tween
                .start
                .get_or_insert_with(|| (now, cells.read_number(cell_id)));
            let elapsed = now.saturating_sub(started);
            let progress = if tween.duration.is_zero() {
                1.0
            } else {
                elapsed.as_secs_f64() / tween.duration.as_secs_f64()
            };

            if progress >= 1.0 {
                cells.write(cell_id, tween.target.into());
                return false;
            }
            let eased = tween.curve.apply(progress);
            cells.write(cell_id, (from + (tween.target - from) * eased).into());
            true
        });
    }
}

impl RenderConsumer for Animator {
    fn animate_to(&self, cell_id: &str, target: f64, duration: Duration, curve: Curve) {
        tracing::debug!(cell = cell_id, target, ?duration, ?curve, "animation requested");
        self.tweens.lock().insert(
            cell_id.to_string(),
            Tween {
                target,
                duration,
                curve,
                start: None,
            },
        );
    }
}
