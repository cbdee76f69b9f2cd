use serde_derive::{Deserialize, Serialize};
use std::fmt;

use crate::detection::distance;
use crate::math::round_to;
use crate::{Detection, Track};

const MPS_TO_KMH: f64 = 3.6;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct KinematicsConfig {
    /// Camera calibration, image pixels per real-world meter
    pub pixels_per_meter: f64,
    pub fps: f64,
    /// Observations spanned by a speed estimate
    pub speed_window: usize,
    /// Observations needed before a direction is reported
    pub direction_min_history: usize,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self {
            pixels_per_meter: 8.0,
            fps: 30.0,
            speed_window: 10,
            direction_min_history: 2,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Dominant axis of the displacement; horizontal wins when |dx| == |dy|.
    pub fn from_delta(dx: i64, dy: i64) -> Self {
        if dy.unsigned_abs() > dx.unsigned_abs() {
            if dy > 0 {
                Direction::Down
            } else {
                Direction::Up
            }
        } else if dx > 0 {
            Direction::Right
        } else {
            Direction::Left
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speed and heading from a track's history.
///
/// Nothing is cached: every call looks at the history as it is now.
#[derive(Debug, Clone)]
pub struct Kinematics {
    config: KinematicsConfig,
}

impl Kinematics {
    pub fn new(config: KinematicsConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &KinematicsConfig {
        &self.config
    }

    /// Speed in km/h between the first and last of the most recent
    /// `speed_window` observations, rounded to two decimals.
    pub fn estimate_speed(&self, track: &Track) -> Option<f64> {
        let window = self.config.speed_window;

        if track.history().len() < window {
            return None;
        }

        let recent = track.recent(window);
        let (first, last) = (recent.first()?, recent.last()?);

        let pixels = distance(first.detection.center(), last.detection.center());
        let meters = pixels / self.config.pixels_per_meter;

        let frames = last.frame.saturating_sub(first.frame);
        let seconds = frames as f64 / self.config.fps;

        if seconds == 0.0 {
            return None;
        }

        Some(round_to(meters / seconds * MPS_TO_KMH, 2))
    }

    /// Heading from the first observation ever recorded to `current`.
    pub fn direction(&self, track: &Track, current: &Detection) -> Option<Direction> {
        if track.history().len() < self.config.direction_min_history {
            return None;
        }

        let from = track.first().detection.center();
        let to = current.center();

        Some(Direction::from_delta(
            i64::from(to.x) - i64::from(from.x),
            i64::from(to.y) - i64::from(from.y),
        ))
    }
}
