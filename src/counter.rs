use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::color::VehicleColor;
use crate::math::round_to;
use crate::{Detection, Track};

/// Aggregates over every vehicle counted so far.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Statistics {
    pub total: u64,
    pub by_class: BTreeMap<String, u64>,
    pub by_color: BTreeMap<VehicleColor, u64>,
    speed_sum: f64,
    speed_samples: u64,
}

impl Statistics {
    fn record(&mut self, class: &str, color: VehicleColor, speed: f64) {
        self.total += 1;
        *self.by_class.entry(class.to_string()).or_default() += 1;
        *self.by_color.entry(color).or_default() += 1;
        self.speed_sum += speed;
        self.speed_samples += 1;
    }

    /// Mean speed (km/h) of counted vehicles, 0 when none were counted.
    pub fn average_speed(&self) -> f64 {
        if self.speed_samples == 0 {
            return 0.0;
        }

        round_to(self.speed_sum / self.speed_samples as f64, 2)
    }
}

/// Counts each track at most once, when it is past the ROI line.
#[derive(Debug, Clone)]
pub struct CrossingCounter {
    roi_y: i32,
    stats: Statistics,
}

impl CrossingCounter {
    pub fn new(roi_y: i32) -> Self {
        Self {
            roi_y,
            stats: Statistics::default(),
        }
    }

    #[inline]
    pub fn roi_y(&self) -> i32 {
        self.roi_y
    }

    #[inline]
    pub fn set_roi_y(&mut self, y: i32) {
        self.roi_y = y;
    }

    /// Center strictly below the line (image y grows downwards).
    #[inline]
    pub fn is_in_roi(&self, detection: &Detection) -> bool {
        detection.center().y > self.roi_y
    }

    /// Counts `track` if it is in the ROI with a speed estimate and was not
    /// counted before. The flag is set before returning.
    pub fn try_count(
        &mut self,
        track: &mut Track,
        in_roi: bool,
        speed: Option<f64>,
        color: VehicleColor,
    ) -> bool {
        let Some(speed) = speed else {
            return false;
        };

        if !in_roi || track.counted {
            return false;
        }

        track.counted = true;

        let class = &track.last().detection.class;
        self.stats.record(class, color, speed);

        info!(
            track_id = track.track_id,
            class = %class,
            %color,
            speed,
            total = self.stats.total,
            "vehicle counted"
        );

        true
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.stats.total
    }

    #[inline]
    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Forgets every count; the ROI line stays where it is.
    pub fn reset(&mut self) {
        self.stats = Statistics::default();
    }
}
