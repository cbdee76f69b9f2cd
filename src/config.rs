use serde_derive::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::color::ColorMethod;
use crate::detector::DetectorConfig;
use crate::error::Error;
use crate::kinematics::KinematicsConfig;
use crate::plate::PlateTextConfig;
use crate::tracker::TrackerConfig;

/// Everything a [`Session`](crate::session::Session) needs, one section per component.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub kinematics: KinematicsConfig,
    pub roi: RoiConfig,
    pub color: ColorConfig,
    pub size: SizeConfig,
    pub detector: DetectorConfig,
    pub plates: PlateConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RoiConfig {
    /// Counting line; a vehicle is inside once its center is below it.
    pub y: i32,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self { y: 400 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ColorConfig {
    pub method: ColorMethod,
}

/// Area thresholds (px²) for the size buckets.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SizeConfig {
    pub small_max: i64,
    pub medium_max: i64,
}

impl Default for SizeConfig {
    fn default() -> Self {
        Self {
            small_max: 10_000,
            medium_max: 30_000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PlateConfig {
    /// Margin added around the vehicle box before searching for plates.
    pub search_padding: i32,
    pub text: PlateTextConfig,
}

impl Default for PlateConfig {
    fn default() -> Self {
        Self {
            search_padding: 10,
            text: PlateTextConfig::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)?;

        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));

        if !(self.tracker.tracking_threshold > 0.0) {
            return invalid("tracker.tracking_threshold must be positive");
        }

        if !(self.kinematics.fps > 0.0) {
            return invalid("kinematics.fps must be positive");
        }

        if !(self.kinematics.pixels_per_meter > 0.0) {
            return invalid("kinematics.pixels_per_meter must be positive");
        }

        if self.kinematics.speed_window < 2 {
            return invalid("kinematics.speed_window must be at least 2");
        }

        if self.kinematics.direction_min_history < 2 {
            return invalid("kinematics.direction_min_history must be at least 2");
        }

        if self.size.small_max >= self.size.medium_max {
            return invalid("size.small_max must be below size.medium_max");
        }

        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return invalid("detector.confidence_threshold must be within [0, 1]");
        }

        if let ColorMethod::Dominant { k: 0 } = self.color.method {
            return invalid("color.method.k must be positive");
        }

        if self.plates.search_padding < 0 {
            return invalid("plates.search_padding must not be negative");
        }

        if !(0.0..=1.0).contains(&self.plates.text.fallback_confidence) {
            return invalid("plates.text.fallback_confidence must be within [0, 1]");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plate::{PlateFormat, Region};
    use crate::tracker::MatchScope;

    #[test]
    fn defaults_match_calibration() {
        let config = Config::default();

        assert_eq!(config.tracker.tracking_threshold, 50.0);
        assert_eq!(config.tracker.max_frames_missing, 30);
        assert_eq!(config.tracker.match_scope, MatchScope::Global);
        assert_eq!(config.kinematics.pixels_per_meter, 8.0);
        assert_eq!(config.kinematics.fps, 30.0);
        assert_eq!(config.kinematics.speed_window, 10);
        assert_eq!(config.roi.y, 400);
        assert_eq!(config.color.method, ColorMethod::Ranges);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = Config::from_yaml(
            "tracker:\n  match_scope: exclusive\nroi:\n  y: 250\ncolor:\n  method:\n    kind: dominant\n    k: 4\n",
        )
        .unwrap();

        assert_eq!(config.tracker.match_scope, MatchScope::Exclusive);
        assert_eq!(config.tracker.tracking_threshold, 50.0);
        assert_eq!(config.roi.y, 250);
        assert_eq!(config.color.method, ColorMethod::Dominant { k: 4 });
    }

    #[test]
    fn plate_text_section() {
        let config = Config::from_yaml(
            "plates:\n  text:\n    format: uk\n    region: fr\n    known_plates: [AB123CD]\n",
        )
        .unwrap();

        assert_eq!(config.plates.search_padding, 10);
        assert_eq!(config.plates.text.format, PlateFormat::Uk);
        assert_eq!(config.plates.text.region, Some(Region::Fr));
        assert_eq!(config.plates.text.known_plates, vec!["AB123CD".to_string()]);
        assert_eq!(config.plates.text.match_threshold, 2);

        assert!(matches!(
            Config::from_yaml("plates:\n  text:\n    fallback_confidence: 1.5\n"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Config::from_yaml("kinematics:\n  fps: 0\n"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Config::from_yaml("size:\n  small_max: 40000\n"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Config::from_yaml("roi: not-a-section"),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/vtrack.yaml"),
            Err(Error::ConfigIo(_))
        ));
    }
}
