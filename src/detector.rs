use image::RgbImage;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::bbox::{BBox, Ltrb};
use crate::detection::{Detection, Geometry};
use crate::error::Error;
use crate::math::round_to;

/// Anything that finds vehicles in a frame.
pub trait VehicleDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, Error>;
}

/// A plate box in frame coordinates.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlateCandidate {
    pub bbox: BBox<Ltrb>,
    pub confidence: f32,
}

/// Text read from a plate crop.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlateReading {
    pub text: String,
    pub confidence: f32,
}

/// Finds plates inside the `search` area of a frame, most confident first.
pub trait PlateDetector {
    fn detect(&mut self, image: &RgbImage, search: &BBox<Ltrb>)
        -> Result<Vec<PlateCandidate>, Error>;
}

/// Recognizes the characters of a cropped plate.
pub trait PlateReader {
    fn read(&mut self, plate: &RgbImage) -> Result<Option<PlateReading>, Error>;
}

/// One box as it leaves a COCO-trained detector, before any filtering.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    /// x1, y1, x2, y2
    pub xyxy: [f32; 4],
    pub confidence: f32,
    pub class_id: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    pub confidence_threshold: f32,
    /// Class id to label; ids missing here are dropped
    pub classes: BTreeMap<u32, String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        let classes = [
            (1, "bicycle"),
            (2, "car"),
            (3, "motorcycle"),
            (5, "bus"),
            (7, "truck"),
        ]
        .into_iter()
        .map(|(id, name)| (id, name.to_string()))
        .collect();

        Self {
            confidence_threshold: 0.5,
            classes,
        }
    }
}

impl DetectorConfig {
    pub fn new(confidence_threshold: f32, classes: BTreeMap<u32, String>) -> Self {
        Self {
            confidence_threshold,
            classes,
        }
    }

    /// Keeps vehicle classes at or above the confidence threshold.
    ///
    /// Coordinates are truncated to whole pixels and confidence rounded to
    /// two decimals; boxes that collapse to nothing are dropped. Center and
    /// size are taken from the unrounded box.
    pub fn filter(&self, raw: &[RawDetection]) -> Vec<Detection> {
        raw.iter()
            .filter(|r| r.confidence >= self.confidence_threshold)
            .filter_map(|r| {
                let label = self.classes.get(&r.class_id)?;
                let [x1, y1, x2, y2] = r.xyxy;
                let bbox = BBox::ltrb(x1 as i32, y1 as i32, x2 as i32, y2 as i32);

                if !bbox.is_valid() {
                    return None;
                }

                let confidence = round_to(f64::from(r.confidence), 2) as f32;

                Some(
                    Detection::new(bbox, confidence, label.clone())
                        .with_geometry(Geometry::from_xyxy(r.xyxy)),
                )
            })
            .collect()
    }
}
