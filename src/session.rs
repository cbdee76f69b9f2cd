use image::RgbImage;
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bbox::{BBox, Ltrb};
use crate::color::{crop, ColorClassifier, VehicleColor};
use crate::config::Config;
use crate::counter::{CrossingCounter, Statistics};
use crate::detection::SizeBucket;
use crate::detector::{PlateDetector, PlateReader, PlateReading, VehicleDetector};
use crate::error::Error;
use crate::kinematics::{Direction, Kinematics};
use crate::plate::PlateText;
use crate::tracker::Tracker;
use crate::{Detection, Frame};

/// Everything known about one detection after a frame has been processed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub track_id: u64,
    pub class: String,
    pub confidence: f32,
    pub bbox: BBox<Ltrb>,
    pub color: VehicleColor,
    pub speed: Option<f64>,
    pub direction: Option<Direction>,
    pub in_roi: bool,
    pub size: SizeBucket,
    pub plate: Option<PlateReading>,
    /// This detection made its track cross the counting line
    pub counted_now: bool,
    pub total_count: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FrameResult {
    pub frame_number: u64,
    pub records: Vec<EnrichedRecord>,
    pub total_count: u64,
}

struct PlatePipeline {
    detector: Box<dyn PlateDetector + Send>,
    reader: Box<dyn PlateReader + Send>,
    text: PlateText,
    padding: i32,
}

impl PlatePipeline {
    /// Reads the most confident plate near `vehicle`; failures yield `None`.
    fn read(&mut self, image: &RgbImage, vehicle: &BBox<Ltrb>) -> Option<PlateReading> {
        let search = vehicle
            .padded(self.padding)
            .clamp_to(image.width(), image.height())?;

        let candidates = match self.detector.detect(image, &search) {
            Ok(c) => c,
            Err(err) => {
                warn!(%err, "plate detection failed");
                return None;
            }
        };

        let plate = candidates.first()?;

        if !plate.bbox.is_valid() || !plate.bbox.fits_in(image.width(), image.height()) {
            debug!(bbox = ?plate.bbox, "plate candidate outside the frame");
            return None;
        }

        let plate_img = crop(image, &plate.bbox)?;

        match self.reader.read(&plate_img) {
            Ok(reading) => reading.and_then(|r| self.text.normalize(r)),
            Err(err) => {
                warn!(%err, "plate reading failed");
                None
            }
        }
    }
}

/// Tracking state of a single video stream.
///
/// Create one per stream, feed it frames in order and drop or [`reset`](Self::reset)
/// it when the stream ends.
pub struct Session {
    config: Config,
    tracker: Tracker,
    kinematics: Kinematics,
    counter: CrossingCounter,
    colors: ColorClassifier,
    plates: Option<PlatePipeline>,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            tracker: Tracker::new(config.tracker.clone()),
            kinematics: Kinematics::new(config.kinematics.clone()),
            counter: CrossingCounter::new(config.roi.y),
            colors: ColorClassifier::new(),
            plates: None,
            config,
        }
    }

    /// Enables plate reading for every processed detection.
    pub fn with_plates<D, R>(mut self, detector: D, reader: R) -> Self
    where
        D: PlateDetector + Send + 'static,
        R: PlateReader + Send + 'static,
    {
        self.plates = Some(PlatePipeline {
            detector: Box::new(detector),
            reader: Box::new(reader),
            text: PlateText::new(self.config.plates.text.clone()),
            padding: self.config.plates.search_padding,
        });

        self
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    #[inline]
    pub fn kinematics(&self) -> &Kinematics {
        &self.kinematics
    }

    #[inline]
    pub fn total_count(&self) -> u64 {
        self.counter.total()
    }

    #[inline]
    pub fn statistics(&self) -> &Statistics {
        self.counter.statistics()
    }

    #[inline]
    pub fn roi_y(&self) -> i32 {
        self.counter.roi_y()
    }

    pub fn set_roi_y(&mut self, y: i32) {
        debug!(roi_y = y, "roi line moved");
        self.config.roi.y = y;
        self.counter.set_roi_y(y);
    }

    #[inline]
    pub fn process(&mut self, frame: &Frame) -> FrameResult {
        self.process_detections(&frame.image, &frame.detections, frame.number)
    }

    /// Runs `detector` on `image`, then processes its detections.
    pub fn process_image<D: VehicleDetector + ?Sized>(
        &mut self,
        detector: &mut D,
        image: &RgbImage,
        frame_number: u64,
    ) -> Result<FrameResult, Error> {
        let detections = detector.detect(image)?;

        Ok(self.process_detections(image, &detections, frame_number))
    }

    /// Associates, measures, colors and counts the detections of one frame.
    pub fn process_detections(
        &mut self,
        image: &RgbImage,
        detections: &[Detection],
        frame_number: u64,
    ) -> FrameResult {
        let ids = self.tracker.update(detections, frame_number);
        let mut records = Vec::with_capacity(detections.len());

        for (det, id) in detections.iter().zip(ids) {
            let color = self
                .colors
                .classify(image, &det.bbox, self.config.color.method)
                .unwrap_or_else(|err| {
                    warn!(track_id = id, %err, "color classification failed");
                    VehicleColor::Unknown
                });

            let plate = self
                .plates
                .as_mut()
                .and_then(|p| p.read(image, &det.bbox));

            let Some(track) = self.tracker.get_mut(id) else {
                continue;
            };

            let speed = self.kinematics.estimate_speed(track);
            let direction = self.kinematics.direction(track, det);
            let in_roi = self.counter.is_in_roi(det);
            let size = SizeBucket::classify(
                det.area(),
                self.config.size.small_max,
                self.config.size.medium_max,
            );

            let counted_now = self.counter.try_count(track, in_roi, speed, color);

            records.push(EnrichedRecord {
                track_id: id,
                class: det.class.clone(),
                confidence: det.confidence,
                bbox: det.bbox,
                color,
                speed,
                direction,
                in_roi,
                size,
                plate,
                counted_now,
                total_count: self.counter.total(),
            });
        }

        FrameResult {
            frame_number,
            records,
            total_count: self.counter.total(),
        }
    }

    /// Back to the state of a fresh session; the ROI line is kept.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.counter.reset();
    }
}
