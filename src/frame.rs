use image::RgbImage;

use crate::detection::Detection;

/// A decoded video frame together with what the detector found in it.
pub struct Frame {
    pub number: u64,
    pub image: RgbImage,
    pub detections: Vec<Detection>,
}

impl Frame {
    pub fn new(number: u64, image: RgbImage, detections: Vec<Detection>) -> Self {
        Self {
            number,
            image,
            detections,
        }
    }
}
