//! End-to-end tracking through `Session` and `StreamTracker`.

use std::collections::{BTreeSet, VecDeque};

use approx::assert_relative_eq;
use image::{Rgb, RgbImage};
use vtrack::bbox::BBox;
use vtrack::color::VehicleColor;
use vtrack::detector::VehicleDetector;
use vtrack::kinematics::Direction;
use vtrack::{Config, Detection, Error, Frame, Session, StreamTracker, Tracking};

fn car_at(cx: i32, cy: i32) -> Detection {
    Detection::new(BBox::ltrb(cx - 60, cy - 40, cx + 60, cy + 40), 0.91, "car")
}

fn red_road() -> RgbImage {
    RgbImage::from_pixel(800, 800, Rgb([200, 20, 20]))
}

struct ScriptedDetector {
    frames: VecDeque<Vec<Detection>>,
}

impl VehicleDetector for ScriptedDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>, Error> {
        Ok(self.frames.pop_front().unwrap_or_default())
    }
}

struct OfflineDetector;

impl VehicleDetector for OfflineDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>, Error> {
        Err(Error::Detector("model not loaded".into()))
    }
}

#[test]
fn vehicle_is_tracked_measured_and_counted_once() {
    let image = red_road();
    let mut session = Session::new(Config::default());
    let mut counted_frames = vec![];

    for frame in 0..40u64 {
        let y = 300 + 10 * frame as i32;
        let res = session.process_detections(&image, &[car_at(200, y)], frame);

        assert_eq!(res.records.len(), 1);
        let rec = &res.records[0];
        assert_eq!(rec.track_id, 0, "frame {}", frame);
        assert_eq!(rec.color, VehicleColor::Red);

        if frame < 9 {
            assert_eq!(rec.speed, None, "frame {}", frame);
        } else {
            assert_relative_eq!(rec.speed.unwrap(), 135.0, epsilon = 1e-9);
        }

        if frame == 0 {
            assert_eq!(rec.direction, None);
        } else {
            assert_eq!(rec.direction, Some(Direction::Down));
        }

        assert_eq!(rec.in_roi, y > 400);

        if rec.counted_now {
            counted_frames.push(frame);
        }
    }

    // first frame with both a speed and a center past y=400
    assert_eq!(counted_frames, vec![11]);
    assert_eq!(session.total_count(), 1);
    assert_eq!(session.statistics().by_class["car"], 1);
    assert_relative_eq!(session.statistics().average_speed(), 135.0);
}

#[test]
fn parked_vehicle_past_line_counts_once() {
    let image = red_road();
    let mut session = Session::new(Config::default());

    // parked past the line, counted once the speed window fills
    for frame in 0..20u64 {
        let res = session.process_detections(&image, &[car_at(200, 600)], frame);
        assert!(res.records[0].in_roi);
    }

    assert_eq!(session.total_count(), 1);
    assert_relative_eq!(session.statistics().average_speed(), 0.0);
}

#[test]
fn two_vehicles_keep_separate_identities() {
    let image = red_road();
    let mut session = Session::new(Config::default());

    for frame in 0..30u64 {
        let step = 10 * frame as i32;
        let res = session.process_detections(
            &image,
            &[car_at(100, 100 + step), car_at(600, 700 - step)],
            frame,
        );

        let ids: Vec<u64> = res.records.iter().map(|r| r.track_id).collect();
        assert_eq!(ids, vec![0, 1], "frame {}", frame);

        if frame > 0 {
            assert_eq!(res.records[0].direction, Some(Direction::Down));
            assert_eq!(res.records[1].direction, Some(Direction::Up));
        }
    }

    // the upward vehicle starts below the line, the other never reaches it
    assert_eq!(session.total_count(), 1);
}

#[test]
fn lost_vehicle_is_evicted_and_gets_a_new_id() {
    let image = red_road();
    let mut session = Session::new(Config::default());

    session.process_detections(&image, &[car_at(200, 200)], 5);

    session.process_detections(&image, &[], 34);
    assert!(session.tracker().get(0).is_some());

    session.process_detections(&image, &[], 36);
    assert!(session.tracker().get(0).is_none());

    let res = session.process_detections(&image, &[car_at(200, 200)], 37);
    assert_eq!(res.records[0].track_id, 1);
}

#[test]
fn ids_are_never_reused() {
    let image = red_road();
    let mut session = Session::new(Config::default());
    let mut seen = BTreeSet::new();
    let mut max_id = None;

    // vehicles pop in and out at spread-out positions
    for frame in 0..200u64 {
        let dets: Vec<Detection> = (0..4u64)
            .filter(|i| (frame / (7 + i)) % 3 != 0)
            .map(|i| car_at(100 + 180 * i as i32, 100 + (frame % 50) as i32 * 3))
            .collect();

        let res = session.process_detections(&image, &dets, frame);

        let active: Vec<u64> = session.tracker().tracks().map(|t| t.track_id).collect();
        let unique: BTreeSet<u64> = active.iter().copied().collect();
        assert_eq!(active.len(), unique.len());

        for rec in &res.records {
            if seen.insert(rec.track_id) {
                assert!(max_id.map_or(true, |m| rec.track_id > m));
                max_id = Some(rec.track_id);
            }
        }
    }

    assert!(seen.len() > 4);
}

#[test]
fn each_track_counts_at_most_once() {
    let image = red_road();
    let mut session = Session::new(Config::default());
    let mut per_track = std::collections::HashMap::new();

    for frame in 0..120u64 {
        // three vehicles, staggered, all driving down through the line
        let dets: Vec<Detection> = (0..3)
            .filter_map(|i| {
                let start = 30 * i as u64;
                (frame >= start).then(|| car_at(150 + 250 * i as i32, 200 + 8 * (frame - start) as i32))
            })
            .collect();

        let res = session.process_detections(&image, &dets, frame);

        for rec in res.records.iter().filter(|r| r.counted_now) {
            *per_track.entry(rec.track_id).or_insert(0) += 1;
        }
    }

    assert_eq!(per_track.len(), 3);
    assert!(per_track.values().all(|&c| c == 1));
    assert_eq!(session.total_count(), 3);
}

#[test]
fn reset_is_idempotent() {
    let image = red_road();
    let mut session = Session::new(Config::default());

    for frame in 0..20u64 {
        session.process_detections(&image, &[car_at(200, 300 + 15 * frame as i32)], frame);
    }
    assert_eq!(session.total_count(), 1);

    session.reset();
    session.reset();

    assert_eq!(session.total_count(), 0);
    assert!(session.tracker().is_empty());
    assert_eq!(session.statistics().total, 0);

    let res = session.process_detections(&image, &[car_at(200, 300)], 0);
    assert_eq!(res.records[0].track_id, 0);
}

#[test]
fn detector_driven_frames() {
    let image = red_road();
    let mut detector = ScriptedDetector {
        frames: (0..12).map(|f| vec![car_at(300, 350 + 10 * f)]).collect(),
    };
    let mut session = Session::new(Config::default());

    let mut last = None;
    for frame in 0..12u64 {
        last = Some(session.process_image(&mut detector, &image, frame).unwrap());
    }

    let last = last.unwrap();
    assert_eq!(last.frame_number, 11);
    assert_eq!(last.total_count, 1);

    assert!(matches!(
        session.process_image(&mut OfflineDetector, &image, 12),
        Err(Error::Detector(_))
    ));
    assert_eq!(session.total_count(), 1);
}

#[test]
fn streams_are_independent() {
    let mut tracker = StreamTracker::default();

    for number in 0..20u64 {
        let y = 300 + 10 * number as i32;
        tracker.update(&Frame::new(number, red_road(), vec![car_at(200, y)]), "north");
        tracker.update(&Frame::new(number, red_road(), vec![car_at(200, 100)]), "south");
    }

    assert_eq!(tracker.total_count("north"), 1);
    assert_eq!(tracker.total_count("south"), 0);
    assert_eq!(tracker.total_count("east"), 0);

    tracker.reset("north");
    assert_eq!(tracker.total_count("north"), 0);
    assert_eq!(tracker.session("south").unwrap().tracker().len(), 1);

    assert!(tracker.close("south"));
    assert!(!tracker.close("south"));
    assert_eq!(tracker.streams().collect::<Vec<_>>(), vec!["north"]);
}
