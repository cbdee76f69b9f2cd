use serde_derive::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::{Detection, Track};

/// Which tracks a detection may be associated with.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchScope {
    /// Every known track is a candidate for every detection, so two
    /// detections of one frame may extend the same track.
    #[default]
    Global,
    /// A track extended in the current frame is no longer a candidate.
    Exclusive,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Centers closer than this (px, strict) may belong to the same vehicle
    pub tracking_threshold: f64,
    /// Frames a track survives without a detection before eviction
    pub max_frames_missing: u64,
    pub match_scope: MatchScope,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tracking_threshold: 50.0,
            max_frames_missing: 30,
            match_scope: MatchScope::Global,
        }
    }
}

/// Nearest-centroid track store.
#[derive(Debug)]
pub struct Tracker {
    config: TrackerConfig,
    tracks: BTreeMap<u64, Track>,
    next_id: u64,
    last_frame: Option<u64>,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: BTreeMap::new(),
            next_id: 0,
            last_frame: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Nearest track whose last center is closer than the tracking threshold.
    ///
    /// Tracks are visited in id order and only a strictly smaller distance
    /// replaces the current best, so ties go to the lowest id.
    pub fn associate(&self, detection: &Detection, claimed: &HashSet<u64>) -> Option<u64> {
        let mut best: Option<(u64, f64)> = None;

        for (&id, track) in &self.tracks {
            if claimed.contains(&id) {
                continue;
            }

            let dist = detection.center_distance(&track.last().detection);

            if dist >= self.config.tracking_threshold {
                continue;
            }

            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((id, dist));
            }
        }

        best.map(|(id, _)| id)
    }

    /// Associates every detection of a frame, then evicts stale tracks.
    ///
    /// Returns the track id assigned to each detection, in input order.
    pub fn update(&mut self, detections: &[Detection], frame_number: u64) -> Vec<u64> {
        if let Some(last) = self.last_frame {
            if frame_number < last {
                warn!(frame_number, last, "frame number went backwards");
            }
        }

        self.last_frame = Some(frame_number);

        let mut claimed = HashSet::new();
        let mut ids = Vec::with_capacity(detections.len());

        for det in detections {
            let id = match self.associate(det, &claimed) {
                Some(id) => {
                    if let Some(track) = self.tracks.get_mut(&id) {
                        if track.last_frame() == frame_number {
                            debug!(track_id = id, frame_number, "track extended twice in one frame");
                        }

                        track.push(det.clone(), frame_number);
                    }

                    id
                }
                None => self.spawn(det.clone(), frame_number),
            };

            if self.config.match_scope == MatchScope::Exclusive {
                claimed.insert(id);
            }

            ids.push(id);
        }

        self.evict(frame_number);

        ids
    }

    fn spawn(&mut self, detection: Detection, frame_number: u64) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        debug!(track_id = id, frame_number, class = %detection.class, "new track");
        self.tracks.insert(id, Track::new(id, detection, frame_number));

        id
    }

    /// Drops tracks last seen more than `max_frames_missing` frames before `frame_number`.
    pub fn evict(&mut self, frame_number: u64) -> Vec<u64> {
        let max_age = self.config.max_frames_missing;
        let stale: Vec<u64> = self
            .tracks
            .iter()
            .filter(|(_, t)| frame_number.saturating_sub(t.last_frame()) > max_age)
            .map(|(&id, _)| id)
            .collect();

        for id in &stale {
            self.tracks.remove(id);
            debug!(track_id = id, frame_number, "track evicted");
        }

        stale
    }

    #[inline]
    pub fn get(&self, id: u64) -> Option<&Track> {
        self.tracks.get(&id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: u64) -> Option<&mut Track> {
        self.tracks.get_mut(&id)
    }

    #[inline]
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Id the next new track will receive.
    #[inline]
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 0;
        self.last_frame = None;
    }
}
