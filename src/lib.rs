pub mod bbox;
pub mod color;
pub mod config;
pub mod counter;
pub mod detection;
pub mod detector;
pub mod error;
pub mod frame;
pub mod kinematics;
pub mod math;
pub mod plate;
pub mod session;
pub mod tracker;

mod track;

pub use config::Config;
pub use detection::Detection;
pub use error::Error;
pub use frame::Frame;
pub use session::{EnrichedRecord, FrameResult, Session};
pub use track::{Observation, Track};

use std::collections::HashMap;
use tracing::debug;

/// Frame-by-frame vehicle tracking for any number of named streams.
pub trait Tracking {
    fn update(&mut self, frame: &Frame, src: &str) -> FrameResult;
    fn total_count(&self, src: &str) -> u64;
    fn reset(&mut self, src: &str);
    /// Drops the stream's state, returns whether it existed.
    fn close(&mut self, src: &str) -> bool;
}

/// Keeps one independent [`Session`] per stream name.
pub struct StreamTracker {
    config: Config,
    sessions: HashMap<String, Session>,
}

impl StreamTracker {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
        }
    }

    /// Registers a prepared session, e.g. one with plate reading enabled.
    pub fn open(&mut self, src: &str, session: Session) -> Option<Session> {
        self.sessions.insert(src.to_string(), session)
    }

    #[inline]
    pub fn session(&self, src: &str) -> Option<&Session> {
        self.sessions.get(src)
    }

    #[inline]
    pub fn session_mut(&mut self, src: &str) -> Option<&mut Session> {
        self.sessions.get_mut(src)
    }

    #[inline]
    pub fn streams(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }
}

impl Default for StreamTracker {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl crate::Tracking for StreamTracker {
    fn update(&mut self, frame: &Frame, src: &str) -> FrameResult {
        let config = &self.config;
        let session = self
            .sessions
            .entry(src.to_string())
            .or_insert_with(|| {
                debug!(src, "new stream");
                Session::new(config.clone())
            });

        session.process(frame)
    }

    #[inline]
    fn total_count(&self, src: &str) -> u64 {
        self.sessions.get(src).map_or(0, Session::total_count)
    }

    fn reset(&mut self, src: &str) {
        if let Some(session) = self.sessions.get_mut(src) {
            session.reset();
        }
    }

    fn close(&mut self, src: &str) -> bool {
        self.sessions.remove(src).is_some()
    }
}
