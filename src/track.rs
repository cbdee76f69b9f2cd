use crate::Detection;

/// One detection of a track together with the frame it was seen in.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub detection: Detection,
    pub frame: u64,
}

/// A physical vehicle followed across frames.
///
/// The history is append-only and always holds at least the detection that
/// created the track.
#[derive(Debug, Clone)]
pub struct Track {
    pub track_id: u64,
    pub counted: bool,
    history: Vec<Observation>,
}

impl Track {
    pub fn new(track_id: u64, detection: Detection, frame: u64) -> Self {
        Self {
            track_id,
            counted: false,
            history: vec![Observation { detection, frame }],
        }
    }

    #[inline]
    pub fn push(&mut self, detection: Detection, frame: u64) {
        self.history.push(Observation { detection, frame });
    }

    #[inline]
    pub fn history(&self) -> &[Observation] {
        &self.history
    }

    #[inline]
    pub fn first(&self) -> &Observation {
        &self.history[0]
    }

    #[inline]
    pub fn last(&self) -> &Observation {
        &self.history[self.history.len() - 1]
    }

    #[inline]
    pub fn last_frame(&self) -> u64 {
        self.last().frame
    }

    /// The most recent `n` observations, oldest first.
    #[inline]
    pub fn recent(&self, n: usize) -> &[Observation] {
        &self.history[self.history.len().saturating_sub(n)..]
    }
}
