//! Post-processing of recognized plate text.
//!
//! Readers return whatever characters they saw. This module normalizes that
//! text, fixes characters that are commonly confused in known plate layouts
//! and optionally snaps the result to a list of known plates.

use serde_derive::{Deserialize, Serialize};
use tracing::debug;

use crate::detector::PlateReading;

/// Shorter texts are treated as false reads.
pub const MIN_PLATE_LEN: usize = 4;

/// Layout the reader output is checked against.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlateFormat {
    /// Indian first, then UK
    #[default]
    Auto,
    Uk,
    Indian,
    /// No layout checks, cleanup only
    Plain,
}

/// Length rules of a plate after cleanup.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Eu,
    Fr,
    Ro,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PlateTextConfig {
    pub format: PlateFormat,
    /// Readings above this confidence are kept even when no layout matches
    pub fallback_confidence: f32,
    /// Unformatted texts failing the region's length rules are dropped
    pub region: Option<Region>,
    pub known_plates: Vec<String>,
    /// Largest edit distance accepted when matching against `known_plates`
    pub match_threshold: usize,
}

impl Default for PlateTextConfig {
    fn default() -> Self {
        Self {
            format: PlateFormat::Auto,
            fallback_confidence: 0.7,
            region: None,
            known_plates: Vec::new(),
            match_threshold: 2,
        }
    }
}

#[inline]
fn char_to_digit(c: char) -> Option<char> {
    Some(match c {
        'O' => '0',
        'I' => '1',
        'J' => '3',
        'A' => '4',
        'G' => '6',
        'S' => '5',
        'Z' => '2',
        'B' => '8',
        _ => return None,
    })
}

#[inline]
fn digit_to_char(c: char) -> Option<char> {
    Some(match c {
        '0' => 'O',
        '1' => 'I',
        '3' => 'J',
        '4' => 'A',
        '6' => 'G',
        '5' => 'S',
        '2' => 'Z',
        '8' => 'B',
        _ => return None,
    })
}

/// Pairs a reader mixes up often enough that swapping them costs nothing.
#[inline]
fn confusable(a: char, b: char) -> bool {
    matches!(
        (a, b),
        ('7', 'Z')
            | ('Z', '7')
            | ('1', 'I')
            | ('I', '1')
            | ('0', 'O')
            | ('O', '0')
            | ('8', 'B')
            | ('B', '8')
    )
}

fn squash(text: &str, drop_dashes: bool) -> Vec<char> {
    text.chars()
        .filter(|&c| c != ' ' && !(drop_dashes && c == '-'))
        .flat_map(char::to_uppercase)
        .collect()
}

/// Uppercase alphanumerics only; `None` when fewer than [`MIN_PLATE_LEN`] remain.
pub fn clean(raw: &str) -> Option<String> {
    let text: String = raw
        .trim()
        .chars()
        .flat_map(char::to_uppercase)
        .filter(|c| c.is_alphanumeric())
        .collect();

    (text.chars().count() >= MIN_PLATE_LEN).then_some(text)
}

pub fn validate_plate_format(text: &str, region: Region) -> bool {
    let len = text.chars().count();

    if len < MIN_PLATE_LEN {
        return false;
    }

    match region {
        Region::Eu => (6..=9).contains(&len),
        // AB-123-CD without dashes
        Region::Fr => len == 7,
        // B-123-ABC without dashes
        Region::Ro => (7..=8).contains(&len),
    }
}

/// Edit distance that ignores the 7/Z, 1/I, 0/O and 8/B confusions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (long, short) = if a.len() < b.len() { (b, a) } else { (a, b) };

    if short.is_empty() {
        return long.len();
    }

    let mut prev: Vec<usize> = (0..=short.len()).collect();

    for (i, &c1) in long.iter().enumerate() {
        let mut row = Vec::with_capacity(short.len() + 1);
        row.push(i + 1);

        for (j, &c2) in short.iter().enumerate() {
            let cost = usize::from(c1 != c2 && !confusable(c1, c2));
            let best = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
            row.push(best);
        }

        prev = row;
    }

    prev[short.len()]
}

/// Closest known plate within `threshold` edits, first one on ties.
pub fn match_known<'a, S: AsRef<str>>(
    detected: &str,
    known: &'a [S],
    threshold: usize,
) -> Option<(&'a str, usize)> {
    let mut best: Option<(&'a str, usize)> = None;

    for plate in known {
        let dist = levenshtein(detected, plate.as_ref());

        if best.map_or(true, |(_, d)| dist < d) {
            best = Some((plate.as_ref(), dist));
        }
    }

    best.filter(|&(_, d)| d <= threshold)
}

/// Two letters, two digits, three letters; digits and letters that are
/// commonly confused count for each other.
pub fn check_uk_format(text: &str) -> bool {
    let c = squash(text, false);

    if c.len() != 7 {
        return false;
    }

    let letter = |ch: char| ch.is_alphabetic() || digit_to_char(ch).is_some();
    let digit = |ch: char| ch.is_ascii_digit() || char_to_digit(ch).is_some();

    letter(c[0])
        && letter(c[1])
        && digit(c[2])
        && digit(c[3])
        && letter(c[4])
        && letter(c[5])
        && letter(c[6])
}

/// Swaps confused characters into the class each UK position expects.
pub fn format_uk_plate(text: &str) -> String {
    let c = squash(text, false);

    if c.len() != 7 {
        return c.into_iter().collect();
    }

    c.into_iter()
        .enumerate()
        .map(|(i, ch)| {
            let fixed = if i == 2 || i == 3 {
                char_to_digit(ch)
            } else {
                digit_to_char(ch)
            };

            fixed.unwrap_or(ch)
        })
        .collect()
}

/// State code, district digits, one or two series letters, four digits.
pub fn check_indian_format(text: &str) -> bool {
    let c = squash(text, true);

    if !(9..=10).contains(&c.len()) {
        return false;
    }

    if !(c[0].is_alphabetic() && c[1].is_alphabetic()) {
        return false;
    }

    if c[2].is_alphabetic() {
        return c.len() == 10
            && c[3].is_ascii_digit()
            && c[4].is_ascii_digit()
            && c[5].is_alphabetic()
            && c[6].is_alphabetic()
            && c[7..].iter().all(char::is_ascii_digit);
    }

    if !(c[2].is_ascii_digit() && c[3].is_ascii_digit()) {
        return false;
    }

    let end = series_end(&c);

    (1..=2).contains(&(end - 4))
        && c.len() - end == 4
        && c[end..].iter().all(char::is_ascii_digit)
}

fn series_end(c: &[char]) -> usize {
    4 + c[4..].iter().take_while(|ch| ch.is_alphabetic()).count()
}

/// Dashed `XX-00-XX-0000`, or `XXX-00-XX-0000` for three-letter state codes.
pub fn format_indian_plate(text: &str) -> String {
    let c = squash(text, true);
    let part = |r: std::ops::Range<usize>| c[r].iter().collect::<String>();

    if c.len() == 10 && c[2].is_alphabetic() {
        format!("{}-{}-{}-{}", part(0..3), part(3..5), part(5..7), part(7..10))
    } else if c.len() >= 9 {
        let end = series_end(&c);
        format!("{}-{}-{}-{}", part(0..2), part(2..4), part(4..end), part(end..c.len()))
    } else {
        c.iter().collect()
    }
}

/// Turns raw reader output into the plate text reported for a vehicle.
#[derive(Debug, Clone, Default)]
pub struct PlateText {
    config: PlateTextConfig,
}

impl PlateText {
    pub fn new(config: PlateTextConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &PlateTextConfig {
        &self.config
    }

    /// First reading that fits the configured layout, formatted; otherwise the
    /// first one above the fallback confidence, otherwise the most confident.
    pub fn select(&self, readings: &[PlateReading]) -> Option<PlateReading> {
        self.pick(readings).map(|(reading, _)| reading)
    }

    fn pick(&self, readings: &[PlateReading]) -> Option<(PlateReading, bool)> {
        let format = self.config.format;
        let reading = |text: String, confidence: f32| PlateReading { text, confidence };

        for r in readings {
            let text: String = squash(&r.text, false).into_iter().collect();

            let indian = matches!(format, PlateFormat::Auto | PlateFormat::Indian);
            let uk = matches!(format, PlateFormat::Auto | PlateFormat::Uk);

            if indian && check_indian_format(&text) {
                return Some((reading(format_indian_plate(&text), r.confidence), true));
            }

            if uk && check_uk_format(&text) {
                return Some((reading(format_uk_plate(&text), r.confidence), true));
            }

            if r.confidence > self.config.fallback_confidence {
                return Some((reading(text, r.confidence), false));
            }
        }

        let best = readings
            .iter()
            .reduce(|best, r| if r.confidence > best.confidence { r } else { best })?;

        Some((
            reading(squash(&best.text, false).into_iter().collect(), best.confidence),
            false,
        ))
    }

    /// Normalizes a single reading, `None` when it does not look like a plate.
    pub fn normalize(&self, raw: PlateReading) -> Option<PlateReading> {
        let (mut reading, formatted) = self.pick(std::slice::from_ref(&raw))?;

        if !formatted {
            let Some(text) = clean(&reading.text) else {
                debug!(text = %raw.text, "plate text too short");
                return None;
            };

            if let Some(region) = self.config.region {
                if !validate_plate_format(&text, region) {
                    debug!(%text, ?region, "plate text does not fit the region");
                    return None;
                }
            }

            reading.text = text;
        }

        if !self.config.known_plates.is_empty() {
            let bare: String = reading.text.chars().filter(|&c| c != '-').collect();

            if let Some((known, dist)) =
                match_known(&bare, &self.config.known_plates, self.config.match_threshold)
            {
                debug!(read = %reading.text, known, dist, "plate matched a known plate");
                reading.text = known.to_string();
            }
        }

        Some(reading)
    }
}
