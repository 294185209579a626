use crate::timeline::Timeline;
use chrono::{DateTime, Utc};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

pub const PLAYLIST_EXT: &str = ".m3u8";
pub const SEGMENT_PREFIX: &str = "segment";
pub const SEGMENT_EXT: &str = ".mp4";
/// Query parameter carrying the physical segment index.
pub const OFFSET_PARAM: &str = "offset";

const PROTOCOL_VERSION: u32 = 9;
const PROGRAM_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// A sliding-window media playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub target_duration: u64,
    pub media_sequence: u64,
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    /// Virtual sequence number.
    pub sequence: u64,
    /// Physical segment replayed at this position.
    pub index: usize,
    /// Duration in seconds.
    pub duration: f64,
    /// Set once per pass through the pool.
    pub program_time: Option<DateTime<Utc>>,
}

impl ManifestEntry {
    pub fn uri(&self) -> String {
        segment_uri(self.sequence, self.index)
    }
}

pub fn segment_uri(sequence: u64, index: usize) -> String {
    format!(
        "{}{}{}?{}={}",
        SEGMENT_PREFIX, sequence, SEGMENT_EXT, OFFSET_PARAM, index
    )
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#EXTM3U")?;
        writeln!(f, "#EXT-X-VERSION:{}", PROTOCOL_VERSION)?;
        writeln!(f, "#EXT-X-TARGETDURATION:{}", self.target_duration)?;
        writeln!(f, "#EXT-X-MEDIA-SEQUENCE:{}", self.media_sequence)?;

        for entry in &self.entries {
            if let Some(time) = entry.program_time {
                writeln!(
                    f,
                    "#EXT-X-PROGRAM-DATE-TIME:{}",
                    time.format(PROGRAM_TIME_FORMAT)
                )?;
            }
            writeln!(f, "#EXTINF:{:.6},", entry.duration)?;
            writeln!(f, "{}", entry.uri())?;
        }

        Ok(())
    }
}

/// Builds the live window ending at a given sequence.
#[derive(Debug, Clone)]
pub struct ManifestSynthesizer {
    timeline: Arc<Timeline>,
    window_segments: u64,
}

impl ManifestSynthesizer {
    /// `window_duration` is in timescale units, like the segment duration.
    pub fn new(timeline: Arc<Timeline>, window_duration: u64) -> Self {
        let window_segments = window_duration / timeline.segment_units();
        ManifestSynthesizer {
            timeline,
            window_segments,
        }
    }

    /// Number of segments trailing the live edge.
    pub fn window_segments(&self) -> u64 {
        self.window_segments
    }

    /// Sequences listed when `last_sequence` is the live edge. `None` while
    /// the stream has not started.
    pub fn window(&self, last_sequence: i64) -> Option<RangeInclusive<u64>> {
        if last_sequence < 0 {
            return None;
        }

        let last = last_sequence as u64;
        let first = last.saturating_sub(self.window_segments);
        Some(first..=last)
    }

    pub fn manifest(&self, last_sequence: i64) -> Manifest {
        let window = self.window(last_sequence);
        let media_sequence = window.as_ref().map_or(0, |range| *range.start());
        let duration = self.timeline.segment_seconds();

        let entries = window
            .into_iter()
            .flatten()
            .map(|sequence| {
                let index = self.timeline.segment_index_for(sequence);
                let program_time = if index == 0 {
                    self.timeline.sequence_start(sequence)
                } else {
                    None
                };

                ManifestEntry {
                    sequence,
                    index,
                    duration,
                    program_time,
                }
            })
            .collect();

        Manifest {
            target_duration: self.timeline.target_duration(),
            media_sequence,
            entries,
        }
    }

    pub fn synthesize(&self, last_sequence: i64) -> String {
        self.manifest(last_sequence).to_string()
    }
}
