use std::path::{Path, PathBuf};

use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{Duration, OffsetDateTime};
use tracing::warn;

const PROGRAM_DATE_TIME: &str = "#EXT-X-PROGRAM-DATE-TIME:";
const EXTINF: &str = "#EXTINF:";

/// Longest segment duration accepted from a manifest, in seconds.
const MAX_SEGMENT_SECONDS: f64 = 86_400.0;

/// One media segment of a manifest, placed on the wall clock.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub path: PathBuf,
    pub start: OffsetDateTime,
    /// Seconds
    pub duration: f64,
}

impl Segment {
    pub fn end(&self) -> OffsetDateTime {
        self.start
            .checked_add(Duration::seconds_f64(self.duration))
            .unwrap_or(self.start)
    }

    /// True when the segment shares any instant with `[from, to)`.
    pub fn overlaps(&self, from: OffsetDateTime, to: OffsetDateTime) -> bool {
        self.end() > from && self.start < to
    }
}

#[derive(Default)]
struct ParserState {
    cursor: Option<OffsetDateTime>,
    pending_duration: f64,
}

impl ParserState {
    fn anchor(&mut self, value: &str) {
        match parse_instant(value) {
            Some(instant) => self.cursor = Some(instant),
            None => warn!("ignoring unparseable program date time {:?}", value),
        }
    }

    fn duration(&mut self, value: &str) {
        let seconds = value.split_once(',').map_or(value, |(seconds, _)| seconds);
        match seconds.trim().parse::<f64>() {
            Ok(d) if d.is_finite() && (0.0..=MAX_SEGMENT_SECONDS).contains(&d) => {
                self.pending_duration = d
            }
            _ => warn!("ignoring invalid segment duration {:?}", value),
        }
    }

    fn segment(&mut self, uri: &str, base_dir: &Path) -> Segment {
        let start = self.cursor.unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let segment = Segment {
            path: base_dir.join(uri),
            start,
            duration: self.pending_duration,
        };
        self.cursor = Some(segment.end());
        segment
    }
}

fn parse_instant(value: &str) -> Option<OffsetDateTime> {
    let value = value.trim();
    OffsetDateTime::parse(value, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(value, &Iso8601::DEFAULT))
        .ok()
}

/// Parses an HLS media playlist into its segments, resolving URIs against
/// `base_dir`.
///
/// Each `#EXT-X-PROGRAM-DATE-TIME` re-anchors the clock; every segment starts
/// where the previous one ended. Segments seen before any anchor count from
/// the Unix epoch. The last `#EXTINF` duration applies to every following
/// segment until another one appears.
pub fn parse(document: &str, base_dir: &Path) -> Vec<Segment> {
    let mut state = ParserState::default();
    let mut segments = Vec::new();

    for line in document.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(value) = line.strip_prefix(PROGRAM_DATE_TIME) {
            state.anchor(value);
        } else if let Some(value) = line.strip_prefix(EXTINF) {
            state.duration(value);
        } else if !line.starts_with('#') {
            segments.push(state.segment(line, base_dir));
        }
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn accumulates_from_the_anchor() {
        let document = "#EXTM3U\n\
                        #EXT-X-PROGRAM-DATE-TIME:2025-09-06T12:00:00Z\n\
                        #EXTINF:4.0,\n\
                        a.ts\n\
                        #EXTINF:4.0,\n\
                        b.ts\n";
        let segments = parse(document, Path::new("/hls/ch1"));

        assert_eq!(
            segments,
            vec![
                Segment {
                    path: PathBuf::from("/hls/ch1/a.ts"),
                    start: datetime!(2025-09-06 12:00:00 UTC),
                    duration: 4.0,
                },
                Segment {
                    path: PathBuf::from("/hls/ch1/b.ts"),
                    start: datetime!(2025-09-06 12:00:04 UTC),
                    duration: 4.0,
                },
            ]
        );
    }

    #[test]
    fn defaults_to_the_epoch_and_reuses_durations() {
        let segments = parse("#EXTINF:2.5\none.ts\ntwo.ts\n", Path::new("."));

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(segments[1].start, datetime!(1970-01-01 00:00:02.5 UTC));
        assert_eq!(segments[1].duration, 2.5);
    }

    #[test]
    fn anchors_reset_the_clock() {
        let document = "#EXT-X-PROGRAM-DATE-TIME:2025-09-06T12:00:00+02:00\n\
                        #EXTINF:6,\n\
                        a.ts\n\
                        #EXT-X-PROGRAM-DATE-TIME:2025-09-06T11:00:00.500Z\n\
                        b.ts\n";
        let segments = parse(document, Path::new("/x"));

        assert_eq!(segments[0].start, datetime!(2025-09-06 10:00:00 UTC));
        assert_eq!(segments[1].start, datetime!(2025-09-06 11:00:00.5 UTC));
    }

    #[test]
    fn bad_directives_are_skipped() {
        let document = "#EXT-X-PROGRAM-DATE-TIME:yesterday\n\
                        #EXTINF:-3,\n\
                        #EXTINF:NaN,\n\
                        #EXT-X-TARGETDURATION:4\n\
                        \n\
                        a.ts\n";
        let segments = parse(document, Path::new("/x"));

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(segments[0].duration, 0.0);
    }

    #[test]
    fn handles_crlf_and_subdirectories() {
        let document = "#EXTINF:4.000,title\r\nlow/seg-1.ts\r\n";
        let segments = parse(document, Path::new("/hls/ch1"));

        assert_eq!(segments[0].path, PathBuf::from("/hls/ch1/low/seg-1.ts"));
        assert_eq!(segments[0].duration, 4.0);
    }

    #[test]
    fn overlap_is_half_open() {
        let segment = Segment {
            path: PathBuf::from("a.ts"),
            start: datetime!(2025-09-06 12:00:04 UTC),
            duration: 4.0,
        };
        assert!(segment.overlaps(
            datetime!(2025-09-06 12:00:00 UTC),
            datetime!(2025-09-06 12:00:05 UTC)
        ));
        assert!(!segment.overlaps(
            datetime!(2025-09-06 12:00:08 UTC),
            datetime!(2025-09-06 12:00:10 UTC)
        ));
        assert!(!segment.overlaps(
            datetime!(2025-09-06 12:00:00 UTC),
            datetime!(2025-09-06 12:00:04 UTC)
        ));
    }
}
