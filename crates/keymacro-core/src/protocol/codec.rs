//! Line-oriented macro file codec.
//!
//! A macro file is plain UTF-8 text with one [`EventRecord`] per line:
//!
//! ```text
//! <delay_ms> <category> <code> <value>
//! ```
//!
//! Fields are separated by single spaces; there is no header, footer, or
//! checksum.  Files are meant to be human-inspectable and hand-editable.
//!
//! # Robustness over strictness
//!
//! Decoding never fails as a whole.  A line that does not split into exactly
//! four whitespace-separated tokens, or whose tokens do not parse as
//! `u64 u16 u16 i32`, is dropped and decoding continues with the next line.
//! A partially corrupted recording therefore stays maximally usable.
//!
//! # Durability
//!
//! [`MacroWriter`] flushes after every record.  A recording interrupted
//! mid-stream (crash, power loss, device unplugged) still contains every
//! record written up to that point, and is replayable as-is.

use std::fmt::Write as _;
use std::io::{self, BufRead, Write};
use std::num::ParseIntError;

use thiserror::Error;
use tracing::debug;

use crate::domain::event::{EventRecord, RawEvent};

/// Number of whitespace-separated fields in a well-formed line.
pub const FIELDS_PER_LINE: usize = 4;

/// Errors produced while decoding a single line.
///
/// These are recoverable: [`decode`] and [`MacroReader`] skip the offending line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The line does not describe a valid record.
    #[error("malformed record: {reason}")]
    MalformedRecord { reason: String },
}

impl CodecError {
    fn malformed(reason: impl Into<String>) -> Self {
        CodecError::MalformedRecord {
            reason: reason.into(),
        }
    }
}

/// Encodes a sequence of records, one line per record, each terminated by `\n`.
pub fn encode(records: &[EventRecord]) -> String {
    let mut out = String::with_capacity(records.len() * 16);
    for record in records {
        // Writing into a String cannot fail.
        let _ = writeln!(out, "{record}");
    }
    out
}

/// Decodes one line into a record.
///
/// Leading/trailing whitespace and a trailing `\r` are tolerated.
///
/// # Errors
///
/// Returns [`CodecError::MalformedRecord`] if the line does not contain
/// exactly four fields or any field fails to parse as its numeric type.
pub fn decode_line(line: &str) -> Result<EventRecord, CodecError> {
    let mut tokens = line.split_whitespace();
    let fields: [&str; FIELDS_PER_LINE] = match (
        tokens.next(),
        tokens.next(),
        tokens.next(),
        tokens.next(),
        tokens.next(),
    ) {
        (Some(a), Some(b), Some(c), Some(d), None) => [a, b, c, d],
        _ => {
            let count = line.split_whitespace().count();
            return Err(CodecError::malformed(format!(
                "expected {FIELDS_PER_LINE} fields, found {count}"
            )));
        }
    };

    let delay_ms = parse_field::<u64>("delay", fields[0])?;
    let category = parse_field::<u16>("category", fields[1])?;
    let code = parse_field::<u16>("code", fields[2])?;
    let value = parse_field::<i32>("value", fields[3])?;

    Ok(EventRecord::new(delay_ms, RawEvent::new(category, code, value)))
}

fn parse_field<T>(name: &str, token: &str) -> Result<T, CodecError>
where
    T: std::str::FromStr<Err = ParseIntError>,
{
    token
        .parse::<T>()
        .map_err(|e| CodecError::malformed(format!("{name} {token:?}: {e}")))
}

/// Decodes a whole macro file, silently dropping malformed lines.
pub fn decode(text: &str) -> Vec<EventRecord> {
    text.lines()
        .enumerate()
        .filter_map(|(idx, line)| accept_line(idx + 1, line))
        .collect()
}

/// Returns the record on `line`, logging and discarding anything malformed.
fn accept_line(line_no: usize, line: &str) -> Option<EventRecord> {
    if line.trim().is_empty() {
        return None;
    }
    match decode_line(line) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!("skipping macro line {line_no}: {e}");
            None
        }
    }
}

// ── Streaming reader ──────────────────────────────────────────────────────────

/// Lazily decodes records from a buffered reader.
///
/// Playback uses this to start emitting events before the whole file has
/// been read.  Malformed lines are skipped and counted; I/O errors are
/// yielded to the caller.
pub struct MacroReader<R> {
    lines: io::Lines<R>,
    line_no: usize,
    skipped: usize,
}

impl<R: BufRead> MacroReader<R> {
    /// Wraps a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            skipped: 0,
        }
    }

    /// Number of non-blank lines dropped as malformed so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> Iterator for MacroReader<R> {
    type Item = io::Result<EventRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match accept_line(self.line_no, &line) {
                Some(record) => return Some(Ok(record)),
                None => self.skipped += 1,
            }
        }
    }
}

// ── Append-only writer ────────────────────────────────────────────────────────

/// Appends records to a macro file, flushing after each one.
pub struct MacroWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> MacroWriter<W> {
    /// Wraps a writer.  Nothing is written until the first [`append`](Self::append).
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Writes one record as a line and flushes it.
    ///
    /// # Errors
    ///
    /// Propagates any I/O error from the underlying writer.
    pub fn append(&mut self, record: &EventRecord) -> io::Result<()> {
        writeln!(self.inner, "{record}")?;
        self.inner.flush()?;
        self.written += 1;
        Ok(())
    }

    /// Number of records appended so far.
    pub fn records_written(&self) -> u64 {
        self.written
    }

    /// Flushes and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Propagates the final flush error.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::categories;

    fn key(delay_ms: u64, code: u16, value: i32) -> EventRecord {
        EventRecord::new(delay_ms, RawEvent::new(categories::KEY, code, value))
    }

    #[test]
    fn test_encode_writes_one_line_per_record() {
        // Arrange
        let records = [key(0, 30, 1), key(120, 30, 0)];

        // Act
        let text = encode(&records);

        // Assert
        assert_eq!(text, "0 1 30 1\n120 1 30 0\n");
    }

    #[test]
    fn test_encode_empty_sequence_is_empty_text() {
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn test_decode_line_accepts_extra_whitespace_and_crlf() {
        // Act
        let record = decode_line("  15\t2  1   -3\r").expect("must parse");

        // Assert
        assert_eq!(record, EventRecord::new(15, RawEvent::new(2, 1, -3)));
    }

    #[test]
    fn test_decode_line_rejects_wrong_field_count() {
        assert!(matches!(
            decode_line("1 2 3"),
            Err(CodecError::MalformedRecord { .. })
        ));
        assert!(matches!(
            decode_line("1 2 3 4 5"),
            Err(CodecError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_decode_line_rejects_negative_delay() {
        let err = decode_line("-5 1 30 1").expect_err("negative delay is malformed");
        assert!(err.to_string().contains("delay"));
    }

    #[test]
    fn test_decode_line_rejects_out_of_range_category() {
        let err = decode_line("0 70000 30 1").expect_err("category overflows u16");
        assert!(err.to_string().contains("category"));
    }

    #[test]
    fn test_decode_line_rejects_non_numeric_value() {
        assert!(decode_line("0 1 30 pressed").is_err());
    }

    #[test]
    fn test_decode_skips_corrupted_line_and_keeps_order() {
        // Arrange
        let text = "0 1 30 1\n12 1 garbage 0\n40 1 30 0\n\n5 0 0 0\n";

        // Act
        let records = decode(text);

        // Assert
        assert_eq!(records, vec![key(0, 30, 1), key(40, 30, 0), EventRecord::new(5, RawEvent::new(0, 0, 0))]);
    }

    #[test]
    fn test_decode_inverts_encode() {
        // Arrange
        let records = vec![
            key(0, 42, 1),
            EventRecord::new(3, RawEvent::new(categories::REL, categories::REL_X, -12)),
            EventRecord::new(0, RawEvent::new(categories::SYN, 0, 0)),
            EventRecord::new(u64::MAX, RawEvent::new(u16::MAX, u16::MAX, i32::MIN)),
        ];

        // Act
        let decoded = decode(&encode(&records));

        // Assert
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_reader_streams_records_and_counts_skipped_lines() {
        // Arrange
        let text = "0 1 30 1\nnot a record\n\n7 1 30 0\n";
        let mut reader = MacroReader::new(text.as_bytes());

        // Act
        let records: Vec<EventRecord> = reader.by_ref().map(|r| r.expect("no io error")).collect();

        // Assert
        assert_eq!(records, vec![key(0, 30, 1), key(7, 30, 0)]);
        assert_eq!(reader.skipped(), 1, "blank lines are not counted as skipped");
    }

    #[test]
    fn test_reader_on_empty_input_yields_nothing() {
        let mut reader = MacroReader::new(&b""[..]);
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_writer_appends_lines_in_order() {
        // Arrange
        let mut writer = MacroWriter::new(Vec::new());

        // Act
        writer.append(&key(0, 30, 1)).unwrap();
        writer.append(&key(120, 30, 0)).unwrap();
        let count = writer.records_written();
        let bytes = writer.finish().unwrap();

        // Assert
        assert_eq!(count, 2);
        assert_eq!(String::from_utf8(bytes).unwrap(), "0 1 30 1\n120 1 30 0\n");
    }

    /// Writer that records how many times it was flushed.
    #[derive(Default)]
    struct FlushCounter {
        data: Vec<u8>,
        flushes: usize,
    }

    impl Write for FlushCounter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_writer_flushes_after_every_record() {
        // Arrange
        let mut writer = MacroWriter::new(FlushCounter::default());

        // Act
        for i in 0..3 {
            writer.append(&key(i, 30, 1)).unwrap();
        }

        // Assert
        assert_eq!(writer.inner.flushes, 3);
    }
}
