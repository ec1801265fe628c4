//! Header of raw sensor recordings.
//!
//! Raw recordings start with `%`-prefixed text lines describing the sensor,
//! followed by the encoded event stream.

use std::io::BufRead;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a recording header declares about the stream that follows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingHeader {
    /// Encoding identifier in codec-table form, e.g. `"evt3"`
    pub encoding: Option<String>,
    pub width: Option<u16>,
    pub height: Option<u16>,
}

impl RecordingHeader {
    /// Consumes the header lines of `reader`, leaving it at the first byte of
    /// the event stream.
    pub fn read<R: BufRead>(reader: &mut R) -> Result<Self, RecordingError> {
        let mut header = Self::default();
        loop {
            let peeked = reader.fill_buf()?;
            if peeked.first() != Some(&b'%') {
                break;
            }

            let mut line = Vec::new();
            reader.read_until(b'\n', &mut line)?;
            let line = String::from_utf8_lossy(&line);
            if line.starts_with("% end") {
                break;
            }
            header.parse_line(&line);
        }
        Ok(header)
    }

    /// Parses one header line; unknown keys are ignored.
    pub fn parse_line(&mut self, line: &str) {
        let line = line.trim_end();

        if let Some(format_str) = line.strip_prefix("% format ") {
            // "% format EVT3;width=1280;height=720"
            let mut parts = format_str.split(';');
            if let Some(name) = parts.next() {
                self.encoding = Some(name.trim().to_ascii_lowercase());
            }
            for part in parts {
                match part.split_once('=') {
                    Some(("width", value)) => self.width = value.parse().ok().or(self.width),
                    Some(("height", value)) => self.height = value.parse().ok().or(self.height),
                    _ => {}
                }
            }
        } else if let Some(geometry_str) = line.strip_prefix("% geometry ") {
            // "% geometry 1280x720"
            if let Some((w, h)) = geometry_str.split_once('x') {
                if let (Ok(w), Ok(h)) = (w.trim().parse(), h.trim().parse()) {
                    self.width = Some(w);
                    self.height = Some(h);
                }
            }
        } else if let Some(version) = line.strip_prefix("% evt ") {
            // "% evt 3.0"; a format line takes precedence
            if self.encoding.is_none() {
                match version.trim() {
                    "3.0" => self.encoding = Some("evt3".to_string()),
                    "2.0" => self.encoding = Some("evt2".to_string()),
                    _ => {}
                }
            }
        }
    }
}
