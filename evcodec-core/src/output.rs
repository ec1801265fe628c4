//! CSV writers for decoded events.

use crate::types::{CdEvent, TriggerEvent};
use std::io::{BufWriter, Write};
use thiserror::Error;

/// Errors that can occur during output writing.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// CSV writer for CD events, one `x,y,p,t` row per event.
pub struct CsvWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Writes the column header and, if known, the sensor geometry.
    pub fn write_header(&mut self, geometry: Option<(u16, u16)>) -> Result<(), OutputError> {
        if let Some((width, height)) = geometry {
            writeln!(self.writer, "%geometry:{},{}", width, height)?;
        }
        writeln!(self.writer, "x,y,p,t")?;
        Ok(())
    }

    pub fn write_events(&mut self, events: &[CdEvent]) -> Result<(), OutputError> {
        for event in events {
            writeln!(
                self.writer,
                "{},{},{},{}",
                event.x, event.y, event.polarity, event.t
            )?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// CSV writer for trigger events, one `p,t,id` row per event.
pub struct TriggerCsvWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> TriggerCsvWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    pub fn write_header(&mut self) -> Result<(), OutputError> {
        writeln!(self.writer, "p,t,id")?;
        Ok(())
    }

    pub fn write_events(&mut self, events: &[TriggerEvent]) -> Result<(), OutputError> {
        for event in events {
            writeln!(self.writer, "{},{},{}", event.polarity, event.t, event.id)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}
