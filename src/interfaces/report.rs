use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// Writes reports as JSON, one document per line.
pub struct ReportWriter<W: Write> {
    writer: W,
}

impl<W: Write> ReportWriter<W> {
    /// Creates a new `ReportWriter` over any `Write` sink (e.g. Stdout, a Vec).
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write<T: Serialize>(&mut self, report: &T) -> Result<()> {
        serde_json::to_writer(&mut self.writer, report)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn write_all<T: Serialize>(&mut self, reports: impl IntoIterator<Item = T>) -> Result<()> {
        for report in reports {
            self.write(&report)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
