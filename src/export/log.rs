use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::error::PipelineError;

/// Text log of per-frame summaries.
///
/// Lines are buffered in memory and written in one batch when the sink is closed.
/// Closing with an empty buffer still creates an empty file.
#[derive(Debug)]
pub struct LogSink {
    path: PathBuf,
    lines: Vec<String>,
    closed: bool,
}

impl LogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lines: Vec::new(),
            closed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, line: impl Into<String>) {
        if self.closed {
            log::warn!("LogSink: dropping line appended after close");
            return;
        }
        self.lines.push(line.into());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Write every buffered line, newline-terminated, truncating any existing file.
    /// Later calls do nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let lines = std::mem::take(&mut self.lines);
        write_lines(&self.path, &lines).map_err(|err| {
            PipelineError::SinkFailure(format!("{}: {}", self.path.display(), err))
        })?;
        log::info!(
            "LogSink: wrote {} lines to {}",
            lines.len(),
            self.path.display()
        );
        Ok(())
    }
}

fn write_lines(path: &Path, lines: &[String]) -> std::io::Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    for line in lines {
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
    }
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_writes_all_lines_once() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("log.txt");
        let mut sink = LogSink::new(&path);
        sink.append("[10:00:00] FPS: 1.00 | Detected: None");
        sink.append("[10:00:01] FPS: 1.00 | Detected: car (0.50)");
        assert!(!path.exists());
        sink.close()?;
        sink.close()?;
        assert_eq!(
            std::fs::read_to_string(&path)?,
            "[10:00:00] FPS: 1.00 | Detected: None\n[10:00:01] FPS: 1.00 | Detected: car (0.50)\n"
        );
        Ok(())
    }

    #[test]
    fn empty_log_still_creates_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("empty.txt");
        LogSink::new(&path).close()?;
        assert_eq!(std::fs::metadata(&path)?.len(), 0);
        Ok(())
    }

    #[test]
    fn unwritable_path_is_sink_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = LogSink::new(dir.path().join("missing").join("log.txt"));
        let err = sink.close().unwrap_err();
        let typed = err.downcast_ref::<PipelineError>().expect("typed error");
        assert_eq!(typed.code(), "SINK_FAILURE");
        assert!(sink.is_closed());
    }
}
