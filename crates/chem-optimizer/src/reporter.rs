//! Line-oriented progress sink shared by all experiment components.

use chem_types::ChemResult;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

/// Append-only reporter. Cloning yields another handle to the same sink.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Reporter {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Reporter writing to a freshly created file.
    pub fn to_file(path: impl AsRef<Path>) -> ChemResult<Self> {
        let file = File::create(path.as_ref())?;
        Ok(Self::new(BufWriter::new(file)))
    }

    /// Reporter writing to memory, with a handle to read the lines back.
    pub fn in_memory() -> (Self, MemoryLog) {
        let log = MemoryLog::default();
        (Self::new(log.clone()), log)
    }

    /// Reporter discarding everything.
    pub fn discard() -> Self {
        Self::new(io::sink())
    }

    pub fn writeln(&self, line: impl AsRef<str>) {
        let mut sink = self.sink.lock();
        if let Err(e) = writeln!(sink, "{}", line.as_ref()) {
            tracing::warn!(error = %e, "reporter write failed");
        }
    }

    pub fn flush(&self) -> ChemResult<()> {
        self.sink.lock().flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter").finish_non_exhaustive()
    }
}

/// Shared in-memory buffer backing [`Reporter::in_memory`].
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemoryLog {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for MemoryLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_sink() {
        let (reporter, log) = Reporter::in_memory();
        let other = reporter.clone();
        reporter.writeln("first");
        other.writeln("second");
        assert_eq!(log.lines(), vec!["first", "second"]);
    }

    #[test]
    fn file_reporter_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        let reporter = Reporter::to_file(&path).unwrap();
        reporter.writeln("Optimum value found: 1.00000");
        reporter.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Optimum value found: 1.00000\n");
    }

    #[test]
    fn discard_accepts_lines() {
        let reporter = Reporter::discard();
        reporter.writeln("ignored");
        assert!(reporter.flush().is_ok());
    }
}
