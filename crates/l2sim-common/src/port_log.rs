//! Per-port log streams.
//!
//! Each switch port and each station writes a human-readable trail of what
//! happened to its frames. A stream is backed by an append-mode text file,
//! an in-memory buffer, or nothing at all. Every line is also emitted as a
//! `tracing` debug event tagged with the port.

use std::fs::{self, File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::PathBuf;

use l2sim_types::{PortId, MAX_PORTS};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::SimResult;

/// Where port log streams are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// Append to text files inside this directory.
    Files(PathBuf),
    /// Keep lines in memory so they can be inspected.
    Memory,
    /// Drop lines (they still reach `tracing`).
    Discard,
}

enum Sink {
    File(LineWriter<File>),
    Memory(Vec<String>),
    Discard,
}

/// A single port's log stream.
pub struct PortLog {
    port: PortId,
    name: String,
    sink: Mutex<Sink>,
}

impl PortLog {
    /// Opens the stream `name` for `port`. File streams start with a
    /// timestamped banner.
    pub fn open(target: &LogTarget, name: &str, port: PortId) -> SimResult<Self> {
        let sink = match target {
            LogTarget::Files(dir) => {
                fs::create_dir_all(dir)?;
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(dir.join(name))?;
                Sink::File(LineWriter::new(file))
            }
            LogTarget::Memory => Sink::Memory(Vec::new()),
            LogTarget::Discard => Sink::Discard,
        };

        let log = Self {
            port,
            name: name.to_string(),
            sink: Mutex::new(sink),
        };
        if matches!(target, LogTarget::Files(_)) {
            log.banner();
        }
        Ok(log)
    }

    fn banner(&self) {
        let rule = format!("+{}+", "-".repeat(64));
        let now = chrono::Local::now().format("%a %b %e %H:%M:%S %Y");
        self.write_raw("");
        self.write_raw(&rule);
        self.write_raw(&format!("   Opened the file for logging data on {}", now));
        self.write_raw(&rule);
    }

    /// The port this stream belongs to.
    pub fn port(&self) -> PortId {
        self.port
    }

    /// Appends one line.
    pub fn line(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        debug!(port = %self.port, log = %self.name, "{}", message);
        self.write_raw(message);
    }

    fn write_raw(&self, message: &str) {
        match &mut *self.sink.lock() {
            Sink::File(writer) => {
                if let Err(e) = writeln!(writer, "{}", message) {
                    warn!(log = %self.name, error = %e, "Failed to write port log");
                }
            }
            Sink::Memory(lines) => lines.push(message.to_string()),
            Sink::Discard => {}
        }
    }

    /// Lines captured so far (memory streams only).
    pub fn lines(&self) -> Vec<String> {
        match &*self.sink.lock() {
            Sink::Memory(lines) => lines.clone(),
            _ => Vec::new(),
        }
    }

    /// Returns true if any captured line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        match &*self.sink.lock() {
            Sink::Memory(lines) => lines.iter().any(|l| l.contains(needle)),
            _ => false,
        }
    }

    /// Number of captured lines containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        match &*self.sink.lock() {
            Sink::Memory(lines) => lines.iter().filter(|l| l.contains(needle)).count(),
            _ => 0,
        }
    }

    /// Flushes and closes the stream; later lines only reach `tracing`.
    pub fn close(&self) {
        let mut sink = self.sink.lock();
        if let Sink::File(writer) = &mut *sink {
            if let Err(e) = writer.flush() {
                warn!(log = %self.name, error = %e, "Failed to flush port log");
            }
            *sink = Sink::Discard;
        }
    }
}

impl std::fmt::Debug for PortLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortLog")
            .field("port", &self.port)
            .field("name", &self.name)
            .finish()
    }
}

/// The switch-side streams, one per port (`port1.txt` .. `port4.txt`).
#[derive(Debug)]
pub struct PortLogs {
    logs: Vec<PortLog>,
}

impl PortLogs {
    /// Opens the four switch-side streams.
    pub fn open(target: &LogTarget) -> SimResult<Self> {
        let logs = PortId::all()
            .map(|port| PortLog::open(target, &format!("port{}.txt", port), port))
            .collect::<SimResult<Vec<_>>>()?;
        debug_assert_eq!(logs.len(), MAX_PORTS);
        Ok(Self { logs })
    }

    /// The stream for `port`.
    pub fn get(&self, port: PortId) -> &PortLog {
        &self.logs[port.index()]
    }

    /// Closes every stream.
    pub fn close_all(&self) {
        for log in &self.logs {
            log.close();
        }
    }
}

/// File name of a station's stream.
pub fn station_log_name(port: PortId) -> String {
    format!("log_station{}.txt", port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn port(n: u8) -> PortId {
        PortId::new(n).unwrap()
    }

    #[test]
    fn test_memory_log_captures_lines() {
        let log = PortLog::open(&LogTarget::Memory, "port1.txt", port(1)).unwrap();
        log.line("Port - 1 is enabled");
        log.line("Frame is forwarded to port - 2");

        assert_eq!(
            log.lines(),
            vec!["Port - 1 is enabled", "Frame is forwarded to port - 2"]
        );
        assert!(log.contains("forwarded"));
        assert_eq!(log.count("Port - 1"), 1);
    }

    #[test]
    fn test_discard_log_keeps_nothing() {
        let log = PortLog::open(&LogTarget::Discard, "port1.txt", port(1)).unwrap();
        log.line("anything");
        assert!(log.lines().is_empty());
    }

    #[test]
    fn test_file_log_appends_with_banner() {
        let dir = tempfile::tempdir().unwrap();
        let target = LogTarget::Files(dir.path().to_path_buf());

        let log = PortLog::open(&target, "port2.txt", port(2)).unwrap();
        log.line("Port - 2 is enabled");
        log.close();
        log.line("after close");

        let log = PortLog::open(&target, "port2.txt", port(2)).unwrap();
        log.line("second session");
        log.close();

        let content = fs::read_to_string(dir.path().join("port2.txt")).unwrap();
        assert_eq!(content.matches("Opened the file for logging data on").count(), 2);
        assert!(content.contains("Port - 2 is enabled"));
        assert!(content.contains("second session"));
        assert!(!content.contains("after close"));
    }

    #[test]
    fn test_switch_logs_cover_every_port() {
        let logs = PortLogs::open(&LogTarget::Memory).unwrap();
        for p in PortId::all() {
            assert_eq!(logs.get(p).port(), p);
        }
        assert_eq!(station_log_name(port(3)), "log_station3.txt");
    }
}
