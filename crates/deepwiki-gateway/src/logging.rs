use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogConfig;

const LOG_FILE_NAME: &str = "gateway.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// `gateway.log` plus a single `gateway.log.1` backup. The live file stays
/// open and its length is tracked in memory; once a write would push it past
/// the limit it is renamed to the backup and a fresh file is opened.
#[derive(Debug)]
struct RotatingLogFile {
    live: PathBuf,
    backup: PathBuf,
    limit: u64,
    file: File,
    len: u64,
}

impl RotatingLogFile {
    fn open(dir: &Path, limit: u64) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let live = dir.join(LOG_FILE_NAME);
        let backup = dir.join(format!("{LOG_FILE_NAME}.1"));
        let file = append_to(&live)?;
        let len = file.metadata()?.len();
        Ok(Self {
            live,
            backup,
            limit,
            file,
            len,
        })
    }

    fn roll_over(&mut self) -> io::Result<()> {
        self.file.flush()?;
        fs::rename(&self.live, &self.backup)?;
        self.file = append_to(&self.live)?;
        self.len = 0;
        Ok(())
    }
}

fn append_to(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl Write for RotatingLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let incoming = buf.len() as u64;
        if self.len > 0 && self.len.saturating_add(incoming) > self.limit {
            self.roll_over()?;
        }
        self.file.write_all(buf)?;
        self.len += incoming;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Installs the global subscriber for the binary. `RUST_LOG` takes precedence
/// over `[log] level`. Failures are reported on stderr and leave logging off.
pub fn init_tracing(log: &LogConfig) {
    let file = match RotatingLogFile::open(&log.dir, log.rotate_size_bytes) {
        Ok(file) => file,
        Err(error) => {
            eprintln!(
                "warning: open log file under {} failed: {error}",
                log.dir.display()
            );
            return;
        }
    };
    let (writer, guard) = tracing_appender::non_blocking(file);
    if LOG_GUARD.set(guard).is_err() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .with(
            log.stdout
                .then(|| tracing_subscriber::fmt::layer().with_ansi(false)),
        )
        .try_init();
    if let Err(error) = installed {
        eprintln!("warning: install tracing subscriber failed: {error}");
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn writes_append_to_existing_log_and_track_its_length() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join(LOG_FILE_NAME), "old\n").expect("seed log");

        let mut file = RotatingLogFile::open(dir.path(), 1024).expect("open log");
        assert_eq!(file.len, 4);
        file.write_all(b"new\n").expect("write");
        file.flush().expect("flush");

        assert_eq!(file.len, 8);
        assert_eq!(
            fs::read_to_string(dir.path().join(LOG_FILE_NAME)).expect("live log"),
            "old\nnew\n"
        );
    }

    #[test]
    fn write_past_limit_moves_live_file_to_backup() {
        let dir = tempdir().expect("tempdir");
        let mut file = RotatingLogFile::open(&dir.path().join("logs"), 16).expect("open log");

        file.write_all(b"first line 0123\n").expect("first write");
        file.write_all(b"second line\n").expect("second write");
        file.flush().expect("flush");

        let logs = dir.path().join("logs");
        assert_eq!(
            fs::read_to_string(logs.join("gateway.log.1")).expect("backup log"),
            "first line 0123\n"
        );
        assert_eq!(
            fs::read_to_string(logs.join(LOG_FILE_NAME)).expect("live log"),
            "second line\n"
        );
        assert_eq!(file.len, 12);
    }

    #[test]
    fn oversized_first_write_is_kept_without_rotation() {
        let dir = tempdir().expect("tempdir");
        let mut file = RotatingLogFile::open(dir.path(), 4).expect("open log");

        file.write_all(b"longer than the limit\n").expect("write");
        file.flush().expect("flush");

        assert!(!dir.path().join("gateway.log.1").exists());
        assert_eq!(file.len, 22);
    }
}
