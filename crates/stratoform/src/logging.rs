//! Log setup
//!
//! Everything goes to stderr, which the host captures. In debug mode the
//! object storage client's trace also lands in `./.obs-sdk.log`, rotated
//! at 10 MiB with ten backups kept.

use anyhow::Context;
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use stratoform_cloud::obs::LOG_TARGET;
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

pub const OBS_LOG_FILE: &str = ".obs-sdk.log";
const OBS_LOG_MAX_SIZE: u64 = 10 * 1024 * 1024;
const OBS_LOG_MAX_BACKUPS: usize = 10;

pub fn init(debug: bool) -> anyhow::Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let stderr = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_filter(filter);

    let obs = if debug {
        let file = RotatingFile::open(OBS_LOG_FILE, OBS_LOG_MAX_SIZE, OBS_LOG_MAX_BACKUPS)
            .with_context(|| format!("cannot open {OBS_LOG_FILE}"))?;
        Some(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(Targets::new().with_target(LOG_TARGET, Level::DEBUG)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(stderr)
        .with(obs)
        .try_init()
        .context("cannot install the log subscriber")
}

/// An append-only log file that moves itself aside once it grows past
/// `max_size`, keeping the newest `max_backups` old files.
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    size: u64,
    max_size: u64,
    max_backups: usize,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, max_size: u64, max_backups: usize) -> io::Result<Self> {
        let path = path.into();
        let file = append(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            size,
            max_size,
            max_backups,
        })
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        fs::rename(&self.path, self.backup_path())?;
        self.file = append(&self.path)?;
        self.size = 0;
        self.prune()
    }

    /// `dir/.obs-sdk.log` becomes `dir/.obs-sdk-<local time>.log`.
    fn backup_path(&self) -> PathBuf {
        let (stem, ext) = self.name_parts();
        let stamp = Local::now().format("%Y-%m-%dT%H-%M-%S%.9f");
        self.dir().join(format!("{stem}-{stamp}.{ext}"))
    }

    fn name_parts(&self) -> (String, String) {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = self
            .path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "log".to_string());
        (stem, ext)
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    pub fn backups(&self) -> io::Result<Vec<PathBuf>> {
        let (stem, ext) = self.name_parts();
        let prefix = format!("{stem}-");
        let suffix = format!(".{ext}");
        let mut backups: Vec<PathBuf> = fs::read_dir(self.dir())?
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name.starts_with(&prefix) && name.ends_with(&suffix)
            })
            .map(|entry| entry.path())
            .collect();
        // Timestamps sort lexically, oldest first.
        backups.sort();
        Ok(backups)
    }

    fn prune(&self) -> io::Result<()> {
        let backups = self.backups()?;
        let excess = backups.len().saturating_sub(self.max_backups);
        for old in &backups[..excess] {
            fs::remove_file(old)?;
        }
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.size > 0 && self.size + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        let written = self.file.write(buf)?;
        self.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
