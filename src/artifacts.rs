//! Files a session leaves behind.
//!
//! ```text
//! {data_dir}/{INST}_{dd-Mon-yy}_{HH-MM-SS}/
//!     {INST}_DBG_{date}_{time}.txt   debug text from the instrument
//!     {INST}_XML_{date}_{time}.txt   received frames, one line each
//!     {INST}_CMD_{date}_{time}.txt   what the OBC sent
//!     TM/TM_{date}_{time}.{INST}.dat one per telemetry frame: header + binary
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::info;

use crate::clock;
use crate::error::SessionError;

#[derive(Debug, Clone)]
pub struct SessionArtifacts {
    dir: PathBuf,
    debug_log: PathBuf,
    frame_log: PathBuf,
    command_log: PathBuf,
    telemetry: TelemetryStore,
}

impl SessionArtifacts {
    pub fn create(data_dir: &Path, instrument: &str, now: NaiveDateTime) -> Result<Self, SessionError> {
        let date = clock::file_date(now);
        let time = clock::file_time(now);
        let header_time = clock::header_time(now);

        fs::create_dir_all(data_dir).map_err(artifact_err(data_dir))?;
        let dir = data_dir.join(format!("{instrument}_{date}_{time}"));
        fs::create_dir(&dir).map_err(artifact_err(&dir))?;
        let tm_dir = dir.join("TM");
        fs::create_dir(&tm_dir).map_err(artifact_err(&tm_dir))?;

        let named = |tag: &str| dir.join(format!("{instrument}_{tag}_{date}_{time}.txt"));
        let artifacts = Self {
            debug_log: named("DBG"),
            frame_log: named("XML"),
            command_log: named("CMD"),
            telemetry: TelemetryStore {
                dir: tm_dir,
                instrument: instrument.to_string(),
            },
            dir: dir.clone(),
        };

        for (path, title) in [
            (&artifacts.debug_log, "Debug Messages"),
            (&artifacts.frame_log, "XML Messages"),
            (&artifacts.command_log, "Commands"),
        ] {
            fs::write(path, format!("{instrument} {title}: {date} at {header_time}\n\n"))
                .map_err(artifact_err(path))?;
        }

        info!(dir = %artifacts.dir.display(), "session artifacts created");
        Ok(artifacts)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn debug_log_path(&self) -> &Path {
        &self.debug_log
    }

    pub fn frame_log_path(&self) -> &Path {
        &self.frame_log
    }

    pub fn command_log_path(&self) -> &Path {
        &self.command_log
    }

    pub fn open_debug_log(&self) -> Result<File, SessionError> {
        append(&self.debug_log)
    }

    pub fn open_frame_log(&self) -> Result<File, SessionError> {
        append(&self.frame_log)
    }

    pub fn open_command_log(&self) -> Result<File, SessionError> {
        append(&self.command_log)
    }

    pub fn telemetry(&self) -> TelemetryStore {
        self.telemetry.clone()
    }
}

/// Writes one file per received telemetry frame. Files are never reopened.
#[derive(Debug, Clone)]
pub struct TelemetryStore {
    dir: PathBuf,
    instrument: String,
}

impl TelemetryStore {
    pub fn new(dir: impl Into<PathBuf>, instrument: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            instrument: instrument.into(),
        }
    }

    /// Stores `header` followed by `trailer`. Two frames in the same second
    /// get distinct names rather than overwriting each other.
    pub fn write(&self, header: &[u8], trailer: &[u8], now: NaiveDateTime) -> io::Result<PathBuf> {
        let stem = format!("TM_{}_{}", clock::file_date(now), clock::file_time(now));
        let mut attempt = 0u32;
        loop {
            let name = match attempt {
                0 => format!("{stem}.{}.dat", self.instrument),
                n => format!("{stem}_{n}.{}.dat", self.instrument),
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(header)?;
                    file.write_all(trailer)?;
                    file.flush()?;
                    return Ok(path);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(err) => return Err(err),
            }
        }
    }
}

fn append(path: &Path) -> Result<File, SessionError> {
    OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(artifact_err(path))
}

fn artifact_err(path: &Path) -> impl FnOnce(io::Error) -> SessionError + '_ {
    move |source| SessionError::Artifact {
        path: path.to_path_buf(),
        source,
    }
}
