use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{take_last, MeasurementLog, MeasurementRecord, LOG_HEADER};
use crate::domain::EntityId;
use crate::error::{CoreError, CoreResult};

/// Measurement log backed by a `;`-separated text file
pub struct FileMeasurementLog {
    path: PathBuf,
    /// Serializes writers (append and clear) on this handle
    write_lock: Mutex<()>,
}

impl FileMeasurementLog {
    /// Opens the log at `path`, writing the header if the file is new.
    pub fn open(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            write_header(&path)?;
            debug!(path = %path.display(), "created measurement log");
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_header(path: &Path) -> io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "{LOG_HEADER}")?;
    file.sync_data()
}

impl MeasurementLog for FileMeasurementLog {
    fn append(&self, record: &MeasurementRecord) -> CoreResult<()> {
        let _guard = self.write_lock.lock();
        let result = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .and_then(|mut file| {
                writeln!(file, "{}", record.to_line())?;
                file.sync_data()
            });
        if let Err(e) = &result {
            warn!(path = %self.path.display(), entity_id = record.entity_id, error = %e, "measurement append failed");
        }
        Ok(result?)
    }

    fn query(&self, entity_id: EntityId, limit: usize) -> CoreResult<Vec<MeasurementRecord>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        let mut skipped = 0usize;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(CoreError::from)?;
            match MeasurementRecord::parse_line(&line) {
                Some(record) if record.entity_id == entity_id => records.push(record),
                Some(_) => {}
                None => skipped += 1,
            }
        }
        if skipped > 1 {
            // the header always counts as one
            debug!(path = %self.path.display(), skipped = skipped - 1, "skipped malformed log lines");
        }
        Ok(take_last(records.into_iter(), limit))
    }

    fn clear(&self) -> CoreResult<()> {
        let _guard = self.write_lock.lock();
        write_header(&self.path)?;
        Ok(())
    }
}
