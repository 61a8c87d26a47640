#![allow(dead_code)]
use std::path::PathBuf;
use std::sync::Arc;

use der_monitor::engine::{spawn_engine, EngineHandle, EngineState};
use der_monitor::measurement::FileMeasurementLog;
use tokio::task::JoinHandle;

/// Temporary log file that is removed on drop
pub struct TempLog {
    pub path: PathBuf,
}

impl TempLog {
    pub fn new() -> Self {
        Self {
            path: std::env::temp_dir().join(format!("der-monitor-it-{}.log", uuid::Uuid::new_v4())),
        }
    }
}

impl Drop for TempLog {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub fn spawn_with_file_log(temp: &TempLog) -> (EngineHandle, JoinHandle<()>) {
    let log = Arc::new(FileMeasurementLog::open(&temp.path).expect("log file should open"));
    spawn_engine(EngineState::new(log, 64), 32)
}
