use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use webbrowser::Browser;

use crate::detection::{endpoint_url, EXPORT_LOG_PATH};
use crate::stats::StatsSnapshot;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("could not open browser: {0}")]
    Browser(String),
}

/// Opens URLs on the user's behalf
pub trait Navigator {
    fn open(&self, url: &str) -> Result<(), ExportError>;
}

/// Opens URLs in the system web browser
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn open(&self, url: &str) -> Result<(), ExportError> {
        if !Browser::is_available() {
            return Err(ExportError::Browser("no web browser available".to_string()));
        }
        webbrowser::open(url).map_err(|e| ExportError::Browser(e.to_string()))
    }
}

pub fn export_log_url(server_url: &str) -> String {
    endpoint_url(server_url, EXPORT_LOG_PATH)
}

/// Ask the server for its log download. Returns the URL that was opened.
pub fn open_server_export(
    navigator: &dyn Navigator,
    server_url: &str,
) -> Result<String, ExportError> {
    let url = export_log_url(server_url);
    navigator.open(&url)?;
    info!(url = %url, "opened server log export");
    Ok(url)
}

#[derive(Serialize)]
struct CsvRow<'a> {
    timestamp: String,
    gesture: &'a str,
    distance: Option<f64>,
}

/// Write the session history as `timestamp,gesture,distance`, oldest first.
/// Returns the number of rows written.
pub fn write_csv<W: Write>(writer: W, snapshot: &StatsSnapshot) -> Result<usize, ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    if snapshot.gesture_history.is_empty() {
        wtr.write_record(["timestamp", "gesture", "distance"])?;
    }
    for entry in snapshot.gesture_history.iter().rev() {
        wtr.serialize(CsvRow {
            timestamp: entry.recorded_at.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            gesture: &entry.gesture,
            distance: entry.distance,
        })?;
    }
    wtr.flush()?;
    Ok(snapshot.gesture_history.len())
}

pub fn export_file_name(now: DateTime<Local>) -> String {
    format!("gesture_log_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

/// Write the history to a timestamped CSV file under `dir`
pub fn export_to_dir(
    dir: &Path,
    snapshot: &StatsSnapshot,
    now: DateTime<Local>,
) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(now));
    let file = fs::File::create(&path)?;
    let rows = write_csv(file, snapshot)?;
    info!(path = %path.display(), rows, "exported session log");
    Ok(path)
}
