use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Current time in whole seconds since the epoch
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}

// Log file for a run started at `timestamp`
pub fn log_file_path(dir: &Path, timestamp: u64) -> PathBuf {
    dir.join(format!("ChatServer_{}.log", timestamp))
}
