//! File-based persistence of fund state as JSON.
//!
//! The file is replaced atomically: the new state is written to a sibling
//! temp file and renamed over the old one, so a crash mid-write leaves the
//! previous state intact.
//!
//! # Usage
//!
//! ```ignore
//! use basketfund::persistence;
//! use std::path::Path;
//!
//! fund.save(Path::new("fund.json")).unwrap();
//! let state = persistence::load_state(Path::new("fund.json")).unwrap();
//! ```

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::Fund;
use crate::ledger::FundState;

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Save `state` to `path` as pretty-printed JSON.
pub fn save_state(state: &FundState, path: &Path) -> io::Result<()> {
    let json = serde_json::to_string_pretty(state).map_err(io::Error::other)?;
    let tmp = temp_path(path);
    {
        let file = std::fs::File::create(&tmp)?;
        let mut writer = io::BufWriter::new(file);
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    std::fs::rename(&tmp, path)
}

/// Load a state saved by [`save_state`] and check its invariants.
pub fn load_state(path: &Path) -> io::Result<FundState> {
    let data = std::fs::read_to_string(path)?;
    let state: FundState = serde_json::from_str(&data).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: {e}", path.display()),
        )
    })?;
    state.validate().map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: {e}", path.display()),
        )
    })?;
    Ok(state)
}

impl Fund {
    /// Save the committed state to `path`.
    ///
    /// Requires the `persistence` feature.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        save_state(&self.snapshot(), path)
    }
}
