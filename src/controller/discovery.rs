//! # Candidate Discovery
//!
//! Lists the device nodes probed when no device is named on the command
//! line. Candidates are sorted so association order is deterministic when
//! several remotes are connected.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{BridgeError, Result};

/// Enumerate candidate device nodes
///
/// # Arguments
///
/// * `input_dir` - Directory to scan, usually `/dev/input`
/// * `prefix` - File name prefix of candidate nodes, usually `js`
///
/// # Errors
///
/// - `NoEligibleDevice`: the directory is missing or holds no candidate
/// - `Io`: the directory cannot be read
pub fn candidates(input_dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    if !input_dir.exists() {
        return Err(BridgeError::NoEligibleDevice(format!(
            "{} not found",
            input_dir.display()
        )));
    }

    let mut nodes = Vec::new();
    for entry in fs::read_dir(input_dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .map(|name| name.to_string_lossy().starts_with(prefix))
            .unwrap_or(false);
        if matches {
            nodes.push(path);
        }
    }

    if nodes.is_empty() {
        return Err(BridgeError::NoEligibleDevice("no joysticks found".to_string()));
    }

    nodes.sort();
    debug!("Discovered {} candidate(s) in {}", nodes.len(), input_dir.display());
    Ok(nodes)
}
