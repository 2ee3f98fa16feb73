//! Filesystem signals: CDI configuration and GPU device nodes.

use std::path::Path;
use std::path::PathBuf;

/// Whether the Container Device Interface configuration directory exists.
pub fn cdi_present(cdi_dir: &Path) -> bool {
    cdi_dir.exists()
}

/// Device nodes matching `pattern`, sorted. Unreadable entries are skipped.
pub fn device_nodes(pattern: &str) -> Vec<PathBuf> {
    let paths = match glob::glob(pattern) {
        Ok(paths) => paths,
        Err(e) => {
            tracing::debug!("invalid device node pattern {pattern:?}: {e}");
            return Vec::new();
        }
    };

    let mut nodes: Vec<PathBuf> = paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::debug!("skipping unreadable device node: {e}");
                None
            }
        })
        .collect();
    nodes.sort();
    nodes
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn cdi_directory_presence() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cdi_present(dir.path()));
        assert!(!cdi_present(&dir.path().join("cdi")));
    }

    #[test]
    fn device_nodes_match_numbered_devices_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["nvidia1", "nvidia0", "nvidiactl", "nvidia-uvm"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let pattern = format!("{}/nvidia[0-9]*", dir.path().display());
        assert_eq!(
            device_nodes(&pattern),
            vec![dir.path().join("nvidia0"), dir.path().join("nvidia1")]
        );
    }

    #[test]
    fn invalid_pattern_yields_nothing() {
        assert!(device_nodes("/dev/nvidia[").is_empty());
    }
}
