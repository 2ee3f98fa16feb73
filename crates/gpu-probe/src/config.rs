use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while loading a [`ProbeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read probe config `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse probe config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Tunables for the detection cascade.
///
/// Every field has a default, so a YAML file only needs the keys it
/// overrides:
///
/// ```yaml
/// cdiDir: /var/run/cdi
/// toolTimeoutMs: 2000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeConfig {
    /// Scheduler-injected visible-devices variables, first set wins.
    pub scheduler_vars: Vec<String>,
    /// Values of a scheduler variable that mean "no device".
    pub scheduler_sentinels: Vec<String>,
    /// Standard CUDA visible-devices / ordinal variables, first set wins.
    pub cuda_vars: Vec<String>,
    /// Values of a CUDA variable that mean "no device".
    pub cuda_sentinels: Vec<String>,
    /// Container Device Interface configuration directory.
    pub cdi_dir: PathBuf,
    /// Glob matching GPU device nodes, reported as diagnostics only.
    pub device_node_pattern: String,
    /// Driver library tried before the platform candidates.
    pub driver_library: Option<PathBuf>,
    pub tool_program: String,
    pub tool_args: Vec<String>,
    pub tool_timeout_ms: u64,
    /// Variables dumped for operators when nothing is detected.
    pub diagnostic_vars: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            scheduler_vars: strings(&["NVIDIA_VISIBLE_DEVICES", "RUNAI-VISIBLE-DEVICES"]),
            scheduler_sentinels: strings(&["-1", "void"]),
            cuda_vars: strings(&["CUDA_VISIBLE_DEVICES", "GPU_DEVICE_ORDINAL"]),
            cuda_sentinels: strings(&["-1"]),
            cdi_dir: PathBuf::from("/etc/cdi"),
            device_node_pattern: "/dev/nvidia[0-9]*".to_string(),
            driver_library: None,
            tool_program: "nvidia-smi".to_string(),
            tool_args: strings(&["--query-gpu=name", "--format=csv,noheader"]),
            tool_timeout_ms: 5_000,
            diagnostic_vars: strings(&[
                "NVIDIA_VISIBLE_DEVICES",
                "RUNAI-VISIBLE-DEVICES",
                "CUDA_VISIBLE_DEVICES",
                "GPU_DEVICE_ORDINAL",
                "NVIDIA_DRIVER_CAPABILITIES",
                "RUNAI_NUM_OF_GPUS",
            ]),
        }
    }
}

impl ProbeConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a config from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::debug!("Loading probe configuration from {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }
}
