//! Environment-variable signals.

use std::collections::HashMap;
use std::env;

/// Source of environment variables consulted by the prober.
pub trait EnvSource: Send + Sync {
    /// Value of `name`, or `None` when unset.
    fn var(&self, name: &str) -> Option<String>;
}

/// The current process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostEnv;

impl EnvSource for HostEnv {
    fn var(&self, name: &str) -> Option<String> {
        match env::var(name) {
            Ok(value) => Some(value),
            Err(env::VarError::NotPresent) => None,
            Err(env::VarError::NotUnicode(raw)) => {
                tracing::debug!("ignoring non-unicode value of {name}: {raw:?}");
                None
            }
        }
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Returns the first of `names` that is set, with its value.
///
/// Later names are only consulted when the earlier ones are unset, so an
/// earlier variable holding a sentinel hides the later ones.
pub fn first_set<'a>(env: &dyn EnvSource, names: &'a [String]) -> Option<(&'a str, String)> {
    names
        .iter()
        .find_map(|name| env.var(name).map(|value| (name.as_str(), value)))
}

/// Whether a visible-devices value names at least one device.
pub fn indicates_devices(value: &str, sentinels: &[String]) -> bool {
    !value.is_empty() && !sentinels.iter().any(|s| s == value)
}
