//! Native CUDA driver probing through dynamic loading.
//!
//! Only `cuInit` and `cuDeviceGetCount` are resolved, so a driver that is
//! missing newer entry points still answers the device-count query.

use std::ffi::c_int;
use std::ffi::c_uint;
use std::ffi::OsStr;
use std::ffi::OsString;
use std::path::Path;

use libloading::Library;
use libloading::Symbol;

const CUDA_SUCCESS: c_int = 0;

type CuInit = unsafe extern "system" fn(flags: c_uint) -> c_int;
type CuDeviceGetCount = unsafe extern "system" fn(count: *mut c_int) -> c_int;

#[cfg(target_os = "windows")]
const DRIVER_CANDIDATES: &[&str] = &["nvcuda.dll"];
#[cfg(target_os = "macos")]
const DRIVER_CANDIDATES: &[&str] = &["libcuda.dylib"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const DRIVER_CANDIDATES: &[&str] = &["libcuda.so", "libcuda.so.1"];

/// Driver library names tried on this platform, in order.
pub fn platform_candidates() -> &'static [&'static str] {
    DRIVER_CANDIDATES
}

/// Result of probing the CUDA driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverProbe {
    /// No candidate could be loaded, or none exported the entry points.
    Unavailable,
    /// `cuInit` returned a non-zero status.
    InitFailed { library: String, code: i32 },
    /// `cuDeviceGetCount` returned a non-zero status.
    CountFailed { library: String, code: i32 },
    /// The driver initialized and reported `count` devices.
    Devices { library: String, count: u32 },
}

impl DriverProbe {
    pub fn has_devices(&self) -> bool {
        matches!(self, DriverProbe::Devices { count, .. } if *count > 0)
    }

    fn rank(&self) -> u8 {
        match self {
            DriverProbe::Unavailable => 0,
            DriverProbe::InitFailed { .. } | DriverProbe::CountFailed { .. } => 1,
            DriverProbe::Devices { .. } => 2,
        }
    }
}

/// Access to the native GPU driver.
pub trait CudaDriver: Send + Sync {
    fn probe(&self) -> DriverProbe;
}

/// Folds per-library attempts into one result.
///
/// Stops at the first attempt with devices. Otherwise keeps the most
/// informative negative: zero devices, then a driver status, then unavailable.
pub fn summarize(attempts: impl IntoIterator<Item = DriverProbe>) -> DriverProbe {
    let mut best = DriverProbe::Unavailable;
    for attempt in attempts {
        if attempt.has_devices() {
            return attempt;
        }
        if attempt.rank() > best.rank() {
            best = attempt;
        }
    }
    best
}

/// Loads the CUDA driver from a ranked list of library names.
#[derive(Debug, Clone)]
pub struct DynamicCudaDriver {
    candidates: Vec<OsString>,
}

impl DynamicCudaDriver {
    /// Platform candidates, preceded by `explicit` when given.
    pub fn new(explicit: Option<&Path>) -> Self {
        let mut candidates: Vec<OsString> = Vec::new();
        if let Some(path) = explicit {
            candidates.push(path.as_os_str().to_owned());
        }
        candidates.extend(platform_candidates().iter().map(OsString::from));
        Self { candidates }
    }

    pub fn with_candidates(candidates: Vec<OsString>) -> Self {
        Self { candidates }
    }
}

impl Default for DynamicCudaDriver {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CudaDriver for DynamicCudaDriver {
    fn probe(&self) -> DriverProbe {
        summarize(self.candidates.iter().map(|name| probe_library(name)))
    }
}

/// Loads one library and queries it. The library is unloaded on return.
fn probe_library(name: &OsStr) -> DriverProbe {
    let library_name = name.to_string_lossy().into_owned();

    // SAFETY: loading the CUDA driver runs its initializers, which have no
    // preconditions on the calling process.
    let library = match unsafe { Library::new(name) } {
        Ok(library) => library,
        Err(e) => {
            tracing::debug!("failed to load {library_name}: {e}");
            return DriverProbe::Unavailable;
        }
    };

    // SAFETY: the signatures match the CUDA driver API declarations.
    let cu_init: Symbol<CuInit> = match unsafe { library.get(b"cuInit\0") } {
        Ok(symbol) => symbol,
        Err(e) => {
            tracing::debug!("{library_name} does not export cuInit: {e}");
            return DriverProbe::Unavailable;
        }
    };
    let cu_device_get_count: Symbol<CuDeviceGetCount> =
        match unsafe { library.get(b"cuDeviceGetCount\0") } {
            Ok(symbol) => symbol,
            Err(e) => {
                tracing::debug!("{library_name} does not export cuDeviceGetCount: {e}");
                return DriverProbe::Unavailable;
            }
        };

    // SAFETY: cuInit takes flags by value and must be called with 0.
    let code = unsafe { cu_init(0) };
    if code != CUDA_SUCCESS {
        tracing::debug!("cuInit from {library_name} returned {code}");
        return DriverProbe::InitFailed {
            library: library_name,
            code,
        };
    }

    let mut count: c_int = 0;
    // SAFETY: `count` is a valid, writable c_int for the duration of the call.
    let code = unsafe { cu_device_get_count(&mut count) };
    if code != CUDA_SUCCESS {
        tracing::debug!("cuDeviceGetCount from {library_name} returned {code}");
        return DriverProbe::CountFailed {
            library: library_name,
            code,
        };
    }

    DriverProbe::Devices {
        library: library_name,
        count: u32::try_from(count).unwrap_or(0),
    }
}
