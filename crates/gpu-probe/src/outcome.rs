use std::collections::BTreeMap;
use std::path::PathBuf;

use derive_more::Display;
use serde::Serialize;

use crate::driver::DriverProbe;

/// Detection strategies, in cascade order.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[display("scheduler environment")]
    SchedulerEnv,
    #[display("CUDA environment")]
    CudaEnv,
    #[display("CDI configuration")]
    Cdi,
    #[display("CUDA driver")]
    Driver,
    #[display("diagnostic tool")]
    DiagnosticTool,
}

/// Result of one probe.
#[derive(Debug, Display, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    #[display("available via {strategy}: {detail}")]
    Available { strategy: Strategy, detail: String },
    /// The driver initialized but reported no devices.
    #[display("driver reports no devices")]
    DriverNoDevices,
    #[display("driver error {code}")]
    DriverError { code: i32 },
    #[display("no driver")]
    NoDriver,
}

impl Outcome {
    pub fn is_available(&self) -> bool {
        matches!(self, Outcome::Available { .. })
    }

    pub fn strategy(&self) -> Option<Strategy> {
        match self {
            Outcome::Available { strategy, .. } => Some(*strategy),
            _ => None,
        }
    }

    /// Negative outcome for a driver probe that found no devices.
    pub(crate) fn unavailable(driver: &DriverProbe) -> Self {
        match driver {
            DriverProbe::Devices { .. } => Outcome::DriverNoDevices,
            DriverProbe::InitFailed { code, .. } | DriverProbe::CountFailed { code, .. } => {
                Outcome::DriverError { code: *code }
            }
            DriverProbe::Unavailable => Outcome::NoDriver,
        }
    }
}

/// Probe outcome with the host facts an operator needs to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub outcome: Outcome,
    /// Relevant GPU variables that are set.
    pub environment: BTreeMap<String, String>,
    /// GPU device nodes present on the host.
    pub device_nodes: Vec<PathBuf>,
}

impl ProbeReport {
    pub fn is_available(&self) -> bool {
        self.outcome.is_available()
    }
}
