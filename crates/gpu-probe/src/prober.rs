//! The detection cascade.
//!
//! Strategies run cheapest first and stop at the first positive signal:
//!
//! 1. scheduler-injected visible-devices variables
//! 2. standard CUDA visible-devices / ordinal variables
//! 3. the CDI configuration directory
//! 4. the native CUDA driver
//! 5. the vendor diagnostic tool
//!
//! Every strategy absorbs its own failures; nothing here returns an error.

use std::collections::BTreeMap;

use crate::config::ProbeConfig;
use crate::devices;
use crate::driver::CudaDriver;
use crate::driver::DriverProbe;
use crate::driver::DynamicCudaDriver;
use crate::env;
use crate::env::EnvSource;
use crate::env::HostEnv;
use crate::outcome::Outcome;
use crate::outcome::ProbeReport;
use crate::outcome::Strategy;
use crate::tool::CommandTool;
use crate::tool::DiagnosticTool;
use crate::tool::ToolOutcome;

/// Answers whether a usable GPU is present.
///
/// Stateless across calls: every [`GpuProber::probe`] reruns the cascade.
pub struct GpuProber {
    config: ProbeConfig,
    env: Box<dyn EnvSource>,
    driver: Box<dyn CudaDriver>,
    tool: Box<dyn DiagnosticTool>,
}

impl GpuProber {
    /// Probes the host process environment, the dynamically loaded CUDA
    /// driver, and the configured diagnostic tool.
    pub fn new(config: ProbeConfig) -> Self {
        let driver = DynamicCudaDriver::new(config.driver_library.as_deref());
        let tool = CommandTool::new(
            config.tool_program.clone(),
            config.tool_args.clone(),
            config.tool_timeout(),
        );
        Self {
            config,
            env: Box::new(HostEnv),
            driver: Box::new(driver),
            tool: Box::new(tool),
        }
    }

    pub fn with_env(mut self, env: impl EnvSource + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    pub fn with_driver(mut self, driver: impl CudaDriver + 'static) -> Self {
        self.driver = Box::new(driver);
        self
    }

    pub fn with_tool(mut self, tool: impl DiagnosticTool + 'static) -> Self {
        self.tool = Box::new(tool);
        self
    }

    pub fn has_gpu(&self) -> bool {
        self.probe().is_available()
    }

    /// Runs the cascade.
    pub fn probe(&self) -> Outcome {
        let config = &self.config;

        if let Some(detail) = self.check_env(&config.scheduler_vars, &config.scheduler_sentinels) {
            return self.found(Strategy::SchedulerEnv, detail);
        }

        if let Some(detail) = self.check_env(&config.cuda_vars, &config.cuda_sentinels) {
            return self.found(Strategy::CudaEnv, detail);
        }

        if devices::cdi_present(&config.cdi_dir) {
            let detail = format!("{} present", config.cdi_dir.display());
            return self.found(Strategy::Cdi, detail);
        }

        let driver = self.driver.probe();
        if let DriverProbe::Devices { library, count } = &driver {
            if *count > 0 {
                return self.found(Strategy::Driver, format!("{count} device(s) via {library}"));
            }
        }
        tracing::debug!("driver probe: {driver:?}");

        match self.tool.query() {
            ToolOutcome::Succeeded { stdout } => {
                return self.found(Strategy::DiagnosticTool, stdout);
            }
            other => tracing::debug!("{}: {other:?}", config.tool_program),
        }

        let outcome = Outcome::unavailable(&driver);
        tracing::info!("No GPU detected ({outcome})");
        for (name, value) in self.environment() {
            tracing::info!("  {name}={value}");
        }
        outcome
    }

    /// Runs the cascade and collects diagnostics alongside the outcome.
    pub fn report(&self) -> ProbeReport {
        ProbeReport {
            outcome: self.probe(),
            environment: self.environment(),
            device_nodes: devices::device_nodes(&self.config.device_node_pattern),
        }
    }

    /// Diagnostic variables that are currently set.
    pub fn environment(&self) -> BTreeMap<String, String> {
        self.config
            .diagnostic_vars
            .iter()
            .filter_map(|name| self.env.var(name).map(|value| (name.clone(), value)))
            .collect()
    }

    fn check_env(&self, names: &[String], sentinels: &[String]) -> Option<String> {
        let (name, value) = env::first_set(self.env.as_ref(), names)?;
        if env::indicates_devices(&value, sentinels) {
            Some(format!("{name}={value}"))
        } else {
            tracing::debug!("{name}={value:?} does not name a device");
            None
        }
    }

    fn found(&self, strategy: Strategy, detail: String) -> Outcome {
        tracing::info!("Found GPU via {strategy}: {detail}");
        Outcome::Available { strategy, detail }
    }
}

impl Default for GpuProber {
    fn default() -> Self {
        Self::new(ProbeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;

    struct FakeDriver {
        result: DriverProbe,
        calls: Arc<AtomicUsize>,
    }

    impl CudaDriver for FakeDriver {
        fn probe(&self) -> DriverProbe {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    struct FakeTool {
        result: ToolOutcome,
        calls: Arc<AtomicUsize>,
    }

    impl DiagnosticTool for FakeTool {
        fn query(&self) -> ToolOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    struct Harness {
        prober: GpuProber,
        driver_calls: Arc<AtomicUsize>,
        tool_calls: Arc<AtomicUsize>,
        dir: tempfile::TempDir,
    }

    fn harness(
        vars: &[(&str, &str)],
        cdi: bool,
        driver: DriverProbe,
        tool: ToolOutcome,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let cdi_dir: PathBuf = dir.path().join("cdi");
        if cdi {
            std::fs::create_dir(&cdi_dir).unwrap();
        }

        let config = ProbeConfig {
            cdi_dir,
            device_node_pattern: format!("{}/nvidia[0-9]*", dir.path().display()),
            ..ProbeConfig::default()
        };
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let driver_calls = Arc::new(AtomicUsize::new(0));
        let tool_calls = Arc::new(AtomicUsize::new(0));
        let prober = GpuProber::new(config)
            .with_env(env)
            .with_driver(FakeDriver {
                result: driver,
                calls: driver_calls.clone(),
            })
            .with_tool(FakeTool {
                result: tool,
                calls: tool_calls.clone(),
            });

        Harness {
            prober,
            driver_calls,
            tool_calls,
            dir,
        }
    }

    fn no_devices() -> DriverProbe {
        DriverProbe::Devices {
            library: "libcuda.so.1".to_string(),
            count: 0,
        }
    }

    #[test]
    fn scheduler_variable_wins_over_everything() {
        let h = harness(
            &[("NVIDIA_VISIBLE_DEVICES", "GPU-1a2b"), ("CUDA_VISIBLE_DEVICES", "-1")],
            true,
            DriverProbe::Unavailable,
            ToolOutcome::NotFound,
        );

        assert_eq!(
            h.prober.probe(),
            Outcome::Available {
                strategy: Strategy::SchedulerEnv,
                detail: "NVIDIA_VISIBLE_DEVICES=GPU-1a2b".to_string(),
            }
        );
        assert_eq!(h.driver_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.tool_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn runai_variable_used_when_nvidia_unset() {
        let h = harness(
            &[("RUNAI-VISIBLE-DEVICES", "0")],
            false,
            DriverProbe::Unavailable,
            ToolOutcome::NotFound,
        );
        assert_eq!(h.prober.probe().strategy(), Some(Strategy::SchedulerEnv));
    }

    #[test]
    fn scheduler_sentinel_hides_later_scheduler_variable() {
        let h = harness(
            &[("NVIDIA_VISIBLE_DEVICES", "void"), ("RUNAI-VISIBLE-DEVICES", "0")],
            false,
            DriverProbe::Unavailable,
            ToolOutcome::NotFound,
        );
        assert_eq!(h.prober.probe(), Outcome::NoDriver);
    }

    #[test]
    fn scheduler_minus_one_falls_through_to_cuda() {
        let h = harness(
            &[("NVIDIA_VISIBLE_DEVICES", "-1"), ("GPU_DEVICE_ORDINAL", "2")],
            false,
            DriverProbe::Unavailable,
            ToolOutcome::NotFound,
        );
        assert_eq!(
            h.prober.probe(),
            Outcome::Available {
                strategy: Strategy::CudaEnv,
                detail: "GPU_DEVICE_ORDINAL=2".to_string(),
            }
        );
    }

    #[test]
    fn cuda_visible_devices_lists_devices() {
        let h = harness(
            &[("CUDA_VISIBLE_DEVICES", "0,1")],
            false,
            DriverProbe::Unavailable,
            ToolOutcome::NotFound,
        );
        assert!(h.prober.has_gpu());
        assert_eq!(h.prober.probe().strategy(), Some(Strategy::CudaEnv));
    }

    #[test]
    fn cuda_sentinel_falls_through_to_tool() {
        let h = harness(
            &[("CUDA_VISIBLE_DEVICES", "-1")],
            false,
            DriverProbe::Unavailable,
            ToolOutcome::Succeeded {
                stdout: "NVIDIA A100-SXM4-80GB".to_string(),
            },
        );

        assert_eq!(
            h.prober.probe(),
            Outcome::Available {
                strategy: Strategy::DiagnosticTool,
                detail: "NVIDIA A100-SXM4-80GB".to_string(),
            }
        );
        assert_eq!(h.driver_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn void_is_not_a_cuda_sentinel() {
        let h = harness(
            &[("CUDA_VISIBLE_DEVICES", "void")],
            false,
            DriverProbe::Unavailable,
            ToolOutcome::NotFound,
        );
        assert_eq!(h.prober.probe().strategy(), Some(Strategy::CudaEnv));
    }

    #[test]
    fn empty_values_do_not_count() {
        let h = harness(
            &[("NVIDIA_VISIBLE_DEVICES", ""), ("CUDA_VISIBLE_DEVICES", "")],
            false,
            DriverProbe::Unavailable,
            ToolOutcome::Failed { code: Some(1) },
        );
        assert!(!h.prober.has_gpu());
    }

    #[test]
    fn cdi_directory_alone_is_enough() {
        let h = harness(&[], true, DriverProbe::Unavailable, ToolOutcome::NotFound);

        assert_eq!(h.prober.probe().strategy(), Some(Strategy::Cdi));
        assert_eq!(h.driver_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn driver_with_devices_skips_tool() {
        let h = harness(
            &[],
            false,
            DriverProbe::Devices {
                library: "libcuda.so".to_string(),
                count: 2,
            },
            ToolOutcome::NotFound,
        );

        assert_eq!(
            h.prober.probe(),
            Outcome::Available {
                strategy: Strategy::Driver,
                detail: "2 device(s) via libcuda.so".to_string(),
            }
        );
        assert_eq!(h.tool_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zero_devices_continues_to_tool() {
        let h = harness(&[], false, no_devices(), ToolOutcome::Failed { code: Some(6) });

        assert_eq!(h.prober.probe(), Outcome::DriverNoDevices);
        assert_eq!(h.tool_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tool_can_rescue_zero_device_driver() {
        let h = harness(
            &[],
            false,
            no_devices(),
            ToolOutcome::Succeeded {
                stdout: "Tesla T4".to_string(),
            },
        );
        assert_eq!(h.prober.probe().strategy(), Some(Strategy::DiagnosticTool));
    }

    #[test]
    fn driver_error_is_reported() {
        let h = harness(
            &[],
            false,
            DriverProbe::InitFailed {
                library: "libcuda.so".to_string(),
                code: 100,
            },
            ToolOutcome::TimedOut,
        );
        assert_eq!(h.prober.probe(), Outcome::DriverError { code: 100 });
    }

    #[test]
    fn empty_tool_output_is_negative() {
        let h = harness(&[], false, DriverProbe::Unavailable, ToolOutcome::Empty);
        assert_eq!(h.prober.probe(), Outcome::NoDriver);
    }

    #[test]
    fn nothing_detected() {
        let h = harness(
            &[],
            false,
            DriverProbe::Unavailable,
            ToolOutcome::Failed { code: Some(1) },
        );

        assert!(!h.prober.has_gpu());
        assert_eq!(h.driver_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.tool_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn every_call_reruns_the_cascade() {
        let h = harness(&[], false, no_devices(), ToolOutcome::NotFound);

        h.prober.probe();
        h.prober.probe();
        assert_eq!(h.driver_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.tool_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn report_lists_set_diagnostic_variables() {
        let h = harness(
            &[
                ("NVIDIA_DRIVER_CAPABILITIES", "compute,utility"),
                ("RUNAI_NUM_OF_GPUS", "1"),
                ("HOME", "/root"),
            ],
            false,
            DriverProbe::Unavailable,
            ToolOutcome::NotFound,
        );

        let report = h.prober.report();
        assert_eq!(report.outcome, Outcome::NoDriver);
        assert_eq!(
            report.environment,
            BTreeMap::from([
                (
                    "NVIDIA_DRIVER_CAPABILITIES".to_string(),
                    "compute,utility".to_string()
                ),
                ("RUNAI_NUM_OF_GPUS".to_string(), "1".to_string()),
            ])
        );
        assert!(report.device_nodes.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn non_unicode_scheduler_variable_is_not_a_device() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let name = "GPU_PROBE_TEST_NON_UNICODE_SCHEDULER";
        std::env::set_var(name, OsStr::from_bytes(b"\xff"));

        let dir = tempfile::tempdir().unwrap();
        let config = ProbeConfig {
            scheduler_vars: vec![name.to_string()],
            cuda_vars: Vec::new(),
            cdi_dir: dir.path().join("cdi"),
            ..ProbeConfig::default()
        };
        let prober = GpuProber::new(config)
            .with_driver(FakeDriver {
                result: DriverProbe::Unavailable,
                calls: Arc::new(AtomicUsize::new(0)),
            })
            .with_tool(FakeTool {
                result: ToolOutcome::NotFound,
                calls: Arc::new(AtomicUsize::new(0)),
            });

        let outcome = prober.probe();
        std::env::remove_var(name);
        assert_eq!(outcome, Outcome::NoDriver);
    }

    #[test]
    fn report_lists_device_nodes() {
        let h = harness(&[], true, DriverProbe::Unavailable, ToolOutcome::NotFound);
        let node = h.dir.path().join("nvidia0");
        std::fs::write(&node, b"").unwrap();

        let report = h.prober.report();
        assert!(report.is_available());
        assert_eq!(report.device_nodes, vec![node]);
    }
}
