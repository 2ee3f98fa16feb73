//! Best-effort detection of a usable CUDA GPU.
//!
//! Works the same on bare metal, in containers with CDI device injection,
//! and under cluster schedulers that only announce devices through the
//! environment.
//!
//! ```no_run
//! if gpu_probe::has_gpu() {
//!     println!("training on GPU");
//! }
//! ```

pub mod config;
pub mod devices;
pub mod driver;
pub mod env;
pub mod outcome;
pub mod prober;
pub mod tool;

pub use config::ConfigError;
pub use config::ProbeConfig;
pub use driver::CudaDriver;
pub use driver::DriverProbe;
pub use driver::DynamicCudaDriver;
pub use env::EnvSource;
pub use env::HostEnv;
pub use outcome::Outcome;
pub use outcome::ProbeReport;
pub use outcome::Strategy;
pub use prober::GpuProber;
pub use tool::CommandTool;
pub use tool::DiagnosticTool;
pub use tool::ToolOutcome;

/// Whether a usable GPU is present on this host, using the default cascade.
pub fn has_gpu() -> bool {
    GpuProber::default().has_gpu()
}
