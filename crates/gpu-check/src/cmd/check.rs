use std::process::ExitCode;

use anyhow::Context;
use anyhow::Result;
use gpu_probe::GpuProber;
use gpu_probe::ProbeConfig;
use gpu_probe::ProbeReport;

use crate::config::CheckArgs;

pub fn run(config: ProbeConfig, args: &CheckArgs) -> Result<ExitCode> {
    let prober = GpuProber::new(config);
    let report = prober.report();

    let output = if args.json {
        serde_json::to_string_pretty(&report).context("serialize probe report")?
    } else {
        summary(&report)
    };
    println!("{output}");

    Ok(exit_code(&report))
}

fn summary(report: &ProbeReport) -> String {
    if report.is_available() {
        format!("GPU {}", report.outcome)
    } else {
        format!("No GPU detected ({})", report.outcome)
    }
}

fn exit_code(report: &ProbeReport) -> ExitCode {
    if report.is_available() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
