use std::collections::BTreeMap;

use gpu_probe::GpuProber;
use gpu_probe::ProbeConfig;

pub fn run(config: ProbeConfig) {
    for line in lines(&GpuProber::new(config).environment()) {
        println!("{line}");
    }
}

fn lines(environment: &BTreeMap<String, String>) -> Vec<String> {
    if environment.is_empty() {
        return vec!["No GPU-related environment variables set".to_string()];
    }

    std::iter::once("Environment variables:".to_string())
        .chain(
            environment
                .iter()
                .map(|(name, value)| format!("  {name}={value}")),
        )
        .collect()
}
