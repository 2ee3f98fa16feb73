use anyhow::Context;
use anyhow::Result;
use nvml_wrapper::Nvml;

/// One GPU as reported by NVML.
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceSummary {
    pub index: u32,
    pub uuid: String,
    pub name: String,
    pub total_memory_bytes: u64,
}

impl DeviceSummary {
    fn line(&self) -> String {
        format!(
            "GPU {}: {} ({}, {} MiB)",
            self.index,
            self.name,
            self.uuid,
            self.total_memory_bytes / (1024 * 1024)
        )
    }
}

pub fn run() -> Result<()> {
    let nvml = init_nvml()?;
    let devices = discover_devices(&nvml)?;

    if devices.is_empty() {
        println!("NVML reports no GPU devices");
    }
    for device in &devices {
        println!("{}", device.line());
    }
    Ok(())
}

fn init_nvml() -> Result<Nvml> {
    match Nvml::init() {
        Ok(nvml) => Ok(nvml),
        Err(e) => {
            tracing::debug!("standard NVML init failed ({e}), trying libnvidia-ml.so.1");
            Nvml::builder()
                .lib_path(std::ffi::OsStr::new("libnvidia-ml.so.1"))
                .init()
                .context("initialize NVML")
        }
    }
}

fn discover_devices(nvml: &Nvml) -> Result<Vec<DeviceSummary>> {
    let device_count = nvml.device_count().context("query NVML device count")?;
    tracing::debug!("NVML reports {device_count} device(s)");

    let mut devices = Vec::with_capacity(device_count as usize);
    for index in 0..device_count {
        let device = nvml
            .device_by_index(index)
            .with_context(|| format!("open GPU {index}"))?;
        devices.push(DeviceSummary {
            index,
            uuid: device.uuid().with_context(|| format!("read UUID of GPU {index}"))?,
            name: device.name().with_context(|| format!("read name of GPU {index}"))?,
            total_memory_bytes: device
                .memory_info()
                .with_context(|| format!("read memory of GPU {index}"))?
                .total,
        });
    }
    Ok(devices)
}
