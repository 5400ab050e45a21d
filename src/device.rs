use candle_core::{Device, DeviceLocation};

/// Returns cuda device `index` if it exists, otherwise the cpu.
pub fn try_gpu(index: usize) -> Device {
    match Device::new_cuda(index) {
        Ok(device) => device,
        Err(error) => {
            tracing::debug!("cuda:{index} unavailable ({error}), using cpu");
            Device::Cpu
        }
    }
}

/// Returns all cuda devices, or the cpu if there are none.
pub fn try_all_gpus() -> Vec<Device> {
    let devices: Vec<_> = (0..)
        .map_while(|index| Device::new_cuda(index).ok())
        .collect();
    if devices.is_empty() {
        vec![Device::Cpu]
    } else {
        devices
    }
}

/// The name of the device, ie "cpu" or "cuda:0".
pub fn device_name(device: &Device) -> String {
    match device.location() {
        DeviceLocation::Cpu => "cpu".to_string(),
        DeviceLocation::Cuda { gpu_id } => format!("cuda:{gpu_id}"),
        DeviceLocation::Metal { gpu_id } => format!("metal:{gpu_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_name() {
        assert_eq!(device_name(&Device::Cpu), "cpu");
    }

    #[test]
    fn all_gpus_not_empty() {
        let devices = try_all_gpus();
        assert!(!devices.is_empty());
        if !cfg!(feature = "cuda") {
            assert!(matches!(devices[0], Device::Cpu));
        }
    }

    #[test]
    fn missing_gpu_falls_back_to_cpu() {
        assert!(matches!(try_gpu(1024), Device::Cpu));
    }
}
