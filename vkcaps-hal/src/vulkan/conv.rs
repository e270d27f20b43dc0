use ash::vk;

pub fn map_vk_driver_id(driver_id: vk::DriverId) -> vkt::DriverVendor {
    use vkt::DriverVendor as Dv;
    match driver_id {
        vk::DriverId::AMD_PROPRIETARY => Dv::AmdProprietary,
        vk::DriverId::AMD_OPEN_SOURCE => Dv::AmdOpenSource,
        vk::DriverId::MESA_RADV => Dv::MesaRadv,
        vk::DriverId::NVIDIA_PROPRIETARY => Dv::NvidiaProprietary,
        vk::DriverId::INTEL_PROPRIETARY_WINDOWS => Dv::IntelProprietaryWindows,
        vk::DriverId::INTEL_OPEN_SOURCE_MESA => Dv::IntelOpenSourceMesa,
        vk::DriverId::QUALCOMM_PROPRIETARY => Dv::QualcommProprietary,
        vk::DriverId::ARM_PROPRIETARY => Dv::ArmProprietary,
        vk::DriverId::GOOGLE_SWIFTSHADER => Dv::GoogleSwiftshader,
        vk::DriverId::MESA_LLVMPIPE => Dv::MesaLlvmpipe,
        vk::DriverId::MOLTENVK => Dv::MoltenVk,
        vk::DriverId::MESA_TURNIP => Dv::MesaTurnip,
        other => Dv::Other(other.as_raw()),
    }
}

pub fn map_vk_device_type(device_type: vk::PhysicalDeviceType) -> vkt::DeviceType {
    match device_type {
        vk::PhysicalDeviceType::OTHER => vkt::DeviceType::Other,
        vk::PhysicalDeviceType::INTEGRATED_GPU => vkt::DeviceType::IntegratedGpu,
        vk::PhysicalDeviceType::DISCRETE_GPU => vkt::DeviceType::DiscreteGpu,
        vk::PhysicalDeviceType::VIRTUAL_GPU => vkt::DeviceType::VirtualGpu,
        vk::PhysicalDeviceType::CPU => vkt::DeviceType::Cpu,
        _ => vkt::DeviceType::Other,
    }
}

/// The feature flags of `properties` that apply to `format_type`.
pub fn map_format_type(
    properties: &vk::FormatProperties,
    format_type: vkt::FormatType,
) -> vk::FormatFeatureFlags {
    match format_type {
        vkt::FormatType::Linear => properties.linear_tiling_features,
        vkt::FormatType::Optimal => properties.optimal_tiling_features,
        vkt::FormatType::Buffer => properties.buffer_features,
    }
}

pub fn map_bool(value: vk::Bool32) -> bool {
    value != vk::FALSE
}
