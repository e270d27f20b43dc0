//! Test harness shared by every integration test.

use ash::vk::{self, Handle as _};
use vkcaps_hal::{
    empty, vulkan::QuirkContext, Device, DeviceDescriptor, QuirkDatabase,
};

pub type TestDevice = Device<empty::PhysicalDevice>;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A surface handle the table backend accepts. Its families decide presentation.
pub fn surface() -> vk::SurfaceKHR {
    vk::SurfaceKHR::from_raw(0x5face)
}

/// Mesa style packing, also used by the AMD drivers.
pub fn standard_version(major: u32, minor: u32, patch: u32) -> u32 {
    vk::make_api_version(0, major, minor, patch)
}

pub fn nvidia_version(major: u32, minor: u32) -> u32 {
    (major << 22) | (minor << 14)
}

/// Parameters of a single negotiation.
pub struct TestParameters {
    pub desc: DeviceDescriptor,
    pub quirks: QuirkDatabase,
}

impl Default for TestParameters {
    fn default() -> Self {
        Self {
            desc: DeviceDescriptor::default(),
            quirks: QuirkDatabase::builtin(),
        }
    }
}

impl TestParameters {
    pub fn surface(mut self) -> Self {
        self.desc.surface = Some(surface());
        self
    }

    pub fn flags(mut self, flags: vkt::DeviceFlags) -> Self {
        self.desc.flags |= flags;
        self
    }

    pub fn quirks(mut self, quirks: QuirkDatabase) -> Self {
        self.quirks = quirks;
        self
    }
}

pub fn open(
    physical: empty::PhysicalDevice,
    parameters: TestParameters,
) -> Result<TestDevice, vkcaps_hal::NegotiationError> {
    init_logger();
    Device::new(physical, &parameters.desc, &parameters.quirks)
}

/// Negotiate a device that is expected to be suitable.
pub fn open_valid(physical: empty::PhysicalDevice, parameters: TestParameters) -> TestDevice {
    match open(physical, parameters) {
        Ok(device) => device,
        Err(err) => panic!("device should be suitable: {}", err),
    }
}

/// Names of the rules of `phase` that fire for the negotiated `device`.
pub fn applied_rules(
    device: &TestDevice,
    quirks: &QuirkDatabase,
    phase: vkcaps_hal::vulkan::Phase,
    probed: vkt::Capabilities,
) -> Vec<&'static str> {
    let context = QuirkContext {
        driver: device.driver(),
        extensions: device.supported_extensions(),
        probed,
        architecture: device.nvidia_architecture(),
    };
    quirks.evaluate(phase, &context, probed).applied
}
