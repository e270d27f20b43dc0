use super::{
    adapter::{self, CapabilityReport, CapabilityState, FeatureChain, PropertyChain},
    format::FormatTable,
    inventory::{ExtensionSet, Inventory},
    memory::{self, HeapBudget, MemoryReport},
    queue::{self, QueueFamilies},
    quirks::{NvidiaArchitecture, Phase, QuirkContext, QuirkDatabase},
    validate, DeviceDescriptor, Workarounds,
};
use crate::{
    DeviceCreateDesc, DeviceError, FormatError, LogicalDevice as _, NegotiationError,
    PhysicalDevice,
};

use ash::vk;
use vkt::{Capabilities as Caps, DeviceType, DriverIdentity, FormatType};

use std::ffi::CStr;

const DEFAULT_SETS_PER_POOL: u32 = 64;

/// The negotiated capabilities of one physical device, and the logical device
/// created with them.
///
/// Nothing in here changes after [`Device::new`] returns.
pub struct Device<P: PhysicalDevice> {
    // Declared first, so it is destroyed before `physical`.
    logical: P::Device,
    physical: P,
    properties: vk::PhysicalDeviceProperties,
    driver: DriverIdentity,
    device_type: DeviceType,
    families: QueueFamilies,
    graphics_queue: vk::Queue,
    present_queue: Option<vk::Queue>,
    supported_extensions: ExtensionSet,
    enabled_extensions: Vec<&'static CStr>,
    enabled_features: FeatureChain,
    extended_properties: PropertyChain,
    report: CapabilityReport,
    capabilities: Caps,
    workarounds: Workarounds,
    formats: FormatTable,
    memory: MemoryReport,
    sets_per_pool: u32,
    guest_warp_stages: vk::ShaderStageFlags,
    is_warp_potentially_bigger: bool,
    nvidia_architecture: Option<NvidiaArchitecture>,
    has_renderdoc: bool,
    has_nsight_graphics: bool,
}

impl<P: PhysicalDevice> Device<P> {
    /// Negotiate the capabilities of `physical` and create its logical device.
    ///
    /// Any error rules out this physical device. Nothing is left behind, so the
    /// caller may go on with another one.
    ///
    /// A failed query of the attached tools is logged and reads as no tools attached.
    pub fn new(
        physical: P,
        desc: &DeviceDescriptor,
        quirks: &QuirkDatabase,
    ) -> Result<Self, NegotiationError> {
        profiling::scope!("Device::new");

        let inventory = Inventory::query(&physical)?;
        validate::validate(&physical, &inventory, desc.surface.is_some())?;
        let families =
            queue::select_families(&physical, &inventory.queue_families, desc.surface)?;
        let mut negotiated = adapter::negotiate(&physical, &inventory, quirks, desc);

        let queue_families = families.unique();
        let logical = unsafe {
            physical.create_device(DeviceCreateDesc {
                queue_families: &queue_families,
                extensions: &negotiated.extensions,
                features: &mut negotiated.features,
                diagnostics: negotiated.diagnostics,
            })
        }?;

        let is_integrated = inventory.is_integrated();
        let memory = if negotiated.capabilities().contains(Caps::MEMORY_BUDGET) {
            let mut budget = HeapBudget::default();
            let properties = physical.memory_properties(Some(&mut budget));
            memory::classify(&properties, Some(&budget), is_integrated)
        } else {
            memory::classify(&inventory.memory, None, is_integrated)
        };

        let context = QuirkContext {
            driver: &inventory.driver,
            extensions: &inventory.extensions,
            probed: negotiated.report.probed,
            architecture: negotiated.nvidia_architecture,
        };
        let refined = quirks.evaluate(Phase::Refine, &context, negotiated.capabilities());
        let capabilities = negotiated.capabilities() - refined.disabled;
        let sets_per_pool = refined
            .descriptor_sets_per_pool
            .map_or(DEFAULT_SETS_PER_POOL, |count| count.max(DEFAULT_SETS_PER_POOL));

        let mut has_renderdoc = false;
        let mut has_nsight_graphics = false;
        if capabilities.contains(Caps::TOOLING_INFO) {
            match physical.tool_names() {
                Ok(tools) => {
                    for name in tools {
                        log::info!("Attached debugging tool: {}", name);
                        has_renderdoc |= name == "RenderDoc";
                        has_nsight_graphics |= name == "NVIDIA Nsight Graphics";
                    }
                }
                Err(err) => log::warn!("Unable to query attached tools: {}", err),
            }
        }

        let graphics_queue = unsafe { logical.queue(families.graphics, 0) };
        let present_queue = families
            .present
            .map(|family| unsafe { logical.queue(family, 0) });

        let Inventory {
            properties,
            extensions,
            formats,
            driver,
            device_type,
            ..
        } = inventory;
        Ok(Self {
            logical,
            physical,
            properties,
            driver,
            device_type,
            families,
            graphics_queue,
            present_queue,
            supported_extensions: extensions,
            enabled_extensions: negotiated.extensions,
            enabled_features: negotiated.features,
            extended_properties: negotiated.properties,
            report: negotiated.report,
            capabilities,
            workarounds: negotiated.workarounds | refined.workarounds,
            formats,
            memory,
            sets_per_pool,
            guest_warp_stages: negotiated.guest_warp_stages,
            is_warp_potentially_bigger: negotiated.is_warp_potentially_bigger,
            nvidia_architecture: negotiated.nvidia_architecture,
            has_renderdoc,
            has_nsight_graphics,
        })
    }

    pub fn physical(&self) -> &P {
        &self.physical
    }

    pub fn logical(&self) -> &P::Device {
        &self.logical
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }

    pub fn api_version(&self) -> u32 {
        self.properties.api_version
    }

    pub fn driver(&self) -> &DriverIdentity {
        &self.driver
    }

    /// Short driver name for diagnostics, falling back to the name the driver reports.
    pub fn driver_name(&self) -> &str {
        self.driver.display_name()
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn is_integrated(&self) -> bool {
        self.device_type == DeviceType::IntegratedGpu
    }

    pub fn is_virtual(&self) -> bool {
        self.device_type == DeviceType::VirtualGpu
    }

    pub fn is_non_gpu(&self) -> bool {
        match self.device_type {
            DeviceType::Cpu | DeviceType::Other => true,
            _ => false,
        }
    }

    pub fn queue_families(&self) -> QueueFamilies {
        self.families
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Only set when the device was negotiated with a surface.
    pub fn present_queue(&self) -> Option<vk::Queue> {
        self.present_queue
    }

    pub fn supported_extensions(&self) -> &ExtensionSet {
        &self.supported_extensions
    }

    /// Extensions the logical device was created with.
    pub fn enabled_extensions(&self) -> &[&'static CStr] {
        &self.enabled_extensions
    }

    pub fn enabled_features(&self) -> &FeatureChain {
        &self.enabled_features
    }

    /// Capabilities the logical device was created with.
    pub fn negotiated_capabilities(&self) -> Caps {
        self.report.enabled
    }

    /// Capabilities the renderer may use.
    pub fn capabilities(&self) -> Caps {
        self.capabilities
    }

    pub fn supports(&self, capabilities: Caps) -> bool {
        self.capabilities.contains(capabilities)
    }

    pub fn capability_state(&self, capability: Caps) -> CapabilityState {
        match self.report.state(capability) {
            CapabilityState::Enabled if !self.capabilities.contains(capability) => {
                CapabilityState::Disabled
            }
            state => state,
        }
    }

    pub fn workarounds(&self) -> Workarounds {
        self.workarounds
    }

    pub fn is_format_supported(
        &self,
        format: vk::Format,
        usage: vk::FormatFeatureFlags,
        format_type: FormatType,
    ) -> bool {
        self.formats.is_supported(format, usage, format_type)
    }

    /// `format` if it supports `usage`, otherwise its closest supported alternative.
    pub fn supported_format(
        &self,
        format: vk::Format,
        usage: vk::FormatFeatureFlags,
        format_type: FormatType,
    ) -> Result<vk::Format, FormatError> {
        self.formats.resolve(format, usage, format_type)
    }

    pub fn formats(&self) -> &FormatTable {
        &self.formats
    }

    pub fn memory(&self) -> &MemoryReport {
        &self.memory
    }

    /// Bytes the renderer may allocate.
    pub fn device_access_memory(&self) -> u64 {
        self.memory.device_access_memory
    }

    /// Current usage of the tracked heaps, read live from the driver.
    ///
    /// Without a memory budget this is always 0. Values may change between calls.
    pub fn device_memory_usage(&self) -> u64 {
        if !self.capabilities.contains(Caps::MEMORY_BUDGET) {
            return 0;
        }
        let mut budget = HeapBudget::default();
        self.physical.memory_properties(Some(&mut budget));
        self.memory.usage(&budget)
    }

    pub fn float_controls(&self) -> Option<&vk::PhysicalDeviceFloatControlsProperties<'static>> {
        self.extended_properties.float_controls.as_ref()
    }

    pub fn max_push_descriptors(&self) -> u32 {
        match self.extended_properties.push_descriptor {
            Some(ref p) if self.supports(Caps::PUSH_DESCRIPTOR) => p.max_push_descriptors,
            _ => 0,
        }
    }

    pub fn sets_per_pool(&self) -> u32 {
        self.sets_per_pool
    }

    /// Check if `stage` can run with a subgroup size matching the guest warp.
    pub fn is_guest_warp_size_supported(&self, stage: vk::ShaderStageFlags) -> bool {
        self.guest_warp_stages.contains(stage)
    }

    pub fn is_warp_potentially_bigger(&self) -> bool {
        self.is_warp_potentially_bigger
    }

    pub fn nvidia_architecture(&self) -> Option<NvidiaArchitecture> {
        self.nvidia_architecture
    }

    pub fn is_float16_supported(&self) -> bool {
        self.supports(Caps::SHADER_FLOAT16)
    }

    pub fn is_int8_supported(&self) -> bool {
        self.supports(Caps::SHADER_INT8)
    }

    pub fn is_push_descriptor_supported(&self) -> bool {
        self.supports(Caps::PUSH_DESCRIPTOR)
    }

    pub fn is_blit_depth_stencil_supported(&self) -> bool {
        self.supports(Caps::BLIT_DEPTH_STENCIL)
    }

    pub fn is_optimal_astc_supported(&self) -> bool {
        self.supports(Caps::OPTIMAL_ASTC)
    }

    pub fn cant_blit_msaa(&self) -> bool {
        self.workarounds.contains(Workarounds::CANT_BLIT_MSAA)
    }

    pub fn has_broken_cube_image_compatibility(&self) -> bool {
        self.workarounds
            .contains(Workarounds::BROKEN_CUBE_IMAGE_COMPATIBILITY)
    }

    pub fn must_emulate_bgr565(&self) -> bool {
        self.workarounds.contains(Workarounds::MUST_EMULATE_BGR565)
    }

    pub fn has_renderdoc(&self) -> bool {
        self.has_renderdoc
    }

    pub fn has_nsight_graphics(&self) -> bool {
        self.has_nsight_graphics
    }

    pub fn has_debugging_tool_attached(&self) -> bool {
        self.has_renderdoc || self.has_nsight_graphics
    }

    /// Report a lost device. Diagnostics, if enabled, are dumped by the driver.
    pub fn report_loss(&self) {
        log::error!("Device loss occurred!");
    }
}

impl<P: PhysicalDevice> std::fmt::Debug for Device<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("driver", &self.driver)
            .field("families", &self.families)
            .field("capabilities", &self.capabilities)
            .field("workarounds", &self.workarounds)
            .finish_non_exhaustive()
    }
}

/// Negotiate the first suitable device among `candidates`, in order.
pub fn open_first_suitable<P, I>(
    candidates: I,
    desc: &DeviceDescriptor,
    quirks: &QuirkDatabase,
) -> Result<Device<P>, NegotiationError>
where
    P: PhysicalDevice,
    I: IntoIterator<Item = P>,
{
    let mut last_error = None;
    for (index, physical) in candidates.into_iter().enumerate() {
        match Device::new(physical, desc, quirks) {
            Ok(device) => return Ok(device),
            Err(err) => {
                log::warn!("Physical device {} is not suitable: {}", index, err);
                last_error = Some(err);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        log::error!("No physical device available");
        NegotiationError::Device(DeviceError::Unexpected(
            vk::Result::ERROR_INCOMPATIBLE_DRIVER,
        ))
    }))
}
