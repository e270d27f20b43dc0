//! Table driven physical device, used for testing without a GPU.
//!
//! Every query answers from a public field, so a test can describe exactly the
//! device it needs. [`PhysicalDevice::new`] starts from a device that meets every
//! mandatory requirement at its minimum and supports no optional extension.

use crate::{
    auxil,
    vulkan::{optional_extension_names, required_extensions, QUERIED_FORMATS},
    DeviceCreateDesc, DeviceError, FeatureChain, HeapBudget, PropertyChain,
};

use ash::vk::{self, Handle as _};
use fxhash::FxHashMap;
use parking_lot::Mutex;
use vkt::Capabilities as Caps;

use std::ffi::{CStr, CString};

const GIB: u64 = 1 << 30;

fn full_format_features() -> vk::FormatFeatureFlags {
    vk::FormatFeatureFlags::SAMPLED_IMAGE
        | vk::FormatFeatureFlags::STORAGE_IMAGE
        | vk::FormatFeatureFlags::UNIFORM_TEXEL_BUFFER
        | vk::FormatFeatureFlags::STORAGE_TEXEL_BUFFER
        | vk::FormatFeatureFlags::VERTEX_BUFFER
        | vk::FormatFeatureFlags::COLOR_ATTACHMENT
        | vk::FormatFeatureFlags::COLOR_ATTACHMENT_BLEND
        | vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
        | vk::FormatFeatureFlags::BLIT_SRC
        | vk::FormatFeatureFlags::BLIT_DST
        | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
        | vk::FormatFeatureFlags::TRANSFER_SRC
        | vk::FormatFeatureFlags::TRANSFER_DST
}

/// Every format feature, in every tiling.
pub fn full_format_properties() -> vk::FormatProperties {
    vk::FormatProperties {
        linear_tiling_features: full_format_features(),
        optimal_tiling_features: full_format_features(),
        buffer_features: full_format_features(),
    }
}

/// A `vkCreateDevice` call, as the device received it.
#[derive(Clone, Debug)]
pub struct CreatedDevice {
    pub queue_families: Vec<u32>,
    pub extensions: Vec<CString>,
    pub features: FeatureChain,
    pub diagnostics: Option<vk::DeviceDiagnosticsConfigFlagsNV>,
}

pub struct PhysicalDevice {
    pub properties: vk::PhysicalDeviceProperties,
    pub extensions: Vec<&'static CStr>,
    /// Features reported as supported. Only members that are `Some` are reported.
    pub features: FeatureChain,
    pub extended_properties: PropertyChain,
    pub formats: FxHashMap<vk::Format, vk::FormatProperties>,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    /// Families able to present to any surface.
    pub present_families: Vec<u32>,
    pub memory: vk::PhysicalDeviceMemoryProperties,
    /// Live counters, readable from any thread.
    pub budget: Mutex<HeapBudget>,
    pub tools: Vec<String>,
    /// Returned by the next device creation instead of a device.
    pub creation_error: Option<DeviceError>,
    created: Mutex<Vec<CreatedDevice>>,
}

impl PhysicalDevice {
    pub fn new() -> Self {
        let limits = vk::PhysicalDeviceLimits {
            max_uniform_buffer_range: 65536,
            max_viewports: 16,
            max_color_attachments: 8,
            max_clip_distances: 8,
            ..Default::default()
        };
        let mut properties = vk::PhysicalDeviceProperties {
            api_version: vk::API_VERSION_1_3,
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            vendor_id: auxil::db::arm::VENDOR,
            limits,
            ..Default::default()
        };
        auxil::write_c_chars(&mut properties.device_name, "Table Device");

        let mut driver = vk::PhysicalDeviceDriverProperties::default()
            .driver_id(vk::DriverId::ARM_PROPRIETARY);
        auxil::write_c_chars(&mut driver.driver_name, "table");

        let extended_properties = PropertyChain {
            driver: Some(driver),
            float_controls: Some(Default::default()),
            subgroup_size_control: Some(
                vk::PhysicalDeviceSubgroupSizeControlProperties::default()
                    .min_subgroup_size(16)
                    .max_subgroup_size(32)
                    .required_subgroup_size_stages(vk::ShaderStageFlags::COMPUTE),
            ),
            transform_feedback: Some(
                vk::PhysicalDeviceTransformFeedbackPropertiesEXT::default()
                    .max_transform_feedback_streams(4)
                    .max_transform_feedback_buffers(4)
                    .transform_feedback_queries(true)
                    .transform_feedback_draw(true),
            ),
            push_descriptor: Some(
                vk::PhysicalDevicePushDescriptorPropertiesKHR::default().max_push_descriptors(32),
            ),
            fragment_shading_rate: Some(Default::default()),
        };

        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_heap_count: 2,
            ..Default::default()
        };
        memory.memory_heaps[0] = vk::MemoryHeap {
            size: 4 * GIB,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        memory.memory_heaps[1] = vk::MemoryHeap {
            size: 8 * GIB,
            flags: vk::MemoryHeapFlags::empty(),
        };

        let mut budget = HeapBudget::default();
        for (limit, heap) in budget.heap_budget.iter_mut().zip(&memory.memory_heaps) {
            *limit = heap.size;
        }

        Self {
            properties,
            extensions: required_extensions(vk::API_VERSION_1_3, true),
            features: FeatureChain::for_device_creation(Caps::empty()),
            extended_properties,
            formats: QUERIED_FORMATS
                .iter()
                .map(|&format| (format, full_format_properties()))
                .collect(),
            queue_families: vec![vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::GRAPHICS
                    | vk::QueueFlags::COMPUTE
                    | vk::QueueFlags::TRANSFER,
                queue_count: 1,
                ..Default::default()
            }],
            present_families: vec![0],
            memory,
            budget: Mutex::new(budget),
            tools: Vec::new(),
            creation_error: None,
            created: Mutex::new(Vec::new()),
        }
    }

    /// Report every optional extension, with all of their features.
    pub fn with_all_optional(mut self) -> Self {
        for name in optional_extension_names() {
            if !self.extensions.contains(&name) {
                self.extensions.push(name);
            }
        }
        self.features = FeatureChain::for_device_creation(Caps::all());
        self
    }

    pub fn with_driver(mut self, driver_id: vk::DriverId, raw_version: u32) -> Self {
        if let Some(ref mut driver) = self.extended_properties.driver {
            driver.driver_id = driver_id;
        }
        self.properties.driver_version = raw_version;
        self
    }

    pub fn with_device_type(mut self, device_type: vk::PhysicalDeviceType) -> Self {
        self.properties.device_type = device_type;
        self
    }

    pub fn add_extension(&mut self, name: &'static CStr) {
        if !self.extensions.contains(&name) {
            self.extensions.push(name);
        }
    }

    pub fn remove_extension(&mut self, name: &CStr) {
        self.extensions.retain(|&ext| ext != name);
    }

    /// Every successful device creation so far.
    pub fn created(&self) -> Vec<CreatedDevice> {
        self.created.lock().clone()
    }
}

impl Default for PhysicalDevice {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Device {
    queue_families: Vec<u32>,
}

impl crate::LogicalDevice for Device {
    unsafe fn queue(&self, family_index: u32, queue_index: u32) -> vk::Queue {
        debug_assert!(
            self.queue_families.contains(&family_index) && queue_index == 0,
            "queue {} of family {} was never requested",
            queue_index,
            family_index
        );
        vk::Queue::from_raw(u64::from(family_index) + 1)
    }
}

impl crate::PhysicalDevice for PhysicalDevice {
    type Device = Device;

    fn properties(&self) -> vk::PhysicalDeviceProperties {
        self.properties
    }

    fn extension_names(&self) -> Result<Vec<CString>, DeviceError> {
        Ok(self.extensions.iter().map(|&name| name.to_owned()).collect())
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        self.formats.get(&format).copied().unwrap_or_default()
    }

    fn queue_family_properties(&self) -> Vec<vk::QueueFamilyProperties> {
        self.queue_families.clone()
    }

    fn surface_support(
        &self,
        family_index: u32,
        _surface: vk::SurfaceKHR,
    ) -> Result<bool, DeviceError> {
        Ok(self.present_families.contains(&family_index))
    }

    fn features(&self, chain: &mut FeatureChain) {
        chain.fill_from(&self.features);
    }

    fn extended_properties(&self, chain: &mut PropertyChain) {
        chain.fill_from(&self.extended_properties);
    }

    fn memory_properties(
        &self,
        budget: Option<&mut HeapBudget>,
    ) -> vk::PhysicalDeviceMemoryProperties {
        if let Some(budget) = budget {
            *budget = *self.budget.lock();
        }
        self.memory
    }

    fn tool_names(&self) -> Result<Vec<String>, DeviceError> {
        Ok(self.tools.clone())
    }

    unsafe fn create_device(&self, desc: DeviceCreateDesc<'_>) -> Result<Device, DeviceError> {
        if let Some(ref error) = self.creation_error {
            return Err(error.clone());
        }
        if let Some(missing) = desc
            .extensions
            .iter()
            .find(|&&name| !self.extensions.contains(&name))
        {
            log::error!("Unsupported extension requested: {:?}", missing);
            return Err(DeviceError::Unexpected(
                vk::Result::ERROR_EXTENSION_NOT_PRESENT,
            ));
        }
        self.created.lock().push(CreatedDevice {
            queue_families: desc.queue_families.to_vec(),
            extensions: desc.extensions.iter().map(|&name| name.to_owned()).collect(),
            features: desc.features.clone(),
            diagnostics: desc.diagnostics,
        });
        Ok(Device {
            queue_families: desc.queue_families.to_vec(),
        })
    }
}
