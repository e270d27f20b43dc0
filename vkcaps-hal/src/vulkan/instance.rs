use super::{FeatureChain, HeapBudget, PropertyChain};
use crate::{auxil, DeviceCreateDesc, DeviceError};

use ash::{ext, khr, vk};

use std::{
    ffi::{CStr, CString},
    sync::Arc,
};

pub struct InstanceShared {
    entry: ash::Entry,
    raw: ash::Instance,
    api_version: u32,
    surface: Option<khr::surface::Instance>,
    tooling_info: ext::tooling_info::Instance,
    /// Destroy `raw` when the last reference goes away.
    owned: bool,
}

impl Drop for InstanceShared {
    fn drop(&mut self) {
        if self.owned {
            unsafe { self.raw.destroy_instance(None) };
        }
    }
}

/// A Vulkan instance created by the embedder.
#[derive(Clone)]
pub struct Instance {
    shared: Arc<InstanceShared>,
}

impl Instance {
    /// # Safety
    ///
    /// - `raw_instance` must be created from `entry`, with `api_version` 1.1 or newer.
    /// - `VK_KHR_surface` must be enabled on `raw_instance` if `has_surface` is set.
    /// - If `owned` is set, nothing else may destroy `raw_instance`.
    pub unsafe fn from_raw(
        entry: ash::Entry,
        raw_instance: ash::Instance,
        api_version: u32,
        has_surface: bool,
        owned: bool,
    ) -> Self {
        log::debug!("Instance version: 0x{:x}", api_version);
        let surface = if has_surface {
            Some(khr::surface::Instance::new(&entry, &raw_instance))
        } else {
            None
        };
        let tooling_info = ext::tooling_info::Instance::new(&entry, &raw_instance);
        Self {
            shared: Arc::new(InstanceShared {
                entry,
                raw: raw_instance,
                api_version,
                surface,
                tooling_info,
                owned,
            }),
        }
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.shared.entry
    }

    pub fn raw_instance(&self) -> &ash::Instance {
        &self.shared.raw
    }

    pub fn api_version(&self) -> u32 {
        self.shared.api_version
    }

    pub fn enumerate_physical_devices(&self) -> Result<Vec<PhysicalDevice>, DeviceError> {
        profiling::scope!("vkEnumeratePhysicalDevices");
        let raw_devices = unsafe { self.shared.raw.enumerate_physical_devices() }?;
        Ok(raw_devices
            .into_iter()
            .map(|raw| PhysicalDevice {
                raw,
                instance: Arc::clone(&self.shared),
            })
            .collect())
    }
}

/// A physical device of an [`Instance`].
pub struct PhysicalDevice {
    raw: vk::PhysicalDevice,
    instance: Arc<InstanceShared>,
}

impl PhysicalDevice {
    pub fn raw_physical_device(&self) -> vk::PhysicalDevice {
        self.raw
    }
}

/// A logical device, destroyed on drop.
pub struct LogicalDevice {
    raw: ash::Device,
    _instance: Arc<InstanceShared>,
}

impl LogicalDevice {
    pub fn raw_device(&self) -> &ash::Device {
        &self.raw
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe { self.raw.destroy_device(None) };
    }
}

impl crate::LogicalDevice for LogicalDevice {
    unsafe fn queue(&self, family_index: u32, queue_index: u32) -> vk::Queue {
        unsafe { self.raw.get_device_queue(family_index, queue_index) }
    }
}

impl crate::PhysicalDevice for PhysicalDevice {
    type Device = LogicalDevice;

    fn properties(&self) -> vk::PhysicalDeviceProperties {
        unsafe { self.instance.raw.get_physical_device_properties(self.raw) }
    }

    fn extension_names(&self) -> Result<Vec<CString>, DeviceError> {
        let properties = {
            profiling::scope!("vkEnumerateDeviceExtensionProperties");
            unsafe {
                self.instance
                    .raw
                    .enumerate_device_extension_properties(self.raw)
            }?
        };
        Ok(properties
            .iter()
            .filter_map(|ext| auxil::cstr_from_bytes_until_nul(&ext.extension_name))
            .map(CStr::to_owned)
            .collect())
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .raw
                .get_physical_device_format_properties(self.raw, format)
        }
    }

    fn queue_family_properties(&self) -> Vec<vk::QueueFamilyProperties> {
        unsafe {
            self.instance
                .raw
                .get_physical_device_queue_family_properties(self.raw)
        }
    }

    fn surface_support(
        &self,
        family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> Result<bool, DeviceError> {
        match self.instance.surface {
            Some(ref functor) => Ok(unsafe {
                functor.get_physical_device_surface_support(self.raw, family_index, surface)
            }?),
            None => {
                log::warn!("Surface support queried without VK_KHR_surface");
                Ok(false)
            }
        }
    }

    fn features(&self, chain: &mut FeatureChain) {
        profiling::scope!("vkGetPhysicalDeviceFeatures2");
        let core = {
            let mut features2 = chain.add_to_features2(vk::PhysicalDeviceFeatures2::default());
            unsafe {
                self.instance
                    .raw
                    .get_physical_device_features2(self.raw, &mut features2)
            };
            features2.features
        };
        chain.core = core;
        chain.detach();
    }

    fn extended_properties(&self, chain: &mut PropertyChain) {
        profiling::scope!("vkGetPhysicalDeviceProperties2");
        {
            let mut properties2 =
                chain.add_to_properties2(vk::PhysicalDeviceProperties2::default());
            unsafe {
                self.instance
                    .raw
                    .get_physical_device_properties2(self.raw, &mut properties2)
            };
        }
        chain.detach();
    }

    fn memory_properties(
        &self,
        budget: Option<&mut HeapBudget>,
    ) -> vk::PhysicalDeviceMemoryProperties {
        let budget = match budget {
            Some(budget) => budget,
            None => {
                return unsafe {
                    self.instance
                        .raw
                        .get_physical_device_memory_properties(self.raw)
                }
            }
        };
        let mut budget_properties = vk::PhysicalDeviceMemoryBudgetPropertiesEXT::default();
        let memory = {
            let mut properties2 =
                vk::PhysicalDeviceMemoryProperties2::default().push_next(&mut budget_properties);
            unsafe {
                self.instance
                    .raw
                    .get_physical_device_memory_properties2(self.raw, &mut properties2)
            };
            properties2.memory_properties
        };
        *budget = HeapBudget::from(&budget_properties);
        memory
    }

    fn tool_names(&self) -> Result<Vec<String>, DeviceError> {
        profiling::scope!("vkGetPhysicalDeviceToolProperties");
        let tooling_info = &self.instance.tooling_info;
        let tools = unsafe { tooling_info.get_physical_device_tool_properties(self.raw) }?;
        Ok(tools
            .iter()
            .filter_map(|tool| auxil::cstr_from_bytes_until_nul(&tool.name))
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    unsafe fn create_device(&self, desc: DeviceCreateDesc<'_>) -> Result<LogicalDevice, DeviceError> {
        let priorities = [1.0f32];
        let queue_infos = desc
            .queue_families
            .iter()
            .map(|&family_index| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family_index)
                    .queue_priorities(&priorities)
            })
            .collect::<Vec<_>>();
        let extension_names = desc
            .extensions
            .iter()
            .map(|name| name.as_ptr())
            .collect::<Vec<_>>();
        let mut diagnostics_info = desc
            .diagnostics
            .map(|flags| vk::DeviceDiagnosticsConfigCreateInfoNV::default().flags(flags));

        let raw = {
            let mut info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_infos)
                .enabled_extension_names(&extension_names);
            info = desc.features.add_to_device_create_info(info);
            if let Some(ref mut diagnostics_info) = diagnostics_info {
                info = info.push_next(diagnostics_info);
            }
            profiling::scope!("vkCreateDevice");
            unsafe { self.instance.raw.create_device(self.raw, &info, None) }?
        };
        desc.features.detach();

        Ok(LogicalDevice {
            raw,
            _instance: Arc::clone(&self.instance),
        })
    }
}
