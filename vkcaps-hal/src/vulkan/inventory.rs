use super::{adapter::PropertyChain, conv, format::FormatTable};
use crate::{auxil, DeviceError};

use ash::{khr, vk};
use fxhash::FxHashSet;

use std::ffi::{CStr, CString};

/// Names of the extensions a physical device supports.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtensionSet(FxHashSet<CString>);

impl ExtensionSet {
    pub fn contains(&self, name: &CStr) -> bool {
        self.0.contains(name)
    }

    pub fn insert(&mut self, name: &CStr) -> bool {
        self.0.insert(name.to_owned())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<CString> for ExtensionSet {
    fn from_iter<I: IntoIterator<Item = CString>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Everything a physical device reports statically. Gathering it makes no decision.
#[derive(Clone, Debug)]
pub struct Inventory {
    pub properties: vk::PhysicalDeviceProperties,
    pub extensions: ExtensionSet,
    pub formats: FormatTable,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub memory: vk::PhysicalDeviceMemoryProperties,
    pub driver: vkt::DriverIdentity,
    pub device_type: vkt::DeviceType,
}

impl Inventory {
    pub fn query<P: crate::PhysicalDevice>(phd: &P) -> Result<Self, DeviceError> {
        profiling::scope!("Inventory::query");
        let properties = phd.properties();
        let extensions = phd.extension_names()?.into_iter().collect::<ExtensionSet>();

        let driver = query_driver(phd, &properties, &extensions);

        let name = auxil::cstr_from_bytes_until_nul(&properties.device_name)
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        log::info!(
            "Physical device {:?} by {}, driver {} {}, {} extensions",
            name,
            auxil::db::vendor_name(properties.vendor_id),
            driver.display_name(),
            driver.version(),
            extensions.len()
        );

        Ok(Self {
            properties,
            extensions,
            formats: FormatTable::query(phd),
            queue_families: phd.queue_family_properties(),
            memory: phd.memory_properties(None),
            device_type: conv::map_vk_device_type(properties.device_type),
            driver,
        })
    }

    pub fn api_version(&self) -> u32 {
        self.properties.api_version
    }

    pub fn supports_extension(&self, name: &CStr) -> bool {
        self.extensions.contains(name)
    }

    pub fn is_integrated(&self) -> bool {
        self.device_type == vkt::DeviceType::IntegratedGpu
    }
}

fn query_driver<P: crate::PhysicalDevice>(
    phd: &P,
    properties: &vk::PhysicalDeviceProperties,
    extensions: &ExtensionSet,
) -> vkt::DriverIdentity {
    let mut chain = PropertyChain::default();
    if properties.api_version >= vk::API_VERSION_1_2
        || extensions.contains(khr::driver_properties::NAME)
    {
        chain.driver = Some(Default::default());
        phd.extended_properties(&mut chain);
    }
    match chain.driver {
        Some(ref driver) => vkt::DriverIdentity {
            vendor: conv::map_vk_driver_id(driver.driver_id),
            raw_version: properties.driver_version,
            name: auxil::cstr_from_bytes_until_nul(&driver.driver_name)
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        },
        None => vkt::DriverIdentity {
            vendor: vkt::DriverVendor::Unknown,
            raw_version: properties.driver_version,
            name: String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_set_lookup() {
        let set = [khr::swapchain::NAME, khr::driver_properties::NAME]
            .iter()
            .map(|&name| name.to_owned())
            .collect::<ExtensionSet>();
        assert_eq!(set.len(), 2);
        assert!(set.contains(khr::swapchain::NAME));
        assert!(!set.contains(khr::push_descriptor::NAME));
    }
}
