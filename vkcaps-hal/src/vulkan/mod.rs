/*!
# Vulkan capability negotiation

Negotiation runs once per physical device, in a fixed order:
inventory, validation, queue family selection, optional capability
negotiation, device creation, and post-creation refinement.
Its only product is the immutable [`Device`].

The `instance` module implements [`crate::PhysicalDevice`] on top of `ash`.
*/

mod adapter;
mod conv;
mod device;
mod format;
mod instance;
mod inventory;
mod memory;
mod queue;
mod quirks;
mod validate;

use ash::vk;

pub use adapter::{
    negotiate, optional_extension_names, CapabilityReport, CapabilityState, FeatureChain,
    Negotiated, PropertyChain,
};
pub use device::{open_first_suitable, Device};
pub use format::{alternatives, FormatTable, QUERIED_FORMATS};
pub use instance::{Instance, LogicalDevice, PhysicalDevice};
pub use inventory::{ExtensionSet, Inventory};
pub use memory::{classify, HeapBudget, MemoryReport};
pub use queue::{select_families, QueueFamilies};
pub use quirks::{
    Action, Condition, NvidiaArchitecture, Phase, QuirkContext, QuirkDatabase, QuirkOutcome,
    QuirkRule, VersionRange,
};
pub use validate::{required_extensions, validate};

/// Size of the guest GPU warp, which subgroup size control has to be able to match.
pub const GUEST_WARP_SIZE: u32 = 32;

/// Per physical device negotiation inputs.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceDescriptor {
    /// Surface the device has to present to. A present queue is only selected when set.
    pub surface: Option<vk::SurfaceKHR>,
    pub flags: vkt::DeviceFlags,
}

bitflags::bitflags!(
    /// Behavior changes that don't map onto a negotiated capability.
    #[derive(Default)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Workarounds: u32 {
        /// Multisampled images can't be the source or destination of a blit.
        const CANT_BLIT_MSAA = 0x1;
        /// Cube compatible images break sampling of unrelated views (GCN4 and older).
        const BROKEN_CUBE_IMAGE_COMPATIBILITY = 0x2;
        /// `B5G6R5_UNORM_PACK16` has to be emulated with a swizzle.
        const MUST_EMULATE_BGR565 = 0x4;
    }
);

impl From<vk::Result> for crate::DeviceError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
                Self::OutOfMemory
            }
            vk::Result::ERROR_DEVICE_LOST => Self::Lost,
            _ => {
                log::warn!("Unrecognized device error {:?}", result);
                Self::Unexpected(result)
            }
        }
    }
}
