/*! This library describes the vocabulary shared between the Vulkan capability
 *  negotiation engine and the renderer that consumes its result.
 *  It is agnostic of the native API binding:
 *  - Optional capabilities are a bit set, never a struct of booleans.
 *  - Driver versions are decoded per vendor before being compared.
 *  - Configuration is plain data, read once at negotiation time.
 */

#![allow(
    // We don't use syntax sugar where it's not necessary.
    clippy::match_like_matches_macro,
)]
#![warn(missing_docs, unsafe_op_in_unsafe_fn)]

use std::fmt;

bitflags::bitflags! {
    /// Optional capabilities a host device may or may not end up exposing.
    ///
    /// Every member is decided during negotiation: either its extension is absent,
    /// its probe failed, a quirk vetoed it, or it is enabled. Nothing outside the
    /// negotiation engine ever sets a bit.
    #[repr(transparent)]
    #[derive(Default)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Capabilities: u64 {
        //
        // ---- Extension backed, feature probed ----
        //

        /// 16-bit floats in shader arithmetic (`shaderFloat16`).
        const SHADER_FLOAT16 = 1 << 0;
        /// 8-bit integers in shader arithmetic (`shaderInt8`).
        const SHADER_INT8 = 1 << 1;
        /// Pipelines may request an exact subgroup size matching the guest warp.
        const SUBGROUP_SIZE_CONTROL = 1 << 2;
        /// Last-vertex provoking convention, preserved through transform feedback.
        const PROVOKING_VERTEX = 1 << 3;
        /// Vertex input bindings and attributes as dynamic state.
        const VERTEX_INPUT_DYNAMIC_STATE = 1 << 4;
        /// 64-bit integer atomics on buffers and shared memory.
        const SHADER_ATOMIC_INT64 = 1 << 5;
        /// Transform feedback with at least four geometry streams.
        const TRANSFORM_FEEDBACK = 1 << 6;
        /// Custom border colors, including ones without a format.
        const CUSTOM_BORDER_COLOR = 1 << 7;
        /// Cull mode, front face, topology and friends as dynamic state.
        const EXTENDED_DYNAMIC_STATE = 1 << 8;
        /// Rectangular and smooth line rasterization.
        const LINE_RASTERIZATION = 1 << 9;
        /// Explicit workgroup memory layouts, with 8/16-bit and scalar access.
        const WORKGROUP_MEMORY_EXPLICIT_LAYOUT = 1 << 10;
        /// Pipeline executable statistics, used for shader feedback.
        const PIPELINE_EXECUTABLE_PROPERTIES = 1 << 11;
        /// Primitive restart for list topologies.
        const TOPOLOGY_LIST_RESTART = 1 << 12;
        /// Primitive restart for patch lists.
        const PATCH_LIST_RESTART = 1 << 13;
        /// 8-bit index buffers.
        const INDEX_TYPE_UINT8 = 1 << 14;
        /// Standard (std430-like) layout for uniform buffers.
        const UNIFORM_BUFFER_STANDARD_LAYOUT = 1 << 15;
        /// Push descriptors, with a non-zero descriptor budget.
        const PUSH_DESCRIPTOR = 1 << 16;

        //
        // ---- Extension backed, presence only ----
        //

        /// Per-viewport component swizzles.
        const VIEWPORT_SWIZZLE = 1 << 20;
        /// Viewport masks written from vertex processing stages.
        const VIEWPORT_MASK = 1 << 21;
        /// Pass-through geometry shaders.
        const GEOMETRY_SHADER_PASSTHROUGH = 1 << 22;
        /// SPIR-V 1.4 modules.
        const SPIRV_1_4 = 1 << 23;
        /// Depth values outside of the 0-1 range.
        const DEPTH_RANGE_UNRESTRICTED = 1 << 24;
        /// Min/max sampler reduction modes.
        const SAMPLER_FILTER_MINMAX = 1 << 25;
        /// Viewport index and layer written from vertex processing stages.
        const SHADER_VIEWPORT_INDEX_LAYER = 1 << 26;
        /// Enumeration of attached debugging tools.
        const TOOLING_INFO = 1 << 27;
        /// Stencil export from fragment shaders.
        const SHADER_STENCIL_EXPORT = 1 << 28;
        /// Conservative rasterization.
        const CONSERVATIVE_RASTERIZATION = 1 << 29;
        /// Live per-heap budget and usage counters.
        const MEMORY_BUDGET = 1 << 30;
        /// Vendor crash diagnostics. Only negotiated when configured.
        const DEVICE_DIAGNOSTICS_CONFIG = 1 << 31;
        /// Swapchains whose images may be viewed with a different format.
        /// Needs both the mutable format and the image format list extensions.
        const SWAPCHAIN_MUTABLE_FORMAT = 1 << 32;

        //
        // ---- Core features and format derived ----
        //

        /// Depth bounds testing.
        const DEPTH_BOUNDS = 1 << 40;
        /// Storage image reads without a declared format.
        const FORMATLESS_IMAGE_LOAD = 1 << 41;
        /// 64-bit floats in shaders.
        const SHADER_FLOAT64 = 1 << 42;
        /// 64-bit integers in shaders.
        const SHADER_INT64 = 1 << 43;
        /// 16-bit integers in shaders.
        const SHADER_INT16 = 1 << 44;
        /// Multisampled storage images.
        const SHADER_STORAGE_IMAGE_MULTISAMPLE = 1 << 45;
        /// Blits between packed depth/stencil images.
        const BLIT_DEPTH_STENCIL = 1 << 46;
        /// Native ASTC sampling, blitting and transfers with optimal tiling.
        const OPTIMAL_ASTC = 1 << 47;
        /// `D24_UNORM_S8_UINT` as a depth/stencil attachment.
        const DEPTH24_ATTACHMENT = 1 << 48;
    }
}

impl Capabilities {
    /// Capabilities that are backed by a device extension.
    pub const fn extension_backed() -> Self {
        Self::from_bits_truncate((1 << 33) - 1)
    }

    /// Capabilities derived from core features and the format table.
    pub const fn core_derived() -> Self {
        Self::from_bits_truncate(!((1 << 40) - 1))
    }
}

bitflags::bitflags! {
    /// Switches gating optional, expensive diagnostics capabilities.
    ///
    /// These are read once, when a device is negotiated.
    #[repr(transparent)]
    #[derive(Default)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct DeviceFlags: u32 {
        /// Negotiate vendor crash diagnostics (`VK_NV_device_diagnostics_config`),
        /// creating the device with shader debug info, resource tracking and
        /// automatic checkpoints.
        const DEVICE_DIAGNOSTICS = 1 << 0;
        /// Negotiate pipeline executable properties, used to report shader statistics.
        const SHADER_FEEDBACK = 1 << 1;
    }
}

impl DeviceFlags {
    /// Overlay the environment switches on top of `self`.
    ///
    /// - `VKCAPS_DEVICE_FLAGS`: comma separated flag names, replaces `self` when set.
    /// - `VKCAPS_DEVICE_DIAGNOSTICS`: `1` sets, `0` clears [`Self::DEVICE_DIAGNOSTICS`].
    /// - `VKCAPS_SHADER_FEEDBACK`: `1` sets, `0` clears [`Self::SHADER_FEEDBACK`].
    #[must_use]
    pub fn with_env(mut self) -> Self {
        if let Some(flags) = device_flags_from_env() {
            self = flags;
        }
        if let Some(bit) = env_bool("VKCAPS_DEVICE_DIAGNOSTICS") {
            self.set(Self::DEVICE_DIAGNOSTICS, bit);
        }
        if let Some(bit) = env_bool("VKCAPS_SHADER_FEEDBACK") {
            self.set(Self::SHADER_FEEDBACK, bit);
        }
        self
    }
}

/// Parse a comma separated list of device flag names.
///
/// `none` clears the flags named before it. Unknown names are logged and skipped.
pub fn parse_device_flags_from_comma_list(string: &str) -> DeviceFlags {
    let mut flags = DeviceFlags::empty();
    for name in string.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        flags |= match name.to_lowercase().as_str() {
            "diagnostics" | "device_diagnostics" | "aftermath" => DeviceFlags::DEVICE_DIAGNOSTICS,
            "feedback" | "shader_feedback" => DeviceFlags::SHADER_FEEDBACK,
            "all" => DeviceFlags::all(),
            // Clears everything named before it
            "none" => {
                flags = DeviceFlags::empty();
                continue;
            }
            other => {
                log::warn!("Unknown device flag: {}", other);
                continue;
            }
        };
    }
    flags
}

/// Get a set of device flags from the environment variable `VKCAPS_DEVICE_FLAGS`.
pub fn device_flags_from_env() -> Option<DeviceFlags> {
    std::env::var("VKCAPS_DEVICE_FLAGS")
        .as_deref()
        .ok()
        .map(parse_device_flags_from_comma_list)
}

fn env_bool(key: &str) -> Option<bool> {
    match std::env::var(key).as_deref().map(str::trim) {
        Ok("1") | Ok("true") => Some(true),
        Ok("0") | Ok("false") => Some(false),
        _ => None,
    }
}

/// Supported physical device types.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DeviceType {
    /// Other or Unknown.
    Other,
    /// Integrated GPU with shared CPU/GPU memory.
    IntegratedGpu,
    /// Discrete GPU with separate CPU/GPU memory.
    DiscreteGpu,
    /// Virtual / Hosted.
    VirtualGpu,
    /// Cpu / Software Rendering.
    Cpu,
}

/// Which set of format feature flags a query is made against.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FormatType {
    /// Images with linear tiling.
    Linear,
    /// Images with optimal tiling.
    Optimal,
    /// Texel buffers and vertex buffers.
    Buffer,
}

/// The driver behind a physical device.
///
/// This identifies the driver, not the hardware vendor: the same GPU may be driven
/// by a proprietary and an open source driver with unrelated bugs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DriverVendor {
    /// AMD proprietary driver.
    AmdProprietary,
    /// AMD open source driver (AMDVLK).
    AmdOpenSource,
    /// Mesa RADV.
    MesaRadv,
    /// NVIDIA proprietary driver.
    NvidiaProprietary,
    /// Intel proprietary Windows driver.
    IntelProprietaryWindows,
    /// Intel open source Mesa driver (ANV).
    IntelOpenSourceMesa,
    /// Qualcomm proprietary driver.
    QualcommProprietary,
    /// Arm proprietary driver.
    ArmProprietary,
    /// Google SwiftShader.
    GoogleSwiftshader,
    /// Mesa llvmpipe (lavapipe).
    MesaLlvmpipe,
    /// MoltenVK.
    MoltenVk,
    /// Mesa Turnip.
    MesaTurnip,
    /// Any other driver, by its raw driver id.
    Other(i32),
    /// The driver did not report an identity.
    Unknown,
}

impl DriverVendor {
    /// Short display name used in diagnostics, for the drivers that have one.
    pub fn short_name(self) -> Option<&'static str> {
        Some(match self {
            Self::AmdProprietary => "AMD",
            Self::AmdOpenSource => "AMDVLK",
            Self::MesaRadv => "RADV",
            Self::NvidiaProprietary => "NVIDIA",
            Self::IntelProprietaryWindows => "INTEL",
            Self::IntelOpenSourceMesa => "ANV",
            Self::MesaLlvmpipe => "LAVAPIPE",
            _ => return None,
        })
    }

    /// Decode a raw driver version the way this driver packs it.
    pub fn decode_version(self, raw: u32) -> DriverVersion {
        match self {
            // 10.8.8.6
            Self::NvidiaProprietary => DriverVersion {
                major: (raw >> 22) & 0x3ff,
                minor: (raw >> 14) & 0xff,
                patch: (raw >> 6) & 0xff,
                build: raw & 0x3f,
            },
            // 18.14
            Self::IntelProprietaryWindows => DriverVersion {
                major: raw >> 14,
                minor: raw & 0x3fff,
                patch: 0,
                build: 0,
            },
            // Standard API version packing, with the variant bits dropped.
            _ => {
                let raw = raw & 0x1fff_ffff;
                DriverVersion {
                    major: raw >> 22,
                    minor: (raw >> 12) & 0x3ff,
                    patch: raw & 0xfff,
                    build: 0,
                }
            }
        }
    }
}

/// A driver version, decoded from the vendor specific packing.
///
/// Ordering is lexicographic on the fields, which is only meaningful between
/// versions decoded for the same [`DriverVendor`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DriverVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch version.
    pub patch: u32,
    /// Build number, only reported by some vendors.
    pub build: u32,
}

impl DriverVersion {
    /// Build a version without a build number.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            build: 0,
        }
    }
}

impl fmt::Display for DriverVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.build != 0 {
            write!(f, ".{}", self.build)?;
        }
        Ok(())
    }
}

/// Who drives a physical device, and which version of it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DriverIdentity {
    /// Driver identity.
    pub vendor: DriverVendor,
    /// Version exactly as reported, in the vendor packing.
    pub raw_version: u32,
    /// Driver name as reported by the driver.
    pub name: String,
}

impl DriverIdentity {
    /// Decoded driver version.
    pub fn version(&self) -> DriverVersion {
        self.vendor.decode_version(self.raw_version)
    }

    /// Short display string, falling back to the driver reported name.
    pub fn display_name(&self) -> &str {
        self.vendor.short_name().unwrap_or(&self.name)
    }
}
