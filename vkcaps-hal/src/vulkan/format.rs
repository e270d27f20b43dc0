use super::conv;
use crate::FormatError;

use ash::vk;
use fxhash::FxHashMap;
use vkt::FormatType;

/// Every format the renderer may ask about. Properties are queried once, up front.
pub const QUERIED_FORMATS: &[vk::Format] = &[
    vk::Format::A1R5G5B5_UNORM_PACK16,
    vk::Format::A2B10G10R10_SINT_PACK32,
    vk::Format::A2B10G10R10_SNORM_PACK32,
    vk::Format::A2B10G10R10_SSCALED_PACK32,
    vk::Format::A2B10G10R10_UINT_PACK32,
    vk::Format::A2B10G10R10_UNORM_PACK32,
    vk::Format::A2B10G10R10_USCALED_PACK32,
    vk::Format::A8B8G8R8_SINT_PACK32,
    vk::Format::A8B8G8R8_SNORM_PACK32,
    vk::Format::A8B8G8R8_SRGB_PACK32,
    vk::Format::A8B8G8R8_UINT_PACK32,
    vk::Format::A8B8G8R8_UNORM_PACK32,
    vk::Format::ASTC_10X10_SRGB_BLOCK,
    vk::Format::ASTC_10X10_UNORM_BLOCK,
    vk::Format::ASTC_10X5_SRGB_BLOCK,
    vk::Format::ASTC_10X5_UNORM_BLOCK,
    vk::Format::ASTC_10X6_SRGB_BLOCK,
    vk::Format::ASTC_10X6_UNORM_BLOCK,
    vk::Format::ASTC_10X8_SRGB_BLOCK,
    vk::Format::ASTC_10X8_UNORM_BLOCK,
    vk::Format::ASTC_12X10_SRGB_BLOCK,
    vk::Format::ASTC_12X10_UNORM_BLOCK,
    vk::Format::ASTC_12X12_SRGB_BLOCK,
    vk::Format::ASTC_12X12_UNORM_BLOCK,
    vk::Format::ASTC_4X4_SRGB_BLOCK,
    vk::Format::ASTC_4X4_UNORM_BLOCK,
    vk::Format::ASTC_5X4_SRGB_BLOCK,
    vk::Format::ASTC_5X4_UNORM_BLOCK,
    vk::Format::ASTC_5X5_SRGB_BLOCK,
    vk::Format::ASTC_5X5_UNORM_BLOCK,
    vk::Format::ASTC_6X5_SRGB_BLOCK,
    vk::Format::ASTC_6X5_UNORM_BLOCK,
    vk::Format::ASTC_6X6_SRGB_BLOCK,
    vk::Format::ASTC_6X6_UNORM_BLOCK,
    vk::Format::ASTC_8X5_SRGB_BLOCK,
    vk::Format::ASTC_8X5_UNORM_BLOCK,
    vk::Format::ASTC_8X6_SRGB_BLOCK,
    vk::Format::ASTC_8X6_UNORM_BLOCK,
    vk::Format::ASTC_8X8_SRGB_BLOCK,
    vk::Format::ASTC_8X8_UNORM_BLOCK,
    vk::Format::B10G11R11_UFLOAT_PACK32,
    vk::Format::B4G4R4A4_UNORM_PACK16,
    vk::Format::B5G5R5A1_UNORM_PACK16,
    vk::Format::B5G6R5_UNORM_PACK16,
    vk::Format::B8G8R8A8_SRGB,
    vk::Format::B8G8R8A8_UNORM,
    vk::Format::BC1_RGBA_SRGB_BLOCK,
    vk::Format::BC1_RGBA_UNORM_BLOCK,
    vk::Format::BC2_SRGB_BLOCK,
    vk::Format::BC2_UNORM_BLOCK,
    vk::Format::BC3_SRGB_BLOCK,
    vk::Format::BC3_UNORM_BLOCK,
    vk::Format::BC4_SNORM_BLOCK,
    vk::Format::BC4_UNORM_BLOCK,
    vk::Format::BC5_SNORM_BLOCK,
    vk::Format::BC5_UNORM_BLOCK,
    vk::Format::BC6H_SFLOAT_BLOCK,
    vk::Format::BC6H_UFLOAT_BLOCK,
    vk::Format::BC7_SRGB_BLOCK,
    vk::Format::BC7_UNORM_BLOCK,
    vk::Format::D16_UNORM,
    vk::Format::D16_UNORM_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::E5B9G9R9_UFLOAT_PACK32,
    vk::Format::R16G16B16A16_SFLOAT,
    vk::Format::R16G16B16A16_SINT,
    vk::Format::R16G16B16A16_SNORM,
    vk::Format::R16G16B16A16_SSCALED,
    vk::Format::R16G16B16A16_UINT,
    vk::Format::R16G16B16A16_UNORM,
    vk::Format::R16G16B16A16_USCALED,
    vk::Format::R16G16B16_SFLOAT,
    vk::Format::R16G16B16_SINT,
    vk::Format::R16G16B16_SNORM,
    vk::Format::R16G16B16_SSCALED,
    vk::Format::R16G16B16_UINT,
    vk::Format::R16G16B16_UNORM,
    vk::Format::R16G16B16_USCALED,
    vk::Format::R16G16_SFLOAT,
    vk::Format::R16G16_SINT,
    vk::Format::R16G16_SNORM,
    vk::Format::R16G16_SSCALED,
    vk::Format::R16G16_UINT,
    vk::Format::R16G16_UNORM,
    vk::Format::R16G16_USCALED,
    vk::Format::R16_SFLOAT,
    vk::Format::R16_SINT,
    vk::Format::R16_SNORM,
    vk::Format::R16_SSCALED,
    vk::Format::R16_UINT,
    vk::Format::R16_UNORM,
    vk::Format::R16_USCALED,
    vk::Format::R32G32B32A32_SFLOAT,
    vk::Format::R32G32B32A32_SINT,
    vk::Format::R32G32B32A32_UINT,
    vk::Format::R32G32B32_SFLOAT,
    vk::Format::R32G32B32_SINT,
    vk::Format::R32G32B32_UINT,
    vk::Format::R32G32_SFLOAT,
    vk::Format::R32G32_SINT,
    vk::Format::R32G32_UINT,
    vk::Format::R32_SFLOAT,
    vk::Format::R32_SINT,
    vk::Format::R32_UINT,
    vk::Format::R4G4B4A4_UNORM_PACK16,
    vk::Format::R4G4_UNORM_PACK8,
    vk::Format::R5G5B5A1_UNORM_PACK16,
    vk::Format::R5G6B5_UNORM_PACK16,
    vk::Format::R8G8B8A8_SINT,
    vk::Format::R8G8B8A8_SNORM,
    vk::Format::R8G8B8A8_SRGB,
    vk::Format::R8G8B8A8_SSCALED,
    vk::Format::R8G8B8A8_UINT,
    vk::Format::R8G8B8A8_UNORM,
    vk::Format::R8G8B8A8_USCALED,
    vk::Format::R8G8B8_SINT,
    vk::Format::R8G8B8_SNORM,
    vk::Format::R8G8B8_SSCALED,
    vk::Format::R8G8B8_UINT,
    vk::Format::R8G8B8_UNORM,
    vk::Format::R8G8B8_USCALED,
    vk::Format::R8G8_SINT,
    vk::Format::R8G8_SNORM,
    vk::Format::R8G8_SSCALED,
    vk::Format::R8G8_UINT,
    vk::Format::R8G8_UNORM,
    vk::Format::R8G8_USCALED,
    vk::Format::R8_SINT,
    vk::Format::R8_SNORM,
    vk::Format::R8_SSCALED,
    vk::Format::R8_UINT,
    vk::Format::R8_UNORM,
    vk::Format::R8_USCALED,
    vk::Format::S8_UINT,
];

pub(super) const ASTC_FORMATS: &[vk::Format] = &[
    vk::Format::ASTC_4X4_UNORM_BLOCK,
    vk::Format::ASTC_4X4_SRGB_BLOCK,
    vk::Format::ASTC_5X4_UNORM_BLOCK,
    vk::Format::ASTC_5X4_SRGB_BLOCK,
    vk::Format::ASTC_5X5_UNORM_BLOCK,
    vk::Format::ASTC_5X5_SRGB_BLOCK,
    vk::Format::ASTC_6X5_UNORM_BLOCK,
    vk::Format::ASTC_6X5_SRGB_BLOCK,
    vk::Format::ASTC_6X6_UNORM_BLOCK,
    vk::Format::ASTC_6X6_SRGB_BLOCK,
    vk::Format::ASTC_8X5_UNORM_BLOCK,
    vk::Format::ASTC_8X5_SRGB_BLOCK,
    vk::Format::ASTC_8X6_UNORM_BLOCK,
    vk::Format::ASTC_8X6_SRGB_BLOCK,
    vk::Format::ASTC_8X8_UNORM_BLOCK,
    vk::Format::ASTC_8X8_SRGB_BLOCK,
    vk::Format::ASTC_10X5_UNORM_BLOCK,
    vk::Format::ASTC_10X5_SRGB_BLOCK,
    vk::Format::ASTC_10X6_UNORM_BLOCK,
    vk::Format::ASTC_10X6_SRGB_BLOCK,
    vk::Format::ASTC_10X8_UNORM_BLOCK,
    vk::Format::ASTC_10X8_SRGB_BLOCK,
    vk::Format::ASTC_10X10_UNORM_BLOCK,
    vk::Format::ASTC_10X10_SRGB_BLOCK,
    vk::Format::ASTC_12X10_UNORM_BLOCK,
    vk::Format::ASTC_12X10_SRGB_BLOCK,
    vk::Format::ASTC_12X12_UNORM_BLOCK,
    vk::Format::ASTC_12X12_SRGB_BLOCK,
];

/// Formats that can stand in for `format`, closest fidelity first.
pub fn alternatives(format: vk::Format) -> &'static [vk::Format] {
    use vk::Format as F;
    match format {
        F::S8_UINT => &[
            F::D16_UNORM_S8_UINT,
            F::D24_UNORM_S8_UINT,
            F::D32_SFLOAT_S8_UINT,
        ],
        F::D24_UNORM_S8_UINT => &[F::D32_SFLOAT_S8_UINT, F::D16_UNORM_S8_UINT],
        F::D16_UNORM_S8_UINT => &[F::D24_UNORM_S8_UINT, F::D32_SFLOAT_S8_UINT],
        F::B5G6R5_UNORM_PACK16 => &[F::R5G6B5_UNORM_PACK16],
        F::R4G4_UNORM_PACK8 => &[F::R8_UNORM],
        F::R16G16B16_SFLOAT => &[F::R16G16B16A16_SFLOAT],
        F::R16G16B16_SSCALED => &[F::R16G16B16A16_SSCALED],
        F::R8G8B8_SSCALED => &[F::R8G8B8A8_SSCALED],
        _ => &[],
    }
}

/// Properties of every format in [`QUERIED_FORMATS`].
#[derive(Clone, Debug, Default)]
pub struct FormatTable {
    properties: FxHashMap<vk::Format, vk::FormatProperties>,
}

impl FormatTable {
    pub fn query<P: crate::PhysicalDevice>(phd: &P) -> Self {
        profiling::scope!("FormatTable::query");
        let properties = QUERIED_FORMATS
            .iter()
            .map(|&format| (format, phd.format_properties(format)))
            .collect();
        Self { properties }
    }

    pub fn properties(&self, format: vk::Format) -> Option<&vk::FormatProperties> {
        self.properties.get(&format)
    }

    /// Supported features of `format`, or `None` if it was never queried.
    pub fn features(
        &self,
        format: vk::Format,
        format_type: FormatType,
    ) -> Option<vk::FormatFeatureFlags> {
        self.properties
            .get(&format)
            .map(|properties| conv::map_format_type(properties, format_type))
    }

    /// Check whether `format` supports every bit of `usage`.
    ///
    /// A format outside of [`QUERIED_FORMATS`] is logged and assumed supported.
    pub fn is_supported(
        &self,
        format: vk::Format,
        usage: vk::FormatFeatureFlags,
        format_type: FormatType,
    ) -> bool {
        match self.features(format, format_type) {
            Some(features) => features.contains(usage),
            None => {
                log::error!("Unimplemented format query={:?}", format);
                true
            }
        }
    }

    /// Return `format` if it is supported, or its first supported alternative.
    pub fn resolve(
        &self,
        format: vk::Format,
        usage: vk::FormatFeatureFlags,
        format_type: FormatType,
    ) -> Result<vk::Format, FormatError> {
        if self.is_supported(format, usage, format_type) {
            return Ok(format);
        }
        let alternative = alternatives(format)
            .iter()
            .copied()
            .find(|&alternative| self.is_supported(alternative, usage, format_type));
        match alternative {
            Some(alternative) => {
                log::debug!(
                    "Emulating format={:?} with alternative format={:?} with usage={:?} and type={:?}",
                    format,
                    alternative,
                    usage,
                    format_type
                );
                Ok(alternative)
            }
            None => {
                log::error!(
                    "Format={:?} with usage={:?} and type={:?} is not supported by the device, nor any of its alternatives",
                    format,
                    usage,
                    format_type
                );
                Err(FormatError::Unresolvable {
                    format,
                    usage,
                    format_type,
                })
            }
        }
    }
}

#[cfg(test)]
impl FormatTable {
    pub(crate) fn from_properties(
        properties: impl IntoIterator<Item = (vk::Format, vk::FormatProperties)>,
    ) -> Self {
        Self {
            properties: properties.into_iter().collect(),
        }
    }
}
