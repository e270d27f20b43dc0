use crate::common::{open_valid, TestParameters};

use ash::vk;
use vkcaps_hal::{
    empty,
    vulkan::{alternatives, QUERIED_FORMATS},
    FormatError,
};
use vkt::{Capabilities as Caps, FormatType};

const ATTACHMENT: vk::FormatFeatureFlags = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;

fn unsupported(phd: &mut empty::PhysicalDevice, formats: &[vk::Format]) {
    for &format in formats {
        phd.formats.insert(format, vk::FormatProperties::default());
    }
}

#[test]
fn stencil_falls_back_to_the_first_supported_alternative() {
    let mut phd = empty::PhysicalDevice::new();
    unsupported(
        &mut phd,
        &[
            vk::Format::S8_UINT,
            vk::Format::D16_UNORM_S8_UINT,
            vk::Format::D32_SFLOAT_S8_UINT,
        ],
    );
    let device = open_valid(phd, TestParameters::default());

    assert_eq!(
        device.supported_format(vk::Format::S8_UINT, ATTACHMENT, FormatType::Optimal),
        Ok(vk::Format::D24_UNORM_S8_UINT)
    );
}

#[test]
fn alternatives_are_tried_in_order() {
    let mut phd = empty::PhysicalDevice::new();
    unsupported(&mut phd, &[vk::Format::D24_UNORM_S8_UINT]);
    let device = open_valid(phd, TestParameters::default());

    // Both alternatives are supported, the first one wins
    assert_eq!(
        alternatives(vk::Format::D24_UNORM_S8_UINT),
        &[vk::Format::D32_SFLOAT_S8_UINT, vk::Format::D16_UNORM_S8_UINT]
    );
    assert_eq!(
        device.supported_format(vk::Format::D24_UNORM_S8_UINT, ATTACHMENT, FormatType::Optimal),
        Ok(vk::Format::D32_SFLOAT_S8_UINT)
    );
    assert!(!device.supports(Caps::DEPTH24_ATTACHMENT));
    assert!(!device.is_blit_depth_stencil_supported());
}

#[test]
fn unresolvable_format() {
    let mut phd = empty::PhysicalDevice::new();
    unsupported(
        &mut phd,
        &[vk::Format::B5G6R5_UNORM_PACK16, vk::Format::R5G6B5_UNORM_PACK16],
    );
    let device = open_valid(phd, TestParameters::default());
    let usage = vk::FormatFeatureFlags::SAMPLED_IMAGE;

    assert_eq!(
        device.supported_format(vk::Format::B5G6R5_UNORM_PACK16, usage, FormatType::Optimal),
        Err(FormatError::Unresolvable {
            format: vk::Format::B5G6R5_UNORM_PACK16,
            usage,
            format_type: FormatType::Optimal,
        })
    );
}

#[test]
fn resolution_is_idempotent() {
    let mut phd = empty::PhysicalDevice::new();
    unsupported(
        &mut phd,
        &[
            vk::Format::S8_UINT,
            vk::Format::D16_UNORM_S8_UINT,
            vk::Format::R4G4_UNORM_PACK8,
            vk::Format::R16G16B16_SFLOAT,
            vk::Format::R8G8B8_SSCALED,
            vk::Format::R8G8B8A8_SSCALED,
        ],
    );
    // Linear tiling only supports sampling
    phd.formats.insert(
        vk::Format::B5G6R5_UNORM_PACK16,
        vk::FormatProperties {
            linear_tiling_features: vk::FormatFeatureFlags::SAMPLED_IMAGE,
            optimal_tiling_features: empty::full_format_properties().optimal_tiling_features,
            buffer_features: vk::FormatFeatureFlags::empty(),
        },
    );
    let device = open_valid(phd, TestParameters::default());

    let usages = [
        vk::FormatFeatureFlags::SAMPLED_IMAGE,
        vk::FormatFeatureFlags::COLOR_ATTACHMENT | vk::FormatFeatureFlags::BLIT_DST,
        ATTACHMENT,
    ];
    let format_types = [FormatType::Linear, FormatType::Optimal, FormatType::Buffer];
    for &format in QUERIED_FORMATS {
        for &usage in &usages {
            for &format_type in &format_types {
                let supported = device.is_format_supported(format, usage, format_type);
                match device.supported_format(format, usage, format_type) {
                    Ok(resolved) if supported => assert_eq!(resolved, format),
                    Ok(resolved) => {
                        assert!(alternatives(format).contains(&resolved));
                        assert!(device.is_format_supported(resolved, usage, format_type));
                        assert_eq!(
                            device.supported_format(resolved, usage, format_type),
                            Ok(resolved)
                        );
                    }
                    Err(_) => assert!(!supported),
                }
            }
        }
    }
}

#[test]
fn unqueried_formats_are_assumed_supported() {
    let device = open_valid(empty::PhysicalDevice::new(), TestParameters::default());
    let format = vk::Format::G8_B8_R8_3PLANE_420_UNORM;
    assert!(!QUERIED_FORMATS.contains(&format));
    assert!(device.is_format_supported(
        format,
        vk::FormatFeatureFlags::SAMPLED_IMAGE,
        FormatType::Optimal
    ));
    assert_eq!(
        device.supported_format(format, vk::FormatFeatureFlags::SAMPLED_IMAGE, FormatType::Optimal),
        Ok(format)
    );
}

#[test]
fn format_derived_capabilities() {
    let device = open_valid(empty::PhysicalDevice::new(), TestParameters::default());
    assert!(device.is_blit_depth_stencil_supported());
    assert!(device.supports(Caps::DEPTH24_ATTACHMENT));
    // The device doesn't expose ASTC at all
    assert!(!device.is_optimal_astc_supported());

    let mut phd = empty::PhysicalDevice::new();
    phd.features.core.texture_compression_astc_ldr = vk::TRUE;
    let device = open_valid(phd, TestParameters::default());
    assert!(device.is_optimal_astc_supported());
    assert_eq!(
        device.physical().created()[0]
            .features
            .core
            .texture_compression_astc_ldr,
        vk::TRUE
    );

    let mut phd = empty::PhysicalDevice::new();
    phd.features.core.texture_compression_astc_ldr = vk::TRUE;
    phd.formats.insert(
        vk::Format::ASTC_12X12_SRGB_BLOCK,
        vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::SAMPLED_IMAGE,
            ..Default::default()
        },
    );
    let device = open_valid(phd, TestParameters::default());
    assert!(!device.is_optimal_astc_supported());

    let mut phd = empty::PhysicalDevice::new();
    let full = empty::full_format_properties();
    phd.formats.insert(
        vk::Format::D32_SFLOAT_S8_UINT,
        vk::FormatProperties {
            optimal_tiling_features: full.optimal_tiling_features
                & !vk::FormatFeatureFlags::BLIT_DST,
            ..full
        },
    );
    let device = open_valid(phd, TestParameters::default());
    assert!(!device.is_blit_depth_stencil_supported());
    assert!(device.supports(Caps::DEPTH24_ATTACHMENT));
}
