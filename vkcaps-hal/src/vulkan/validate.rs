use super::{adapter::FeatureChain, conv::map_bool, inventory::Inventory};
use crate::{LimitViolation, NegotiationError};

use ash::{ext, khr, vk};

use std::ffi::CStr;

/// Every extension the device has to support.
///
/// Extensions promoted to the core of `api_version` are left out.
pub fn required_extensions(api_version: u32, requires_presentation: bool) -> Vec<&'static CStr> {
    let mut extensions = vec![ext::vertex_attribute_divisor::NAME, ext::robustness2::NAME];
    #[cfg(windows)]
    extensions.push(khr::external_memory_win32::NAME);
    #[cfg(all(unix, not(target_vendor = "apple")))]
    extensions.push(khr::external_memory_fd::NAME);

    if api_version < vk::API_VERSION_1_2 {
        extensions.extend([
            khr::timeline_semaphore::NAME,
            ext::host_query_reset::NAME,
            khr::_8bit_storage::NAME,
            khr::shader_float_controls::NAME,
            khr::sampler_mirror_clamp_to_edge::NAME,
            khr::driver_properties::NAME,
        ]);
    }
    if api_version < vk::API_VERSION_1_3 {
        extensions.push(ext::shader_demote_to_helper_invocation::NAME);
    }
    if requires_presentation {
        extensions.push(khr::swapchain::NAME);
    }
    extensions
}

type LimitFn = fn(&vk::PhysicalDeviceLimits) -> u32;

const REQUIRED_LIMITS: &[(&str, u32, LimitFn)] = &[
    ("maxUniformBufferRange", 65536, |l| l.max_uniform_buffer_range),
    ("maxViewports", 16, |l| l.max_viewports),
    ("maxColorAttachments", 8, |l| l.max_color_attachments),
    ("maxClipDistances", 8, |l| l.max_clip_distances),
];

type FeatureFn = fn(&mut FeatureChain) -> &mut vk::Bool32;

/// Mandatory features, and where they live in a [`FeatureChain`].
///
/// Accessing a chained feature inserts its structure.
pub(super) const REQUIRED_FEATURES: &[(&str, FeatureFn)] = &[
    ("robustBufferAccess", |c| &mut c.core.robust_buffer_access),
    ("vertexPipelineStoresAndAtomics", |c| {
        &mut c.core.vertex_pipeline_stores_and_atomics
    }),
    ("imageCubeArray", |c| &mut c.core.image_cube_array),
    ("independentBlend", |c| &mut c.core.independent_blend),
    ("depthClamp", |c| &mut c.core.depth_clamp),
    ("samplerAnisotropy", |c| &mut c.core.sampler_anisotropy),
    ("largePoints", |c| &mut c.core.large_points),
    ("multiViewport", |c| &mut c.core.multi_viewport),
    ("depthBiasClamp", |c| &mut c.core.depth_bias_clamp),
    ("fillModeNonSolid", |c| &mut c.core.fill_mode_non_solid),
    ("wideLines", |c| &mut c.core.wide_lines),
    ("geometryShader", |c| &mut c.core.geometry_shader),
    ("tessellationShader", |c| &mut c.core.tessellation_shader),
    ("sampleRateShading", |c| &mut c.core.sample_rate_shading),
    ("dualSrcBlend", |c| &mut c.core.dual_src_blend),
    ("logicOp", |c| &mut c.core.logic_op),
    ("occlusionQueryPrecise", |c| &mut c.core.occlusion_query_precise),
    ("fragmentStoresAndAtomics", |c| {
        &mut c.core.fragment_stores_and_atomics
    }),
    ("shaderImageGatherExtended", |c| {
        &mut c.core.shader_image_gather_extended
    }),
    ("shaderStorageImageWriteWithoutFormat", |c| {
        &mut c.core.shader_storage_image_write_without_format
    }),
    ("shaderClipDistance", |c| &mut c.core.shader_clip_distance),
    ("shaderCullDistance", |c| &mut c.core.shader_cull_distance),
    ("variablePointers", |c| {
        &mut c
            .variable_pointers
            .get_or_insert_with(Default::default)
            .variable_pointers
    }),
    ("variablePointersStorageBuffer", |c| {
        &mut c
            .variable_pointers
            .get_or_insert_with(Default::default)
            .variable_pointers_storage_buffer
    }),
    ("robustBufferAccess2", |c| {
        &mut c
            .robustness2
            .get_or_insert_with(Default::default)
            .robust_buffer_access2
    }),
    ("robustImageAccess2", |c| {
        &mut c
            .robustness2
            .get_or_insert_with(Default::default)
            .robust_image_access2
    }),
    ("nullDescriptor", |c| {
        &mut c
            .robustness2
            .get_or_insert_with(Default::default)
            .null_descriptor
    }),
    ("shaderDemoteToHelperInvocation", |c| {
        &mut c
            .demote_to_helper_invocation
            .get_or_insert_with(Default::default)
            .shader_demote_to_helper_invocation
    }),
    ("timelineSemaphore", |c| {
        &mut c
            .timeline_semaphore
            .get_or_insert_with(Default::default)
            .timeline_semaphore
    }),
    ("storageBuffer16BitAccess", |c| {
        &mut c
            .storage_16bit
            .get_or_insert_with(Default::default)
            .storage_buffer16_bit_access
    }),
    ("uniformAndStorageBuffer16BitAccess", |c| {
        &mut c
            .storage_16bit
            .get_or_insert_with(Default::default)
            .uniform_and_storage_buffer16_bit_access
    }),
    ("uniformAndStorageBuffer8BitAccess", |c| {
        &mut c
            .storage_8bit
            .get_or_insert_with(Default::default)
            .uniform_and_storage_buffer8_bit_access
    }),
    ("hostQueryReset", |c| {
        &mut c
            .host_query_reset
            .get_or_insert_with(Default::default)
            .host_query_reset
    }),
    ("shaderDrawParameters", |c| {
        &mut c
            .draw_parameters
            .get_or_insert_with(Default::default)
            .shader_draw_parameters
    }),
];

fn check_extensions(inventory: &Inventory, required: &[&'static CStr]) -> Vec<String> {
    let mut missing = Vec::new();
    for &name in required {
        if !inventory.supports_extension(name) {
            let name = name.to_string_lossy().into_owned();
            log::error!("Missing required extension: {}", name);
            missing.push(name);
        }
    }
    missing
}

fn check_limits(limits: &vk::PhysicalDeviceLimits) -> Vec<LimitViolation> {
    let mut violations = Vec::new();
    for &(name, minimum, get) in REQUIRED_LIMITS {
        let actual = get(limits);
        if actual < minimum {
            let violation = LimitViolation {
                name,
                minimum,
                actual,
            };
            log::error!("{}", violation);
            violations.push(violation);
        }
    }
    violations
}

fn check_features(features: &mut FeatureChain) -> Vec<&'static str> {
    let mut missing = Vec::new();
    for &(name, field) in REQUIRED_FEATURES {
        if !map_bool(*field(features)) {
            log::error!("Missing required feature: {}", name);
            missing.push(name);
        }
    }
    missing
}

/// Check that the device meets every mandatory requirement.
///
/// Each category is checked exhaustively, and negotiation stops at the first
/// category with a failure.
pub fn validate<P: crate::PhysicalDevice>(
    phd: &P,
    inventory: &Inventory,
    requires_presentation: bool,
) -> Result<(), NegotiationError> {
    profiling::scope!("validate");

    let required = required_extensions(inventory.api_version(), requires_presentation);
    let missing = check_extensions(inventory, &required);
    if !missing.is_empty() {
        return Err(NegotiationError::MissingRequiredExtension(missing));
    }

    let violations = check_limits(&inventory.properties.limits);
    if !violations.is_empty() {
        return Err(NegotiationError::InsufficientLimit(violations));
    }

    let mut features = FeatureChain::required();
    phd.features(&mut features);
    let missing = check_features(&mut features);
    if !missing.is_empty() {
        return Err(NegotiationError::MissingRequiredFeature(missing));
    }
    Ok(())
}
