use super::{
    conv::map_bool,
    format::FormatTable,
    inventory::Inventory,
    quirks::{NvidiaArchitecture, Phase, QuirkContext, QuirkDatabase},
    validate, DeviceDescriptor, Workarounds, GUEST_WARP_SIZE,
};

use ash::{ext, khr, nv, vk};
use vkt::Capabilities as Caps;

use std::{ffi::CStr, ptr};

fn astc_required_flags() -> vk::FormatFeatureFlags {
    vk::FormatFeatureFlags::SAMPLED_IMAGE
        | vk::FormatFeatureFlags::BLIT_SRC
        | vk::FormatFeatureFlags::BLIT_DST
        | vk::FormatFeatureFlags::TRANSFER_SRC
        | vk::FormatFeatureFlags::TRANSFER_DST
}

/// Runs `$body` for every `Some` member of a [`FeatureChain`].
macro_rules! feature_members {
    ($chain:expr, $member:ident => $body:expr) => {{
        if let Some(ref mut $member) = $chain.timeline_semaphore {
            $body;
        }
        if let Some(ref mut $member) = $chain.storage_16bit {
            $body;
        }
        if let Some(ref mut $member) = $chain.storage_8bit {
            $body;
        }
        if let Some(ref mut $member) = $chain.robustness2 {
            $body;
        }
        if let Some(ref mut $member) = $chain.host_query_reset {
            $body;
        }
        if let Some(ref mut $member) = $chain.variable_pointers {
            $body;
        }
        if let Some(ref mut $member) = $chain.demote_to_helper_invocation {
            $body;
        }
        if let Some(ref mut $member) = $chain.draw_parameters {
            $body;
        }
        if let Some(ref mut $member) = $chain.float16_int8 {
            $body;
        }
        if let Some(ref mut $member) = $chain.uniform_buffer_standard_layout {
            $body;
        }
        if let Some(ref mut $member) = $chain.index_type_uint8 {
            $body;
        }
        if let Some(ref mut $member) = $chain.primitive_topology_list_restart {
            $body;
        }
        if let Some(ref mut $member) = $chain.transform_feedback {
            $body;
        }
        if let Some(ref mut $member) = $chain.custom_border_color {
            $body;
        }
        if let Some(ref mut $member) = $chain.extended_dynamic_state {
            $body;
        }
        if let Some(ref mut $member) = $chain.line_rasterization {
            $body;
        }
        if let Some(ref mut $member) = $chain.provoking_vertex {
            $body;
        }
        if let Some(ref mut $member) = $chain.vertex_input_dynamic_state {
            $body;
        }
        if let Some(ref mut $member) = $chain.shader_atomic_int64 {
            $body;
        }
        if let Some(ref mut $member) = $chain.workgroup_memory_explicit_layout {
            $body;
        }
        if let Some(ref mut $member) = $chain.pipeline_executable_properties {
            $body;
        }
        if let Some(ref mut $member) = $chain.subgroup_size_control {
            $body;
        }
    }};
}

/// Runs `$body` for every `Some` member of a [`PropertyChain`].
macro_rules! property_members {
    ($chain:expr, $member:ident => $body:expr) => {{
        if let Some(ref mut $member) = $chain.driver {
            $body;
        }
        if let Some(ref mut $member) = $chain.float_controls {
            $body;
        }
        if let Some(ref mut $member) = $chain.subgroup_size_control {
            $body;
        }
        if let Some(ref mut $member) = $chain.transform_feedback {
            $body;
        }
        if let Some(ref mut $member) = $chain.push_descriptor {
            $body;
        }
        if let Some(ref mut $member) = $chain.fragment_shading_rate {
            $body;
        }
    }};
}

fn fill<T: Copy>(dst: &mut Option<T>, src: &Option<T>) {
    if let (Some(dst), Some(src)) = (dst.as_mut(), src.as_ref()) {
        *dst = *src;
    }
}

/// Aggregate of the `vk::PhysicalDevice*Features` structs negotiation uses.
///
/// A member is only `Some` when its extension is known to be present, or when
/// it is mandatory. The same aggregate serves as query target and as the
/// chained request at device creation.
#[derive(Clone, Debug, Default)]
pub struct FeatureChain {
    pub core: vk::PhysicalDeviceFeatures,
    pub timeline_semaphore: Option<vk::PhysicalDeviceTimelineSemaphoreFeatures<'static>>,
    pub storage_16bit: Option<vk::PhysicalDevice16BitStorageFeatures<'static>>,
    pub storage_8bit: Option<vk::PhysicalDevice8BitStorageFeatures<'static>>,
    pub robustness2: Option<vk::PhysicalDeviceRobustness2FeaturesEXT<'static>>,
    pub host_query_reset: Option<vk::PhysicalDeviceHostQueryResetFeatures<'static>>,
    pub variable_pointers: Option<vk::PhysicalDeviceVariablePointersFeatures<'static>>,
    pub demote_to_helper_invocation:
        Option<vk::PhysicalDeviceShaderDemoteToHelperInvocationFeatures<'static>>,
    pub draw_parameters: Option<vk::PhysicalDeviceShaderDrawParametersFeatures<'static>>,
    pub float16_int8: Option<vk::PhysicalDeviceShaderFloat16Int8Features<'static>>,
    pub uniform_buffer_standard_layout:
        Option<vk::PhysicalDeviceUniformBufferStandardLayoutFeatures<'static>>,
    pub index_type_uint8: Option<vk::PhysicalDeviceIndexTypeUint8FeaturesEXT<'static>>,
    pub primitive_topology_list_restart:
        Option<vk::PhysicalDevicePrimitiveTopologyListRestartFeaturesEXT<'static>>,
    pub transform_feedback: Option<vk::PhysicalDeviceTransformFeedbackFeaturesEXT<'static>>,
    pub custom_border_color: Option<vk::PhysicalDeviceCustomBorderColorFeaturesEXT<'static>>,
    pub extended_dynamic_state:
        Option<vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT<'static>>,
    pub line_rasterization: Option<vk::PhysicalDeviceLineRasterizationFeaturesEXT<'static>>,
    pub provoking_vertex: Option<vk::PhysicalDeviceProvokingVertexFeaturesEXT<'static>>,
    pub vertex_input_dynamic_state:
        Option<vk::PhysicalDeviceVertexInputDynamicStateFeaturesEXT<'static>>,
    pub shader_atomic_int64: Option<vk::PhysicalDeviceShaderAtomicInt64Features<'static>>,
    pub workgroup_memory_explicit_layout:
        Option<vk::PhysicalDeviceWorkgroupMemoryExplicitLayoutFeaturesKHR<'static>>,
    pub pipeline_executable_properties:
        Option<vk::PhysicalDevicePipelineExecutablePropertiesFeaturesKHR<'static>>,
    pub subgroup_size_control: Option<vk::PhysicalDeviceSubgroupSizeControlFeatures<'static>>,
}

// This is safe because the structs have `p_next: *mut c_void`, which we null out/never read.
unsafe impl Send for FeatureChain {}
unsafe impl Sync for FeatureChain {}

impl FeatureChain {
    /// The mandatory structures, zeroed, ready to be queried.
    pub fn required() -> Self {
        Self {
            timeline_semaphore: Some(Default::default()),
            storage_16bit: Some(Default::default()),
            storage_8bit: Some(Default::default()),
            robustness2: Some(Default::default()),
            host_query_reset: Some(Default::default()),
            variable_pointers: Some(Default::default()),
            demote_to_helper_invocation: Some(Default::default()),
            draw_parameters: Some(Default::default()),
            ..Default::default()
        }
    }

    /// Zeroed structures for every capability in `capabilities` that has one.
    pub fn for_capabilities(capabilities: Caps) -> Self {
        let mut chain = Self::default();
        if capabilities.intersects(Caps::SHADER_FLOAT16 | Caps::SHADER_INT8) {
            chain.float16_int8 = Some(Default::default());
        }
        if capabilities.contains(Caps::UNIFORM_BUFFER_STANDARD_LAYOUT) {
            chain.uniform_buffer_standard_layout = Some(Default::default());
        }
        if capabilities.contains(Caps::INDEX_TYPE_UINT8) {
            chain.index_type_uint8 = Some(Default::default());
        }
        if capabilities.intersects(Caps::TOPOLOGY_LIST_RESTART | Caps::PATCH_LIST_RESTART) {
            chain.primitive_topology_list_restart = Some(Default::default());
        }
        if capabilities.contains(Caps::TRANSFORM_FEEDBACK) {
            chain.transform_feedback = Some(Default::default());
        }
        if capabilities.contains(Caps::CUSTOM_BORDER_COLOR) {
            chain.custom_border_color = Some(Default::default());
        }
        if capabilities.contains(Caps::EXTENDED_DYNAMIC_STATE) {
            chain.extended_dynamic_state = Some(Default::default());
        }
        if capabilities.contains(Caps::LINE_RASTERIZATION) {
            chain.line_rasterization = Some(Default::default());
        }
        if capabilities.contains(Caps::PROVOKING_VERTEX) {
            chain.provoking_vertex = Some(Default::default());
        }
        if capabilities.contains(Caps::VERTEX_INPUT_DYNAMIC_STATE) {
            chain.vertex_input_dynamic_state = Some(Default::default());
        }
        if capabilities.contains(Caps::SHADER_ATOMIC_INT64) {
            chain.shader_atomic_int64 = Some(Default::default());
        }
        if capabilities.contains(Caps::WORKGROUP_MEMORY_EXPLICIT_LAYOUT) {
            chain.workgroup_memory_explicit_layout = Some(Default::default());
        }
        if capabilities.contains(Caps::PIPELINE_EXECUTABLE_PROPERTIES) {
            chain.pipeline_executable_properties = Some(Default::default());
        }
        if capabilities.contains(Caps::SUBGROUP_SIZE_CONTROL) {
            chain.subgroup_size_control = Some(Default::default());
        }
        chain
    }

    /// Create the chain requested at device creation.
    ///
    /// Every mandatory feature is requested, and exactly the optional features
    /// backing `enabled`.
    pub fn for_device_creation(enabled: Caps) -> Self {
        let mut chain = Self::default();
        for &(_, field) in validate::REQUIRED_FEATURES {
            *field(&mut chain) = vk::TRUE;
        }

        // vk::PhysicalDeviceFeatures is a struct composed of Bool32's while
        // Capabilities is a bitfield so we need to map everything manually
        chain.core.depth_bounds = enabled.contains(Caps::DEPTH_BOUNDS).into();
        chain.core.shader_storage_image_read_without_format =
            enabled.contains(Caps::FORMATLESS_IMAGE_LOAD).into();
        chain.core.shader_float64 = enabled.contains(Caps::SHADER_FLOAT64).into();
        chain.core.shader_int64 = enabled.contains(Caps::SHADER_INT64).into();
        chain.core.shader_int16 = enabled.contains(Caps::SHADER_INT16).into();
        chain.core.shader_storage_image_multisample =
            enabled.contains(Caps::SHADER_STORAGE_IMAGE_MULTISAMPLE).into();
        chain.core.texture_compression_astc_ldr = enabled.contains(Caps::OPTIMAL_ASTC).into();

        if enabled.intersects(Caps::SHADER_FLOAT16 | Caps::SHADER_INT8) {
            chain.float16_int8 = Some(
                vk::PhysicalDeviceShaderFloat16Int8Features::default()
                    .shader_float16(enabled.contains(Caps::SHADER_FLOAT16))
                    .shader_int8(enabled.contains(Caps::SHADER_INT8)),
            );
        }
        if enabled.contains(Caps::UNIFORM_BUFFER_STANDARD_LAYOUT) {
            chain.uniform_buffer_standard_layout = Some(
                vk::PhysicalDeviceUniformBufferStandardLayoutFeatures::default()
                    .uniform_buffer_standard_layout(true),
            );
        }
        if enabled.contains(Caps::INDEX_TYPE_UINT8) {
            chain.index_type_uint8 = Some(
                vk::PhysicalDeviceIndexTypeUint8FeaturesEXT::default().index_type_uint8(true),
            );
        }
        if enabled.intersects(Caps::TOPOLOGY_LIST_RESTART | Caps::PATCH_LIST_RESTART) {
            chain.primitive_topology_list_restart = Some(
                vk::PhysicalDevicePrimitiveTopologyListRestartFeaturesEXT::default()
                    .primitive_topology_list_restart(enabled.contains(Caps::TOPOLOGY_LIST_RESTART))
                    .primitive_topology_patch_list_restart(
                        enabled.contains(Caps::PATCH_LIST_RESTART),
                    ),
            );
        }
        if enabled.contains(Caps::TRANSFORM_FEEDBACK) {
            chain.transform_feedback = Some(
                vk::PhysicalDeviceTransformFeedbackFeaturesEXT::default()
                    .transform_feedback(true)
                    .geometry_streams(true),
            );
        }
        if enabled.contains(Caps::CUSTOM_BORDER_COLOR) {
            chain.custom_border_color = Some(
                vk::PhysicalDeviceCustomBorderColorFeaturesEXT::default()
                    .custom_border_colors(true)
                    .custom_border_color_without_format(true),
            );
        }
        if enabled.contains(Caps::EXTENDED_DYNAMIC_STATE) {
            chain.extended_dynamic_state = Some(
                vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT::default()
                    .extended_dynamic_state(true),
            );
        }
        if enabled.contains(Caps::LINE_RASTERIZATION) {
            chain.line_rasterization = Some(
                vk::PhysicalDeviceLineRasterizationFeaturesEXT::default()
                    .rectangular_lines(true)
                    .smooth_lines(true),
            );
        }
        if enabled.contains(Caps::PROVOKING_VERTEX) {
            chain.provoking_vertex = Some(
                vk::PhysicalDeviceProvokingVertexFeaturesEXT::default()
                    .provoking_vertex_last(true)
                    .transform_feedback_preserves_provoking_vertex(true),
            );
        }
        if enabled.contains(Caps::VERTEX_INPUT_DYNAMIC_STATE) {
            chain.vertex_input_dynamic_state = Some(
                vk::PhysicalDeviceVertexInputDynamicStateFeaturesEXT::default()
                    .vertex_input_dynamic_state(true),
            );
        }
        if enabled.contains(Caps::SHADER_ATOMIC_INT64) {
            chain.shader_atomic_int64 = Some(
                vk::PhysicalDeviceShaderAtomicInt64Features::default()
                    .shader_buffer_int64_atomics(true)
                    .shader_shared_int64_atomics(true),
            );
        }
        if enabled.contains(Caps::WORKGROUP_MEMORY_EXPLICIT_LAYOUT) {
            chain.workgroup_memory_explicit_layout = Some(
                vk::PhysicalDeviceWorkgroupMemoryExplicitLayoutFeaturesKHR::default()
                    .workgroup_memory_explicit_layout(true)
                    .workgroup_memory_explicit_layout_scalar_block_layout(true)
                    .workgroup_memory_explicit_layout8_bit_access(true)
                    .workgroup_memory_explicit_layout16_bit_access(true),
            );
        }
        if enabled.contains(Caps::PIPELINE_EXECUTABLE_PROPERTIES) {
            chain.pipeline_executable_properties = Some(
                vk::PhysicalDevicePipelineExecutablePropertiesFeaturesKHR::default()
                    .pipeline_executable_info(true),
            );
        }
        if enabled.contains(Caps::SUBGROUP_SIZE_CONTROL) {
            chain.subgroup_size_control = Some(
                vk::PhysicalDeviceSubgroupSizeControlFeatures::default()
                    .subgroup_size_control(true),
            );
        }
        chain
    }

    /// Null out every `p_next`, so the members can be linked again.
    pub fn detach(&mut self) {
        feature_members!(self, member => member.p_next = ptr::null_mut());
    }

    /// Link the members of `self` into the `p_next` chain of `features2`.
    pub fn add_to_features2<'a>(
        &'a mut self,
        mut features2: vk::PhysicalDeviceFeatures2<'a>,
    ) -> vk::PhysicalDeviceFeatures2<'a> {
        self.detach();
        feature_members!(self, member => features2 = features2.push_next(member));
        features2
    }

    /// Add the members of `self` into `info.enabled_features` and its `p_next` chain.
    pub fn add_to_device_create_info<'a>(
        &'a mut self,
        mut info: vk::DeviceCreateInfo<'a>,
    ) -> vk::DeviceCreateInfo<'a> {
        self.detach();
        info = info.enabled_features(&self.core);
        feature_members!(self, member => info = info.push_next(member));
        info
    }

    /// Copy the core features, and every member present in both `self` and `source`.
    ///
    /// Members `source` lacks are left untouched, which reads as "unsupported".
    pub fn fill_from(&mut self, source: &Self) {
        self.core = source.core;
        fill(&mut self.timeline_semaphore, &source.timeline_semaphore);
        fill(&mut self.storage_16bit, &source.storage_16bit);
        fill(&mut self.storage_8bit, &source.storage_8bit);
        fill(&mut self.robustness2, &source.robustness2);
        fill(&mut self.host_query_reset, &source.host_query_reset);
        fill(&mut self.variable_pointers, &source.variable_pointers);
        fill(
            &mut self.demote_to_helper_invocation,
            &source.demote_to_helper_invocation,
        );
        fill(&mut self.draw_parameters, &source.draw_parameters);
        fill(&mut self.float16_int8, &source.float16_int8);
        fill(
            &mut self.uniform_buffer_standard_layout,
            &source.uniform_buffer_standard_layout,
        );
        fill(&mut self.index_type_uint8, &source.index_type_uint8);
        fill(
            &mut self.primitive_topology_list_restart,
            &source.primitive_topology_list_restart,
        );
        fill(&mut self.transform_feedback, &source.transform_feedback);
        fill(&mut self.custom_border_color, &source.custom_border_color);
        fill(
            &mut self.extended_dynamic_state,
            &source.extended_dynamic_state,
        );
        fill(&mut self.line_rasterization, &source.line_rasterization);
        fill(&mut self.provoking_vertex, &source.provoking_vertex);
        fill(
            &mut self.vertex_input_dynamic_state,
            &source.vertex_input_dynamic_state,
        );
        fill(&mut self.shader_atomic_int64, &source.shader_atomic_int64);
        fill(
            &mut self.workgroup_memory_explicit_layout,
            &source.workgroup_memory_explicit_layout,
        );
        fill(
            &mut self.pipeline_executable_properties,
            &source.pipeline_executable_properties,
        );
        fill(&mut self.subgroup_size_control, &source.subgroup_size_control);
        self.detach();
    }

    /// Capabilities whose every feature bit is reported by the queried members.
    fn supported(&self) -> Caps {
        let mut caps = Caps::empty();
        if let Some(ref f) = self.float16_int8 {
            caps.set(Caps::SHADER_FLOAT16, map_bool(f.shader_float16));
            caps.set(Caps::SHADER_INT8, map_bool(f.shader_int8));
        }
        if let Some(ref f) = self.uniform_buffer_standard_layout {
            caps.set(
                Caps::UNIFORM_BUFFER_STANDARD_LAYOUT,
                map_bool(f.uniform_buffer_standard_layout),
            );
        }
        if let Some(ref f) = self.index_type_uint8 {
            caps.set(Caps::INDEX_TYPE_UINT8, map_bool(f.index_type_uint8));
        }
        if let Some(ref f) = self.primitive_topology_list_restart {
            caps.set(
                Caps::TOPOLOGY_LIST_RESTART,
                map_bool(f.primitive_topology_list_restart),
            );
            caps.set(
                Caps::PATCH_LIST_RESTART,
                map_bool(f.primitive_topology_patch_list_restart),
            );
        }
        if let Some(ref f) = self.transform_feedback {
            caps.set(
                Caps::TRANSFORM_FEEDBACK,
                map_bool(f.transform_feedback) && map_bool(f.geometry_streams),
            );
        }
        if let Some(ref f) = self.custom_border_color {
            caps.set(
                Caps::CUSTOM_BORDER_COLOR,
                map_bool(f.custom_border_colors) && map_bool(f.custom_border_color_without_format),
            );
        }
        if let Some(ref f) = self.extended_dynamic_state {
            caps.set(
                Caps::EXTENDED_DYNAMIC_STATE,
                map_bool(f.extended_dynamic_state),
            );
        }
        if let Some(ref f) = self.line_rasterization {
            caps.set(
                Caps::LINE_RASTERIZATION,
                map_bool(f.rectangular_lines) && map_bool(f.smooth_lines),
            );
        }
        if let Some(ref f) = self.provoking_vertex {
            caps.set(
                Caps::PROVOKING_VERTEX,
                map_bool(f.provoking_vertex_last)
                    && map_bool(f.transform_feedback_preserves_provoking_vertex),
            );
        }
        if let Some(ref f) = self.vertex_input_dynamic_state {
            caps.set(
                Caps::VERTEX_INPUT_DYNAMIC_STATE,
                map_bool(f.vertex_input_dynamic_state),
            );
        }
        if let Some(ref f) = self.shader_atomic_int64 {
            caps.set(
                Caps::SHADER_ATOMIC_INT64,
                map_bool(f.shader_buffer_int64_atomics) && map_bool(f.shader_shared_int64_atomics),
            );
        }
        if let Some(ref f) = self.workgroup_memory_explicit_layout {
            caps.set(
                Caps::WORKGROUP_MEMORY_EXPLICIT_LAYOUT,
                map_bool(f.workgroup_memory_explicit_layout)
                    && map_bool(f.workgroup_memory_explicit_layout_scalar_block_layout)
                    && map_bool(f.workgroup_memory_explicit_layout8_bit_access)
                    && map_bool(f.workgroup_memory_explicit_layout16_bit_access),
            );
        }
        if let Some(ref f) = self.pipeline_executable_properties {
            caps.set(
                Caps::PIPELINE_EXECUTABLE_PROPERTIES,
                map_bool(f.pipeline_executable_info),
            );
        }
        if let Some(ref f) = self.subgroup_size_control {
            caps.set(
                Caps::SUBGROUP_SIZE_CONTROL,
                map_bool(f.subgroup_size_control),
            );
        }
        caps
    }

    /// Capabilities derived from the core features and the format table.
    fn core_supported(&self, formats: &FormatTable) -> Caps {
        let core = &self.core;
        let mut caps = Caps::empty();
        caps.set(Caps::DEPTH_BOUNDS, map_bool(core.depth_bounds));
        caps.set(
            Caps::FORMATLESS_IMAGE_LOAD,
            map_bool(core.shader_storage_image_read_without_format),
        );
        caps.set(Caps::SHADER_FLOAT64, map_bool(core.shader_float64));
        caps.set(Caps::SHADER_INT64, map_bool(core.shader_int64));
        caps.set(Caps::SHADER_INT16, map_bool(core.shader_int16));
        caps.set(
            Caps::SHADER_STORAGE_IMAGE_MULTISAMPLE,
            map_bool(core.shader_storage_image_multisample),
        );

        let optimal_has = |format, usage| {
            formats
                .features(format, vkt::FormatType::Optimal)
                .map_or(false, |flags| flags.contains(usage))
        };
        let blit = vk::FormatFeatureFlags::BLIT_SRC | vk::FormatFeatureFlags::BLIT_DST;
        caps.set(
            Caps::BLIT_DEPTH_STENCIL,
            optimal_has(vk::Format::D32_SFLOAT_S8_UINT, blit)
                && optimal_has(vk::Format::D24_UNORM_S8_UINT, blit),
        );
        caps.set(
            Caps::OPTIMAL_ASTC,
            map_bool(core.texture_compression_astc_ldr)
                && super::format::ASTC_FORMATS
                    .iter()
                    .all(|&format| optimal_has(format, astc_required_flags())),
        );
        caps.set(
            Caps::DEPTH24_ATTACHMENT,
            optimal_has(
                vk::Format::D24_UNORM_S8_UINT,
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ),
        );
        caps
    }
}

/// Aggregate of the `vk::PhysicalDevice*Properties` structs negotiation uses.
#[derive(Clone, Debug, Default)]
pub struct PropertyChain {
    pub driver: Option<vk::PhysicalDeviceDriverProperties<'static>>,
    pub float_controls: Option<vk::PhysicalDeviceFloatControlsProperties<'static>>,
    pub subgroup_size_control: Option<vk::PhysicalDeviceSubgroupSizeControlProperties<'static>>,
    pub transform_feedback: Option<vk::PhysicalDeviceTransformFeedbackPropertiesEXT<'static>>,
    pub push_descriptor: Option<vk::PhysicalDevicePushDescriptorPropertiesKHR<'static>>,
    /// Only queried to tell GPU generations apart.
    pub fragment_shading_rate: Option<vk::PhysicalDeviceFragmentShadingRatePropertiesKHR<'static>>,
}

// This is safe because the structs have `p_next: *mut c_void`, which we null out/never read.
unsafe impl Send for PropertyChain {}
unsafe impl Sync for PropertyChain {}

impl PropertyChain {
    fn for_capabilities(capabilities: Caps, inventory: &Inventory) -> Self {
        let mut chain = Self {
            float_controls: Some(Default::default()),
            ..Default::default()
        };
        if capabilities.contains(Caps::SUBGROUP_SIZE_CONTROL) {
            chain.subgroup_size_control = Some(Default::default());
        }
        if capabilities.contains(Caps::TRANSFORM_FEEDBACK) {
            chain.transform_feedback = Some(Default::default());
        }
        if capabilities.contains(Caps::PUSH_DESCRIPTOR) {
            chain.push_descriptor = Some(Default::default());
        }
        if inventory.supports_extension(khr::fragment_shading_rate::NAME) {
            chain.fragment_shading_rate = Some(Default::default());
        }
        chain
    }

    pub fn detach(&mut self) {
        property_members!(self, member => member.p_next = ptr::null_mut());
    }

    /// Link the members of `self` into the `p_next` chain of `properties2`.
    pub fn add_to_properties2<'a>(
        &'a mut self,
        mut properties2: vk::PhysicalDeviceProperties2<'a>,
    ) -> vk::PhysicalDeviceProperties2<'a> {
        self.detach();
        property_members!(self, member => properties2 = properties2.push_next(member));
        properties2
    }

    /// Copy every member present in both `self` and `source`.
    pub fn fill_from(&mut self, source: &Self) {
        fill(&mut self.driver, &source.driver);
        fill(&mut self.float_controls, &source.float_controls);
        fill(&mut self.subgroup_size_control, &source.subgroup_size_control);
        fill(&mut self.transform_feedback, &source.transform_feedback);
        fill(&mut self.push_descriptor, &source.push_descriptor);
        fill(&mut self.fragment_shading_rate, &source.fragment_shading_rate);
        self.detach();
    }

    /// Capabilities among `candidates` whose property requirements hold.
    ///
    /// Capabilities without property requirements pass through.
    fn filter(&self, candidates: Caps) -> Caps {
        let mut caps = candidates;
        if candidates.contains(Caps::SUBGROUP_SIZE_CONTROL) {
            let fits = self.subgroup_size_control.map_or(false, |p| {
                p.min_subgroup_size <= GUEST_WARP_SIZE && GUEST_WARP_SIZE <= p.max_subgroup_size
            });
            caps.set(Caps::SUBGROUP_SIZE_CONTROL, fits);
        }
        if candidates.contains(Caps::TRANSFORM_FEEDBACK) {
            let usable = self.transform_feedback.map_or(false, |p| {
                p.max_transform_feedback_streams >= 4
                    && p.max_transform_feedback_buffers > 0
                    && map_bool(p.transform_feedback_queries)
                    && map_bool(p.transform_feedback_draw)
            });
            caps.set(Caps::TRANSFORM_FEEDBACK, usable);
        }
        if candidates.contains(Caps::PUSH_DESCRIPTOR) {
            let usable = self
                .push_descriptor
                .map_or(false, |p| p.max_push_descriptors > 0);
            caps.set(Caps::PUSH_DESCRIPTOR, usable);
        }
        caps
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Probe {
    /// The extension has no feature or property of its own.
    Presence,
    Features,
    Properties,
    FeaturesAndProperties,
}

/// An optional device extension and what it provides.
struct OptionalExtension {
    name: &'static CStr,
    /// Another extension that has to be present, and is enabled along.
    companion: Option<&'static CStr>,
    capabilities: Caps,
    probe: Probe,
    /// Only negotiated when all of these flags are configured.
    gate: vkt::DeviceFlags,
    /// What the renderer does without, for the log.
    missing: &'static str,
}

impl OptionalExtension {
    const fn new(name: &'static CStr, capabilities: Caps, probe: Probe, missing: &'static str) -> Self {
        Self {
            name,
            companion: None,
            capabilities,
            probe,
            gate: vkt::DeviceFlags::empty(),
            missing,
        }
    }

    const fn gated(mut self, gate: vkt::DeviceFlags) -> Self {
        self.gate = gate;
        self
    }

    const fn with_companion(mut self, companion: &'static CStr) -> Self {
        self.companion = Some(companion);
        self
    }

    fn is_present(&self, inventory: &Inventory) -> bool {
        inventory.supports_extension(self.name)
            && self
                .companion
                .map_or(true, |name| inventory.supports_extension(name))
    }
}

const OPTIONAL_EXTENSIONS: &[OptionalExtension] = &[
    OptionalExtension::new(
        khr::shader_float16_int8::NAME,
        Caps::SHADER_FLOAT16.union(Caps::SHADER_INT8),
        Probe::Features,
        "float16 and int8 shader math natively",
    ),
    OptionalExtension::new(
        ext::subgroup_size_control::NAME,
        Caps::SUBGROUP_SIZE_CONTROL,
        Probe::FeaturesAndProperties,
        "the guest warp size",
    ),
    OptionalExtension::new(
        ext::provoking_vertex::NAME,
        Caps::PROVOKING_VERTEX,
        Probe::Features,
        "the last-vertex provoking convention",
    ),
    OptionalExtension::new(
        ext::vertex_input_dynamic_state::NAME,
        Caps::VERTEX_INPUT_DYNAMIC_STATE,
        Probe::Features,
        "vertex input dynamic state",
    ),
    OptionalExtension::new(
        khr::shader_atomic_int64::NAME,
        Caps::SHADER_ATOMIC_INT64,
        Probe::Features,
        "64-bit integer atomics",
    ),
    OptionalExtension::new(
        ext::transform_feedback::NAME,
        Caps::TRANSFORM_FEEDBACK,
        Probe::FeaturesAndProperties,
        "transform feedback",
    ),
    OptionalExtension::new(
        ext::custom_border_color::NAME,
        Caps::CUSTOM_BORDER_COLOR,
        Probe::Features,
        "custom border colors",
    ),
    OptionalExtension::new(
        ext::extended_dynamic_state::NAME,
        Caps::EXTENDED_DYNAMIC_STATE,
        Probe::Features,
        "extended dynamic state",
    ),
    OptionalExtension::new(
        ext::line_rasterization::NAME,
        Caps::LINE_RASTERIZATION,
        Probe::Features,
        "smooth lines",
    ),
    OptionalExtension::new(
        khr::workgroup_memory_explicit_layout::NAME,
        Caps::WORKGROUP_MEMORY_EXPLICIT_LAYOUT,
        Probe::Features,
        "explicit workgroup memory layouts",
    ),
    OptionalExtension::new(
        khr::pipeline_executable_properties::NAME,
        Caps::PIPELINE_EXECUTABLE_PROPERTIES,
        Probe::Features,
        "pipeline executable properties",
    )
    .gated(vkt::DeviceFlags::SHADER_FEEDBACK),
    OptionalExtension::new(
        ext::primitive_topology_list_restart::NAME,
        Caps::TOPOLOGY_LIST_RESTART.union(Caps::PATCH_LIST_RESTART),
        Probe::Features,
        "primitive restart for list topologies",
    ),
    OptionalExtension::new(
        ext::index_type_uint8::NAME,
        Caps::INDEX_TYPE_UINT8,
        Probe::Features,
        "8-bit indices",
    ),
    OptionalExtension::new(
        khr::uniform_buffer_standard_layout::NAME,
        Caps::UNIFORM_BUFFER_STANDARD_LAYOUT,
        Probe::Features,
        "standard uniform buffer layouts",
    ),
    OptionalExtension::new(
        khr::push_descriptor::NAME,
        Caps::PUSH_DESCRIPTOR,
        Probe::Properties,
        "push descriptors",
    ),
    OptionalExtension::new(
        nv::viewport_swizzle::NAME,
        Caps::VIEWPORT_SWIZZLE,
        Probe::Presence,
        "viewport swizzles",
    ),
    OptionalExtension::new(
        nv::viewport_array2::NAME,
        Caps::VIEWPORT_MASK,
        Probe::Presence,
        "viewport masks",
    ),
    OptionalExtension::new(
        nv::geometry_shader_passthrough::NAME,
        Caps::GEOMETRY_SHADER_PASSTHROUGH,
        Probe::Presence,
        "passthrough geometry shaders",
    ),
    OptionalExtension::new(
        khr::spirv_1_4::NAME,
        Caps::SPIRV_1_4,
        Probe::Presence,
        "SPIR-V 1.4",
    ),
    OptionalExtension::new(
        ext::depth_range_unrestricted::NAME,
        Caps::DEPTH_RANGE_UNRESTRICTED,
        Probe::Presence,
        "unrestricted depth ranges",
    ),
    OptionalExtension::new(
        ext::sampler_filter_minmax::NAME,
        Caps::SAMPLER_FILTER_MINMAX,
        Probe::Presence,
        "depth min/max filters",
    ),
    OptionalExtension::new(
        ext::shader_viewport_index_layer::NAME,
        Caps::SHADER_VIEWPORT_INDEX_LAYER,
        Probe::Presence,
        "viewport index and layer outside of geometry shaders",
    ),
    OptionalExtension::new(
        ext::tooling_info::NAME,
        Caps::TOOLING_INFO,
        Probe::Presence,
        "tooling info",
    ),
    OptionalExtension::new(
        ext::shader_stencil_export::NAME,
        Caps::SHADER_STENCIL_EXPORT,
        Probe::Presence,
        "stencil export",
    ),
    OptionalExtension::new(
        ext::conservative_rasterization::NAME,
        Caps::CONSERVATIVE_RASTERIZATION,
        Probe::Presence,
        "conservative rasterization",
    ),
    OptionalExtension::new(
        ext::memory_budget::NAME,
        Caps::MEMORY_BUDGET,
        Probe::Presence,
        "memory budget queries",
    ),
    OptionalExtension::new(
        nv::device_diagnostics_config::NAME,
        Caps::DEVICE_DIAGNOSTICS_CONFIG,
        Probe::Presence,
        "device diagnostics",
    )
    .gated(vkt::DeviceFlags::DEVICE_DIAGNOSTICS),
    OptionalExtension::new(
        khr::swapchain_mutable_format::NAME,
        Caps::SWAPCHAIN_MUTABLE_FORMAT,
        Probe::Presence,
        "mutable swapchain formats",
    )
    .with_companion(khr::image_format_list::NAME),
];

/// Names of every optional extension negotiation may enable.
pub fn optional_extension_names() -> impl Iterator<Item = &'static CStr> {
    OPTIONAL_EXTENSIONS
        .iter()
        .flat_map(|optional| std::iter::once(optional.name).chain(optional.companion))
}

/// Where negotiation left an optional capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapabilityState {
    /// Not negotiated, its configuration switch is off.
    Unchecked,
    ExtensionAbsent,
    /// Probed, and the driver reported a required bit as unsupported.
    Unsupported,
    /// Supported, but turned off by a quirk or a missing dependency.
    Disabled,
    Enabled,
}

/// Which stage each optional capability made it through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CapabilityReport {
    /// Capabilities whose configuration switch is on.
    pub checked: Caps,
    /// Capabilities whose extensions are present, or that don't need one.
    pub present: Caps,
    /// Capabilities whose probe passed.
    pub probed: Caps,
    pub enabled: Caps,
}

impl CapabilityReport {
    pub fn state(&self, capability: Caps) -> CapabilityState {
        if !self.checked.contains(capability) {
            CapabilityState::Unchecked
        } else if !self.present.contains(capability) {
            CapabilityState::ExtensionAbsent
        } else if !self.probed.contains(capability) {
            CapabilityState::Unsupported
        } else if !self.enabled.contains(capability) {
            CapabilityState::Disabled
        } else {
            CapabilityState::Enabled
        }
    }
}

/// The outcome of optional capability negotiation, before device creation.
#[derive(Debug)]
pub struct Negotiated {
    /// Every extension to enable at creation, mandatory ones first.
    pub extensions: Vec<&'static CStr>,
    /// The chained feature request for creation.
    pub features: FeatureChain,
    pub properties: PropertyChain,
    pub report: CapabilityReport,
    /// Workarounds set by probe phase rules.
    pub workarounds: Workarounds,
    pub diagnostics: Option<vk::DeviceDiagnosticsConfigFlagsNV>,
    pub nvidia_architecture: Option<NvidiaArchitecture>,
    /// The device may run subgroups wider than the guest warp.
    pub is_warp_potentially_bigger: bool,
    /// Stages that can require the guest warp size as their subgroup size.
    pub guest_warp_stages: vk::ShaderStageFlags,
}

impl Negotiated {
    pub fn capabilities(&self) -> Caps {
        self.report.enabled
    }
}

/// Decide which optional capabilities to enable on `phd`.
///
/// Expects `inventory` to have passed validation. Never fails: a capability the
/// device can't provide is disabled and logged.
pub fn negotiate<P: crate::PhysicalDevice>(
    phd: &P,
    inventory: &Inventory,
    quirks: &QuirkDatabase,
    desc: &DeviceDescriptor,
) -> Negotiated {
    let mut report = CapabilityReport {
        checked: Caps::core_derived(),
        present: Caps::core_derived(),
        ..Default::default()
    };
    for optional in OPTIONAL_EXTENSIONS {
        if !desc.flags.contains(optional.gate) {
            log::debug!(
                "Skipping {:?}, not requested",
                optional.name.to_string_lossy()
            );
            continue;
        }
        report.checked |= optional.capabilities;
        if optional.is_present(inventory) {
            report.present |= optional.capabilities;
        } else {
            log::info!("Device doesn't support {}", optional.missing);
        }
    }

    let mut features = FeatureChain::for_capabilities(report.present);
    phd.features(&mut features);
    let mut properties = PropertyChain::for_capabilities(report.present, inventory);
    phd.extended_properties(&mut properties);

    let presence_only = OPTIONAL_EXTENSIONS
        .iter()
        .filter(|optional| optional.probe == Probe::Presence)
        .fold(Caps::empty(), |caps, optional| caps | optional.capabilities);
    let property_only = OPTIONAL_EXTENSIONS
        .iter()
        .filter(|optional| optional.probe == Probe::Properties)
        .fold(Caps::empty(), |caps, optional| caps | optional.capabilities);
    let feature_supported =
        features.supported() | (report.present & (presence_only | property_only));
    report.probed = properties.filter(feature_supported & report.present)
        | features.core_supported(&inventory.formats);

    for optional in OPTIONAL_EXTENSIONS {
        let lost = (optional.capabilities & report.present) - report.probed;
        if !lost.is_empty() {
            log::info!(
                "Device doesn't support {} ({:?})",
                optional.missing,
                lost
            );
        }
    }
    for (name, _) in (Caps::core_derived() - report.probed).iter_names() {
        log::info!("Device doesn't support {}", name);
    }

    let mut enabled = report.probed;
    if enabled.contains(Caps::WORKGROUP_MEMORY_EXPLICIT_LAYOUT)
        && !enabled.contains(Caps::SHADER_INT16)
    {
        log::warn!("Device doesn't support 16-bit integers, disabling explicit workgroup memory layouts");
        enabled.remove(Caps::WORKGROUP_MEMORY_EXPLICIT_LAYOUT);
    }

    let nvidia_architecture = match inventory.driver.vendor {
        vkt::DriverVendor::NvidiaProprietary => Some(NvidiaArchitecture::infer(
            &inventory.extensions,
            &properties,
        )),
        _ => None,
    };
    let context = QuirkContext {
        driver: &inventory.driver,
        extensions: &inventory.extensions,
        probed: report.probed,
        architecture: nvidia_architecture,
    };
    let outcome = quirks.evaluate(Phase::Probe, &context, enabled);
    enabled -= outcome.disabled;
    report.enabled = enabled;

    let mut extensions =
        validate::required_extensions(inventory.api_version(), desc.surface.is_some());
    for optional in OPTIONAL_EXTENSIONS {
        if optional.capabilities.intersects(enabled) {
            extensions.push(optional.name);
            extensions.extend(optional.companion);
        }
    }
    log::debug!("Enabled extensions: {:?}", extensions);

    let diagnostics = if enabled.contains(Caps::DEVICE_DIAGNOSTICS_CONFIG) {
        Some(
            vk::DeviceDiagnosticsConfigFlagsNV::ENABLE_SHADER_DEBUG_INFO
                | vk::DeviceDiagnosticsConfigFlagsNV::ENABLE_RESOURCE_TRACKING
                | vk::DeviceDiagnosticsConfigFlagsNV::ENABLE_AUTOMATIC_CHECKPOINTS,
        )
    } else {
        None
    };

    let is_warp_potentially_bigger = match properties.subgroup_size_control {
        Some(ref p) => p.max_subgroup_size > GUEST_WARP_SIZE,
        None => true,
    };
    let guest_warp_stages = match properties.subgroup_size_control {
        Some(ref p) if enabled.contains(Caps::SUBGROUP_SIZE_CONTROL) => {
            p.required_subgroup_size_stages
        }
        _ => vk::ShaderStageFlags::empty(),
    };

    Negotiated {
        extensions,
        features: FeatureChain::for_device_creation(enabled),
        properties,
        report,
        workarounds: outcome.workarounds,
        diagnostics,
        nvidia_architecture,
        is_warp_potentially_bigger,
        guest_warp_stages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_extensions_are_unique() {
        for (i, a) in OPTIONAL_EXTENSIONS.iter().enumerate() {
            for b in &OPTIONAL_EXTENSIONS[i + 1..] {
                assert_ne!(a.name, b.name);
                assert!(a.capabilities.intersection(b.capabilities).is_empty());
            }
            assert!(Caps::extension_backed().contains(a.capabilities));
        }
    }

    #[test]
    fn creation_chain_requests_only_enabled() {
        let chain = FeatureChain::for_device_creation(Caps::SHADER_INT8 | Caps::SHADER_INT16);
        let f16_i8 = chain.float16_int8.unwrap();
        assert_eq!(f16_i8.shader_float16, vk::FALSE);
        assert_eq!(f16_i8.shader_int8, vk::TRUE);
        assert_eq!(chain.core.shader_int16, vk::TRUE);
        assert_eq!(chain.core.shader_float64, vk::FALSE);
        assert!(chain.transform_feedback.is_none());
        assert_eq!(chain.robustness2.unwrap().null_descriptor, vk::TRUE);
    }

    #[test]
    fn partial_probe_keeps_independent_bits() {
        let mut chain = FeatureChain::for_capabilities(Caps::TOPOLOGY_LIST_RESTART);
        chain.primitive_topology_list_restart = Some(
            vk::PhysicalDevicePrimitiveTopologyListRestartFeaturesEXT::default()
                .primitive_topology_list_restart(true),
        );
        let caps = chain.supported();
        assert!(caps.contains(Caps::TOPOLOGY_LIST_RESTART));
        assert!(!caps.contains(Caps::PATCH_LIST_RESTART));
    }

    #[test]
    fn subgroup_size_must_bracket_guest_warp() {
        let mut chain = PropertyChain::default();
        chain.subgroup_size_control = Some(
            vk::PhysicalDeviceSubgroupSizeControlProperties::default()
                .min_subgroup_size(64)
                .max_subgroup_size(64),
        );
        assert!(chain.filter(Caps::SUBGROUP_SIZE_CONTROL).is_empty());

        chain.subgroup_size_control = Some(
            vk::PhysicalDeviceSubgroupSizeControlProperties::default()
                .min_subgroup_size(8)
                .max_subgroup_size(64),
        );
        assert_eq!(
            chain.filter(Caps::SUBGROUP_SIZE_CONTROL),
            Caps::SUBGROUP_SIZE_CONTROL
        );
    }

    #[test]
    fn report_states() {
        let report = CapabilityReport {
            checked: Caps::all() - Caps::DEVICE_DIAGNOSTICS_CONFIG,
            present: Caps::SHADER_FLOAT16 | Caps::SHADER_INT8 | Caps::PUSH_DESCRIPTOR,
            probed: Caps::SHADER_FLOAT16 | Caps::PUSH_DESCRIPTOR,
            enabled: Caps::SHADER_FLOAT16,
        };
        assert_eq!(
            report.state(Caps::DEVICE_DIAGNOSTICS_CONFIG),
            CapabilityState::Unchecked
        );
        assert_eq!(
            report.state(Caps::TRANSFORM_FEEDBACK),
            CapabilityState::ExtensionAbsent
        );
        assert_eq!(report.state(Caps::SHADER_INT8), CapabilityState::Unsupported);
        assert_eq!(report.state(Caps::PUSH_DESCRIPTOR), CapabilityState::Disabled);
        assert_eq!(report.state(Caps::SHADER_FLOAT16), CapabilityState::Enabled);
    }
}
