//! Tests for driver quirks applied during negotiation.

use crate::common::{
    applied_rules, nvidia_version, open_valid, standard_version, TestParameters,
};

use ash::{ext, khr, nv, vk};
use vkcaps_hal::{
    empty,
    vulkan::{
        Action, CapabilityState, Condition, NvidiaArchitecture, Phase, QuirkRule, VersionRange,
    },
    QuirkDatabase,
};
use vkt::{Capabilities as Caps, DriverVendor, DriverVersion};

fn nvidia(raw_version: u32) -> empty::PhysicalDevice {
    empty::PhysicalDevice::new()
        .with_all_optional()
        .with_driver(vk::DriverId::NVIDIA_PROPRIETARY, raw_version)
}

fn ampere(mut phd: empty::PhysicalDevice) -> empty::PhysicalDevice {
    phd.add_extension(khr::fragment_shading_rate::NAME);
    phd.extended_properties
        .fragment_shading_rate
        .as_mut()
        .unwrap()
        .primitive_fragment_shading_rate_with_multiple_viewports = vk::TRUE;
    phd
}

#[test]
fn refinement_keeps_the_created_extensions() {
    let device = open_valid(ampere(nvidia(nvidia_version(470, 0))), TestParameters::default());

    assert_eq!(
        device.nvidia_architecture(),
        Some(NvidiaArchitecture::AmpereOrNewer)
    );
    assert!(device.negotiated_capabilities().contains(Caps::SHADER_FLOAT16));
    assert!(!device.capabilities().contains(Caps::SHADER_FLOAT16));
    assert!(!device.is_float16_supported());
    assert!(device.is_int8_supported());
    assert_eq!(
        device.capability_state(Caps::SHADER_FLOAT16),
        CapabilityState::Disabled
    );

    // The device was created before the refinement, with float16 enabled
    assert!(device
        .enabled_extensions()
        .contains(&khr::shader_float16_int8::NAME));
    let created = device.physical().created();
    let created = &created[0];
    assert!(created
        .extensions
        .iter()
        .any(|name| name.as_c_str() == khr::shader_float16_int8::NAME));
    assert_eq!(
        created.features.float16_int8.unwrap().shader_float16,
        vk::TRUE
    );
    assert!(!device.cant_blit_msaa());
}

#[test]
fn nvidia_architectures() {
    let device = open_valid(nvidia(nvidia_version(470, 0)), TestParameters::default());
    assert_eq!(
        device.nvidia_architecture(),
        Some(NvidiaArchitecture::VoltaOrOlder)
    );
    assert!(!device.is_push_descriptor_supported());
    assert_eq!(device.max_push_descriptors(), 0);
    assert!(device.is_float16_supported());
    // Retracted after creation, the extension stays enabled
    assert!(device
        .enabled_extensions()
        .contains(&khr::push_descriptor::NAME));

    let mut phd = nvidia(nvidia_version(470, 0));
    phd.add_extension(nv::shading_rate_image::NAME);
    let device = open_valid(phd, TestParameters::default());
    assert_eq!(device.nvidia_architecture(), Some(NvidiaArchitecture::Turing));
    assert!(device.is_push_descriptor_supported());
    assert!(device.is_float16_supported());

    // Not an NVIDIA driver, nothing to infer
    let device = open_valid(
        ampere(empty::PhysicalDevice::new().with_all_optional()),
        TestParameters::default(),
    );
    assert_eq!(device.nvidia_architecture(), None);
    assert!(device.is_float16_supported());
}

#[test]
fn nvidia_msaa_blit_version_cutoff() {
    let device = open_valid(ampere(nvidia(nvidia_version(509, 99))), TestParameters::default());
    assert!(!device.cant_blit_msaa());
    let device = open_valid(ampere(nvidia(nvidia_version(510, 0))), TestParameters::default());
    assert!(device.cant_blit_msaa());
}

#[test]
fn quirks_are_vendor_scoped() {
    let raw_version = standard_version(21, 1, 0);

    let radv = open_valid(
        empty::PhysicalDevice::new()
            .with_all_optional()
            .with_driver(vk::DriverId::MESA_RADV, raw_version),
        TestParameters::default(),
    );
    assert_eq!(
        radv.capability_state(Caps::EXTENDED_DYNAMIC_STATE),
        CapabilityState::Disabled
    );
    assert!(!radv
        .enabled_extensions()
        .contains(&ext::extended_dynamic_state::NAME));

    // Same raw version, another driver
    let amd = open_valid(
        empty::PhysicalDevice::new()
            .with_all_optional()
            .with_driver(vk::DriverId::AMD_PROPRIETARY, raw_version),
        TestParameters::default(),
    );
    assert!(amd.supports(Caps::EXTENDED_DYNAMIC_STATE));
    assert!(amd
        .enabled_extensions()
        .contains(&ext::extended_dynamic_state::NAME));

    let newer = open_valid(
        empty::PhysicalDevice::new()
            .with_all_optional()
            .with_driver(vk::DriverId::MESA_RADV, standard_version(21, 2, 0)),
        TestParameters::default(),
    );
    assert!(newer.supports(Caps::EXTENDED_DYNAMIC_STATE));
}

#[test]
fn radv_rdna2_vertex_input() {
    let radv = || {
        empty::PhysicalDevice::new()
            .with_all_optional()
            .with_driver(vk::DriverId::MESA_RADV, standard_version(22, 0, 0))
    };
    let device = open_valid(radv(), TestParameters::default());
    assert!(device.supports(Caps::VERTEX_INPUT_DYNAMIC_STATE));

    let mut phd = radv();
    phd.add_extension(khr::fragment_shading_rate::NAME);
    let device = open_valid(phd, TestParameters::default());
    assert!(!device.supports(Caps::VERTEX_INPUT_DYNAMIC_STATE));
    assert!(!device
        .enabled_extensions()
        .contains(&ext::vertex_input_dynamic_state::NAME));
    assert!(device.supports(Caps::EXTENDED_DYNAMIC_STATE));
}

#[test]
fn amd_behavior_changes() {
    let amd = open_valid(
        empty::PhysicalDevice::new()
            .with_all_optional()
            .with_driver(vk::DriverId::AMD_PROPRIETARY, 0),
        TestParameters::default(),
    );
    assert_eq!(amd.sets_per_pool(), 96);
    assert!(!amd.has_broken_cube_image_compatibility());
    assert!(amd.supports(Caps::SAMPLER_FILTER_MINMAX));

    // Without float16, the device is GCN4 or older
    let mut phd = empty::PhysicalDevice::new()
        .with_all_optional()
        .with_driver(vk::DriverId::AMD_OPEN_SOURCE, 0);
    phd.features.float16_int8.as_mut().unwrap().shader_float16 = vk::FALSE;
    let gcn4 = open_valid(phd, TestParameters::default());
    assert!(gcn4.has_broken_cube_image_compatibility());
    assert_eq!(
        gcn4.capability_state(Caps::SAMPLER_FILTER_MINMAX),
        CapabilityState::Disabled
    );
    assert!(!gcn4
        .enabled_extensions()
        .contains(&ext::sampler_filter_minmax::NAME));

    let arm = open_valid(
        empty::PhysicalDevice::new().with_all_optional(),
        TestParameters::default(),
    );
    assert_eq!(arm.sets_per_pool(), 64);
    assert!(arm.workarounds().is_empty());
}

#[test]
fn intel_drivers() {
    let windows = open_valid(
        empty::PhysicalDevice::new()
            .with_all_optional()
            .with_driver(vk::DriverId::INTEL_PROPRIETARY_WINDOWS, 100 << 14),
        TestParameters::default(),
    );
    assert!(!windows.supports(Caps::VERTEX_INPUT_DYNAMIC_STATE));
    assert!(!windows.is_float16_supported());
    assert!(windows.cant_blit_msaa());
    assert!(windows
        .enabled_extensions()
        .contains(&khr::shader_float16_int8::NAME));

    let anv = open_valid(
        empty::PhysicalDevice::new()
            .with_all_optional()
            .with_driver(vk::DriverId::INTEL_OPEN_SOURCE_MESA, standard_version(22, 0, 0)),
        TestParameters::default(),
    );
    assert!(anv.must_emulate_bgr565());
    assert!(anv.supports(Caps::VERTEX_INPUT_DYNAMIC_STATE));
    assert!(anv.is_float16_supported());
}

#[test]
fn empty_database_applies_nothing() {
    let device = open_valid(
        ampere(nvidia(nvidia_version(515, 0))),
        TestParameters::default().quirks(QuirkDatabase::empty()),
    );
    assert!(device.is_float16_supported());
    assert!(!device.cant_blit_msaa());
    assert_eq!(device.capabilities(), device.negotiated_capabilities());
}

#[test]
fn custom_rules() {
    let rules = vec![
        QuirkRule {
            reason: "test driver loses custom border colors",
            drivers: &[DriverVendor::ArmProprietary],
            versions: VersionRange::below(DriverVersion::new(2, 0, 0)),
            condition: Condition::ExtensionPresent(ext::custom_border_color::NAME),
            phase: Phase::Probe,
            action: Action::Disable(Caps::CUSTOM_BORDER_COLOR),
        },
        QuirkRule {
            reason: "test driver wants more sets",
            drivers: &[DriverVendor::ArmProprietary],
            versions: VersionRange::ANY,
            condition: Condition::Always,
            phase: Phase::Refine,
            action: Action::DescriptorSetsPerPool(128),
        },
        QuirkRule {
            reason: "test driver wants fewer sets",
            drivers: &[DriverVendor::ArmProprietary],
            versions: VersionRange::ANY,
            condition: Condition::Always,
            phase: Phase::Refine,
            action: Action::DescriptorSetsPerPool(16),
        },
    ];
    let quirks = QuirkDatabase::new(rules);

    let device = open_valid(
        empty::PhysicalDevice::new()
            .with_all_optional()
            .with_driver(vk::DriverId::ARM_PROPRIETARY, standard_version(1, 5, 0)),
        TestParameters::default().quirks(quirks.clone()),
    );
    assert_eq!(
        device.capability_state(Caps::CUSTOM_BORDER_COLOR),
        CapabilityState::Disabled
    );
    assert!(!device
        .enabled_extensions()
        .contains(&ext::custom_border_color::NAME));
    assert_eq!(device.sets_per_pool(), 128);
    assert_eq!(
        applied_rules(&device, &quirks, Phase::Refine, device.capabilities()),
        ["test driver wants more sets", "test driver wants fewer sets"]
    );

    let device = open_valid(
        empty::PhysicalDevice::new()
            .with_all_optional()
            .with_driver(vk::DriverId::ARM_PROPRIETARY, standard_version(2, 0, 0)),
        TestParameters::default().quirks(quirks),
    );
    assert!(device.supports(Caps::CUSTOM_BORDER_COLOR));
}
