//! Tests for the mandatory requirement checks.

use crate::common::{open, open_valid, TestParameters};

use ash::{ext, khr, vk};
use vkcaps_hal::{empty, vulkan::required_extensions, DeviceError, NegotiationError, QueueKind};

#[test]
fn minimal_device_is_suitable() {
    let device = open_valid(empty::PhysicalDevice::new(), TestParameters::default());

    assert_eq!(
        device.enabled_extensions(),
        required_extensions(vk::API_VERSION_1_3, false).as_slice()
    );
    assert_eq!(device.queue_families().graphics, 0);
    assert_eq!(device.present_queue(), None);
    assert_eq!(device.physical().created().len(), 1);
}

#[test]
fn missing_extensions_are_reported_exactly() {
    let required = required_extensions(vk::API_VERSION_1_3, true);
    assert!(required.len() < 16);

    // Every subset of the required extensions
    for mask in 1u32..(1 << required.len()) {
        let mut phd = empty::PhysicalDevice::new();
        let mut expected = Vec::new();
        for (index, &name) in required.iter().enumerate() {
            if mask & (1 << index) != 0 {
                phd.remove_extension(name);
                expected.push(name.to_string_lossy().into_owned());
            }
        }

        let err = open(phd, TestParameters::default().surface()).unwrap_err();
        assert_eq!(err, NegotiationError::MissingRequiredExtension(expected));
        assert_eq!(err.raw_result(), vk::Result::ERROR_EXTENSION_NOT_PRESENT);
    }
}

#[test]
fn promoted_extensions_are_required_on_old_devices() {
    let mut phd = empty::PhysicalDevice::new();
    phd.properties.api_version = vk::API_VERSION_1_2;
    let err = open(phd, TestParameters::default()).unwrap_err();
    assert_eq!(
        err,
        NegotiationError::MissingRequiredExtension(vec![
            "VK_EXT_shader_demote_to_helper_invocation".to_string()
        ])
    );

    let mut phd = empty::PhysicalDevice::new();
    phd.properties.api_version = vk::API_VERSION_1_2;
    phd.add_extension(ext::shader_demote_to_helper_invocation::NAME);
    open_valid(phd, TestParameters::default());
}

#[test]
fn vulkan_1_1_needs_the_extensions_promoted_to_1_2() {
    let mut phd = empty::PhysicalDevice::new();
    phd.properties.api_version = vk::API_VERSION_1_1;
    for name in required_extensions(vk::API_VERSION_1_1, false) {
        phd.add_extension(name);
    }
    phd.remove_extension(khr::_8bit_storage::NAME);

    let err = open(phd, TestParameters::default()).unwrap_err();
    assert_eq!(
        err,
        NegotiationError::MissingRequiredExtension(vec!["VK_KHR_8bit_storage".to_string()])
    );
    assert_eq!(err.raw_result(), vk::Result::ERROR_EXTENSION_NOT_PRESENT);
}

#[test]
fn limits_at_their_minimum_pass() {
    let phd = empty::PhysicalDevice::new();
    let limits = phd.properties.limits;
    assert_eq!(limits.max_uniform_buffer_range, 65536);
    assert_eq!(limits.max_viewports, 16);
    assert_eq!(limits.max_color_attachments, 8);
    assert_eq!(limits.max_clip_distances, 8);
    open_valid(phd, TestParameters::default());
}

#[test]
fn limit_below_its_minimum_fails() {
    let cases: &[(&str, fn(&mut vk::PhysicalDeviceLimits) -> &mut u32)] = &[
        ("maxUniformBufferRange", |l| &mut l.max_uniform_buffer_range),
        ("maxViewports", |l| &mut l.max_viewports),
        ("maxColorAttachments", |l| &mut l.max_color_attachments),
        ("maxClipDistances", |l| &mut l.max_clip_distances),
    ];
    for &(name, limit) in cases {
        let mut phd = empty::PhysicalDevice::new();
        let minimum = *limit(&mut phd.properties.limits);
        *limit(&mut phd.properties.limits) -= 1;

        match open(phd, TestParameters::default()).unwrap_err() {
            NegotiationError::InsufficientLimit(violations) => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].name, name);
                assert_eq!(violations[0].minimum, minimum);
                assert_eq!(violations[0].actual, minimum - 1);
                assert_eq!(
                    violations[0].to_string(),
                    format!(
                        "{} has to be {} or greater but it is {}",
                        name,
                        minimum,
                        minimum - 1
                    )
                );
            }
            other => panic!("unexpected error for {}: {:?}", name, other),
        }
    }
}

#[test]
fn every_low_limit_is_reported() {
    let mut phd = empty::PhysicalDevice::new();
    phd.properties.limits.max_viewports = 1;
    phd.properties.limits.max_clip_distances = 0;
    match open(phd, TestParameters::default()).unwrap_err() {
        NegotiationError::InsufficientLimit(violations) => {
            let names = violations.iter().map(|v| v.name).collect::<Vec<_>>();
            assert_eq!(names, ["maxViewports", "maxClipDistances"]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn missing_features_are_reported_together() {
    let mut phd = empty::PhysicalDevice::new();
    phd.features.core.wide_lines = vk::FALSE;
    phd.features.robustness2.as_mut().unwrap().null_descriptor = vk::FALSE;

    let err = open(phd, TestParameters::default()).unwrap_err();
    assert_eq!(
        err,
        NegotiationError::MissingRequiredFeature(vec!["wideLines", "nullDescriptor"])
    );
    assert_eq!(err.raw_result(), vk::Result::ERROR_FEATURE_NOT_PRESENT);
}

#[test]
fn missing_feature_structure_reads_as_unsupported() {
    let mut phd = empty::PhysicalDevice::new();
    phd.features.host_query_reset = None;
    let err = open(phd, TestParameters::default()).unwrap_err();
    assert_eq!(
        err,
        NegotiationError::MissingRequiredFeature(vec!["hostQueryReset"])
    );
}

#[test]
fn first_failing_category_wins() {
    let mut phd = empty::PhysicalDevice::new();
    phd.remove_extension(ext::robustness2::NAME);
    phd.properties.limits.max_viewports = 0;
    phd.features.core.logic_op = vk::FALSE;

    let err = open(phd, TestParameters::default()).unwrap_err();
    assert_eq!(
        err,
        NegotiationError::MissingRequiredExtension(vec!["VK_EXT_robustness2".to_string()])
    );

    let mut phd = empty::PhysicalDevice::new();
    phd.properties.limits.max_viewports = 0;
    phd.features.core.logic_op = vk::FALSE;
    assert!(matches!(
        open(phd, TestParameters::default()),
        Err(NegotiationError::InsufficientLimit(_))
    ));
}

#[test]
fn features_are_checked_before_queues() {
    let mut phd = empty::PhysicalDevice::new();
    phd.features.core.geometry_shader = vk::FALSE;
    phd.queue_families.clear();
    // The feature check fails before queue selection is reached
    assert!(matches!(
        open(phd, TestParameters::default()),
        Err(NegotiationError::MissingRequiredFeature(_))
    ));
}

#[test]
fn creation_errors_keep_their_status_code() {
    for (error, result) in [
        (DeviceError::Lost, vk::Result::ERROR_DEVICE_LOST),
        (DeviceError::OutOfMemory, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
        (
            DeviceError::Unexpected(vk::Result::ERROR_INITIALIZATION_FAILED),
            vk::Result::ERROR_INITIALIZATION_FAILED,
        ),
    ] {
        let mut phd = empty::PhysicalDevice::new();
        phd.creation_error = Some(error.clone());
        let err = open(phd, TestParameters::default()).unwrap_err();
        assert_eq!(err, NegotiationError::Device(error));
        assert_eq!(err.raw_result(), result);
    }
    assert_eq!(
        NegotiationError::NoSuitableQueueFamily(QueueKind::Present).raw_result(),
        vk::Result::ERROR_FEATURE_NOT_PRESENT
    );
}
