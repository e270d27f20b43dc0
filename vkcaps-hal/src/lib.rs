/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

/*! This library negotiates the capabilities of a Vulkan physical device.
 *  It turns whatever a host driver reports into one immutable snapshot
 *  that a renderer can treat as ground truth, with the following rules:
 *  - Mandatory extensions, features and limits are validated exhaustively.
 *  - Optional capabilities are probed one by one, never enabled optimistically.
 *  - Known driver bugs live in a declarative quirk table, not in branches.
 *  - The native API is reached through the `PhysicalDevice` trait only.
 *  - Every failure is itemized in the log before it is returned.
 */

#![allow(
    // We don't use syntax sugar where it's not necessary.
    clippy::match_like_matches_macro,
    // Redundant matching is more explicit.
    clippy::redundant_pattern_matching,
    // Explicit lifetimes are often easier to reason about.
    clippy::needless_lifetimes,
    // No need for defaults in the internal types.
    clippy::new_without_default,
)]
#![warn(
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_qualifications,
    // We don't match on a reference, unless required.
    clippy::pattern_type_mismatch,
)]

mod auxil;
pub mod empty;
pub mod vulkan;

use std::{
    ffi::{CStr, CString},
    fmt,
};

use ash::vk;
use thiserror::Error;

pub use vulkan::{
    Device, DeviceDescriptor, FeatureChain, HeapBudget, PropertyChain, QuirkDatabase, Workarounds,
};

#[derive(Clone, Debug, PartialEq, Error)]
pub enum DeviceError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("device is lost")]
    Lost,
    #[error("driver returned {0}")]
    Unexpected(vk::Result),
}

impl DeviceError {
    /// The native status code this error stands for.
    pub fn raw_result(&self) -> vk::Result {
        match *self {
            Self::OutOfMemory => vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            Self::Lost => vk::Result::ERROR_DEVICE_LOST,
            Self::Unexpected(result) => result,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Graphics,
    Present,
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Self::Graphics => "graphics",
            Self::Present => "present",
        })
    }
}

/// A device limit below the value the renderer depends on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LimitViolation {
    pub name: &'static str,
    pub minimum: u32,
    pub actual: u32,
}

impl fmt::Display for LimitViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} has to be {} or greater but it is {}",
            self.name, self.minimum, self.actual
        )
    }
}

/// Reasons a physical device can't be turned into a [`Device`].
///
/// None of these are recoverable for the physical device that produced them;
/// the caller may try another one.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum NegotiationError {
    #[error("missing required extensions: {0:?}")]
    MissingRequiredExtension(Vec<String>),
    #[error("device limits are too low: {0:?}")]
    InsufficientLimit(Vec<LimitViolation>),
    #[error("missing required features: {0:?}")]
    MissingRequiredFeature(Vec<&'static str>),
    #[error("device lacks a {0} queue")]
    NoSuitableQueueFamily(QueueKind),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl NegotiationError {
    /// The native status code this error is reported with.
    pub fn raw_result(&self) -> vk::Result {
        match *self {
            Self::MissingRequiredExtension(_) => vk::Result::ERROR_EXTENSION_NOT_PRESENT,
            Self::InsufficientLimit(_)
            | Self::MissingRequiredFeature(_)
            | Self::NoSuitableQueueFamily(_) => vk::Result::ERROR_FEATURE_NOT_PRESENT,
            Self::Device(ref error) => error.raw_result(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum FormatError {
    #[error("format {format:?} with usage {usage:?} and type {format_type:?} has no usable alternative")]
    Unresolvable {
        format: vk::Format,
        usage: vk::FormatFeatureFlags,
        format_type: vkt::FormatType,
    },
}

/// Everything needed to create the logical device once negotiation is done.
pub struct DeviceCreateDesc<'a> {
    /// Unique queue family indices, one queue with priority 1.0 is created in each.
    pub queue_families: &'a [u32],
    pub extensions: &'a [&'static CStr],
    pub features: &'a mut FeatureChain,
    /// Vendor diagnostics requested at creation, if negotiated.
    pub diagnostics: Option<vk::DeviceDiagnosticsConfigFlagsNV>,
}

/// The queries negotiation issues against a physical device.
///
/// All of them are synchronous, and deterministic for a given physical device,
/// except for the budget counters of [`PhysicalDevice::memory_properties`].
pub trait PhysicalDevice {
    type Device: LogicalDevice;

    fn properties(&self) -> vk::PhysicalDeviceProperties;

    fn extension_names(&self) -> Result<Vec<CString>, DeviceError>;

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties;

    fn queue_family_properties(&self) -> Vec<vk::QueueFamilyProperties>;

    fn surface_support(
        &self,
        family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> Result<bool, DeviceError>;

    /// Fill the core features and every `Some` member of `chain`.
    fn features(&self, chain: &mut FeatureChain);

    /// Fill every `Some` member of `chain`.
    fn extended_properties(&self, chain: &mut PropertyChain);

    /// Heap layout, and the live budget counters when `budget` is provided.
    ///
    /// Must be safe to call from any thread at any time after creation.
    fn memory_properties(
        &self,
        budget: Option<&mut HeapBudget>,
    ) -> vk::PhysicalDeviceMemoryProperties;

    /// Names of the debugging tools attached to this device.
    fn tool_names(&self) -> Result<Vec<String>, DeviceError>;

    /// # Safety
    ///
    /// - `desc.extensions` must all be supported by this physical device.
    /// - `desc.features` must only request features reported as supported.
    unsafe fn create_device(&self, desc: DeviceCreateDesc<'_>) -> Result<Self::Device, DeviceError>;
}

pub trait LogicalDevice {
    /// # Safety
    ///
    /// The queue must have been requested at creation.
    unsafe fn queue(&self, family_index: u32, queue_index: u32) -> vk::Queue;
}
