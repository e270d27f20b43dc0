//! Declarative table of known driver defects.
//!
//! Every rule matches on the driver identity, a decoded version range and an
//! optional condition, and can only ever take capabilities away or constrain
//! them. Conditions are evaluated against the probed capability set, never
//! against the output of another rule, so the result doesn't depend on order.

use super::{adapter::PropertyChain, conv::map_bool, inventory::ExtensionSet, Workarounds};

use ash::{khr, nv};
use vkt::{Capabilities as Caps, DriverIdentity, DriverVendor, DriverVersion};

use std::{borrow::Cow, ffi::CStr};

/// When a rule is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Before device creation, against the probed capabilities.
    Probe,
    /// After device creation. Only affects later usage decisions, never the
    /// extensions the device was created with.
    Refine,
}

/// Half-open range of decoded driver versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VersionRange {
    pub min: Option<DriverVersion>,
    pub max: Option<DriverVersion>,
}

impl VersionRange {
    pub const ANY: Self = Self {
        min: None,
        max: None,
    };

    pub const fn below(version: DriverVersion) -> Self {
        Self {
            min: None,
            max: Some(version),
        }
    }

    pub const fn at_least(version: DriverVersion) -> Self {
        Self {
            min: Some(version),
            max: None,
        }
    }

    pub fn contains(&self, version: DriverVersion) -> bool {
        self.min.map_or(true, |min| version >= min) && self.max.map_or(true, |max| version < max)
    }
}

/// GPU generation of an NVIDIA device, inferred from the features it reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NvidiaArchitecture {
    VoltaOrOlder,
    Turing,
    AmpereOrNewer,
}

impl NvidiaArchitecture {
    pub fn infer(extensions: &ExtensionSet, properties: &PropertyChain) -> Self {
        let multi_viewport_rate = properties
            .fragment_shading_rate
            .as_ref()
            .map_or(false, |p| {
                map_bool(p.primitive_fragment_shading_rate_with_multiple_viewports)
            });
        if extensions.contains(khr::fragment_shading_rate::NAME) && multi_viewport_rate {
            Self::AmpereOrNewer
        } else if extensions.contains(nv::shading_rate_image::NAME) {
            Self::Turing
        } else {
            Self::VoltaOrOlder
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Always,
    Architecture(NvidiaArchitecture),
    ExtensionPresent(&'static CStr),
    /// None of these capabilities were probed as supported.
    Lacks(Caps),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Disable(Caps),
    Workaround(Workarounds),
    /// Raise the number of descriptor sets allocated per pool.
    DescriptorSetsPerPool(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuirkRule {
    /// What the driver gets wrong, for the log.
    pub reason: &'static str,
    pub drivers: &'static [DriverVendor],
    pub versions: VersionRange,
    pub condition: Condition,
    pub phase: Phase,
    pub action: Action,
}

/// What a rule is matched against.
#[derive(Clone, Copy, Debug)]
pub struct QuirkContext<'a> {
    pub driver: &'a DriverIdentity,
    pub extensions: &'a ExtensionSet,
    /// Capabilities that passed their probe, before any quirk.
    pub probed: Caps,
    /// Only known for NVIDIA drivers.
    pub architecture: Option<NvidiaArchitecture>,
}

impl QuirkRule {
    pub fn matches(&self, context: &QuirkContext) -> bool {
        if !self.drivers.contains(&context.driver.vendor) {
            return false;
        }
        if !self.versions.contains(context.driver.version()) {
            return false;
        }
        match self.condition {
            Condition::Always => true,
            Condition::Architecture(arch) => context.architecture == Some(arch),
            Condition::ExtensionPresent(name) => context.extensions.contains(name),
            Condition::Lacks(caps) => !context.probed.intersects(caps),
        }
    }
}

/// Accumulated effect of every matching rule of a phase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuirkOutcome {
    pub disabled: Caps,
    pub workarounds: Workarounds,
    pub descriptor_sets_per_pool: Option<u32>,
    /// Reasons of the rules that changed something.
    pub applied: Vec<&'static str>,
}

const AMD: &[DriverVendor] = &[DriverVendor::AmdProprietary, DriverVendor::AmdOpenSource];
const AMD_ANY: &[DriverVendor] = &[
    DriverVendor::AmdProprietary,
    DriverVendor::AmdOpenSource,
    DriverVendor::MesaRadv,
];
const RADV: &[DriverVendor] = &[DriverVendor::MesaRadv];
const NVIDIA: &[DriverVendor] = &[DriverVendor::NvidiaProprietary];
const INTEL_WINDOWS: &[DriverVendor] = &[DriverVendor::IntelProprietaryWindows];
const ANV: &[DriverVendor] = &[DriverVendor::IntelOpenSourceMesa];

const BUILTIN: &[QuirkRule] = &[
    QuirkRule {
        reason: "RADV older than 21.2 has broken extended dynamic state",
        drivers: RADV,
        versions: VersionRange::below(DriverVersion::new(21, 2, 0)),
        condition: Condition::Always,
        phase: Phase::Probe,
        action: Action::Disable(Caps::EXTENDED_DYNAMIC_STATE),
    },
    QuirkRule {
        reason: "RADV on RDNA2 has broken vertex input dynamic state",
        drivers: RADV,
        versions: VersionRange::ANY,
        condition: Condition::ExtensionPresent(khr::fragment_shading_rate::NAME),
        phase: Phase::Probe,
        action: Action::Disable(Caps::VERTEX_INPUT_DYNAMIC_STATE),
    },
    QuirkRule {
        reason: "Intel proprietary drivers have broken vertex input dynamic state",
        drivers: INTEL_WINDOWS,
        versions: VersionRange::ANY,
        condition: Condition::Always,
        phase: Phase::Probe,
        action: Action::Disable(Caps::VERTEX_INPUT_DYNAMIC_STATE),
    },
    QuirkRule {
        reason: "AMD GCN4 and older have broken depth min/max filters",
        drivers: AMD_ANY,
        versions: VersionRange::ANY,
        condition: Condition::Lacks(Caps::SHADER_FLOAT16),
        phase: Phase::Probe,
        action: Action::Disable(Caps::SAMPLER_FILTER_MINMAX),
    },
    QuirkRule {
        reason: "NVIDIA Ampere and newer have broken float16 math",
        drivers: NVIDIA,
        versions: VersionRange::ANY,
        condition: Condition::Architecture(NvidiaArchitecture::AmpereOrNewer),
        phase: Phase::Refine,
        action: Action::Disable(Caps::SHADER_FLOAT16),
    },
    QuirkRule {
        reason: "NVIDIA Volta and older have broken push descriptors",
        drivers: NVIDIA,
        versions: VersionRange::ANY,
        condition: Condition::Architecture(NvidiaArchitecture::VoltaOrOlder),
        phase: Phase::Refine,
        action: Action::Disable(Caps::PUSH_DESCRIPTOR),
    },
    QuirkRule {
        reason: "NVIDIA 510 and newer can't blit multisampled images",
        drivers: NVIDIA,
        versions: VersionRange::at_least(DriverVersion::new(510, 0, 0)),
        condition: Condition::Always,
        phase: Phase::Refine,
        action: Action::Workaround(Workarounds::CANT_BLIT_MSAA),
    },
    QuirkRule {
        reason: "Intel proprietary drivers have broken float16 math",
        drivers: INTEL_WINDOWS,
        versions: VersionRange::ANY,
        condition: Condition::Always,
        phase: Phase::Refine,
        action: Action::Disable(Caps::SHADER_FLOAT16),
    },
    QuirkRule {
        reason: "Intel proprietary drivers can't blit multisampled images",
        drivers: INTEL_WINDOWS,
        versions: VersionRange::ANY,
        condition: Condition::Always,
        phase: Phase::Refine,
        action: Action::Workaround(Workarounds::CANT_BLIT_MSAA),
    },
    QuirkRule {
        reason: "AMD GCN4 and older have broken cube image compatibility",
        drivers: AMD,
        versions: VersionRange::ANY,
        condition: Condition::Lacks(Caps::SHADER_FLOAT16),
        phase: Phase::Refine,
        action: Action::Workaround(Workarounds::BROKEN_CUBE_IMAGE_COMPATIBILITY),
    },
    QuirkRule {
        reason: "ANV has broken B5G6R5 images",
        drivers: ANV,
        versions: VersionRange::ANY,
        condition: Condition::Always,
        phase: Phase::Refine,
        action: Action::Workaround(Workarounds::MUST_EMULATE_BGR565),
    },
    QuirkRule {
        reason: "AMD drivers perform better with larger descriptor pools",
        drivers: AMD,
        versions: VersionRange::ANY,
        condition: Condition::Always,
        phase: Phase::Refine,
        action: Action::DescriptorSetsPerPool(96),
    },
];

/// The rules negotiation consults.
#[derive(Clone, Debug)]
pub struct QuirkDatabase {
    rules: Cow<'static, [QuirkRule]>,
}

impl Default for QuirkDatabase {
    fn default() -> Self {
        Self::builtin()
    }
}

impl QuirkDatabase {
    /// Every known driver defect.
    pub fn builtin() -> Self {
        Self {
            rules: Cow::Borrowed(BUILTIN),
        }
    }

    pub fn new(rules: Vec<QuirkRule>) -> Self {
        Self {
            rules: Cow::Owned(rules),
        }
    }

    pub fn empty() -> Self {
        Self {
            rules: Cow::Borrowed(&[]),
        }
    }

    pub fn rules(&self) -> &[QuirkRule] {
        &self.rules
    }

    /// Apply the rules of `phase` to the `current` capabilities.
    ///
    /// A rule disabling only capabilities already absent from `current` is
    /// not reported.
    pub fn evaluate(&self, phase: Phase, context: &QuirkContext, current: Caps) -> QuirkOutcome {
        let mut outcome = QuirkOutcome::default();
        for rule in self.rules.iter() {
            if rule.phase != phase || !rule.matches(context) {
                continue;
            }
            match rule.action {
                Action::Disable(caps) => {
                    let lost = caps & current;
                    if lost.is_empty() {
                        continue;
                    }
                    log::warn!(
                        "{} {}, disabling {:?}",
                        context.driver.display_name(),
                        rule.reason,
                        lost
                    );
                    outcome.disabled |= lost;
                }
                Action::Workaround(workarounds) => {
                    log::warn!(
                        "{} {}, enabling workaround {:?}",
                        context.driver.display_name(),
                        rule.reason,
                        workarounds
                    );
                    outcome.workarounds |= workarounds;
                }
                Action::DescriptorSetsPerPool(count) => {
                    log::warn!(
                        "{} {}, allocating {} descriptor sets per pool",
                        context.driver.display_name(),
                        rule.reason,
                        count
                    );
                    outcome.descriptor_sets_per_pool =
                        Some(outcome.descriptor_sets_per_pool.map_or(count, |c| c.max(count)));
                }
            }
            outcome.applied.push(rule.reason);
        }
        outcome
    }
}
