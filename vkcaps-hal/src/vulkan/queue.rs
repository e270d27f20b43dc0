use crate::{NegotiationError, QueueKind};

use arrayvec::ArrayVec;
use ash::vk;

/// Queue families picked for submission and presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    /// Only set when presentation was requested.
    pub present: Option<u32>,
}

impl QueueFamilies {
    /// Distinct family indices, in the order queues are created.
    pub fn unique(&self) -> ArrayVec<u32, 2> {
        let mut families = ArrayVec::new();
        families.push(self.graphics);
        if let Some(present) = self.present {
            if present != self.graphics {
                families.push(present);
            }
        }
        families
    }
}

/// Pick the first graphics capable family and, with a surface, the first
/// family able to present to it.
pub fn select_families<P: crate::PhysicalDevice>(
    phd: &P,
    families: &[vk::QueueFamilyProperties],
    surface: Option<vk::SurfaceKHR>,
) -> Result<QueueFamilies, NegotiationError> {
    let mut graphics = None;
    let mut present = None;
    for (index, family) in families.iter().enumerate() {
        if family.queue_count == 0 {
            continue;
        }
        let index = index as u32;
        if graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics = Some(index);
        }
        if let Some(surface) = surface {
            if present.is_none() && phd.surface_support(index, surface)? {
                present = Some(index);
            }
        }
        if graphics.is_some() && (surface.is_none() || present.is_some()) {
            break;
        }
    }

    let graphics = graphics.ok_or_else(|| {
        log::error!("Device lacks a graphics queue");
        NegotiationError::NoSuitableQueueFamily(QueueKind::Graphics)
    })?;
    if surface.is_some() && present.is_none() {
        log::error!("Device lacks a present queue");
        return Err(NegotiationError::NoSuitableQueueFamily(QueueKind::Present));
    }
    log::debug!(
        "Selected graphics family {} and present family {:?}",
        graphics,
        present
    );
    Ok(QueueFamilies { graphics, present })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_families() {
        let shared = QueueFamilies {
            graphics: 1,
            present: Some(1),
        };
        assert_eq!(shared.unique().as_slice(), &[1]);
        let split = QueueFamilies {
            graphics: 0,
            present: Some(2),
        };
        assert_eq!(split.unique().as_slice(), &[0, 2]);
        let headless = QueueFamilies {
            graphics: 3,
            present: None,
        };
        assert_eq!(headless.unique().as_slice(), &[3]);
    }
}
