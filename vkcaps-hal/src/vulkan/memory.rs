use arrayvec::ArrayVec;
use ash::vk;

/// Memory the host keeps for itself on integrated devices.
const HOST_RESERVED_MEMORY: i64 = 8 << 30;
/// Upper bound of the access budget on integrated devices.
const INTEGRATED_MEMORY_CEILING: i64 = 4 << 30;

/// Live per-heap counters, as reported by `VK_EXT_memory_budget`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapBudget {
    pub heap_budget: [vk::DeviceSize; vk::MAX_MEMORY_HEAPS],
    pub heap_usage: [vk::DeviceSize; vk::MAX_MEMORY_HEAPS],
}

impl From<&vk::PhysicalDeviceMemoryBudgetPropertiesEXT<'_>> for HeapBudget {
    fn from(budget: &vk::PhysicalDeviceMemoryBudgetPropertiesEXT<'_>) -> Self {
        Self {
            heap_budget: budget.heap_budget,
            heap_usage: budget.heap_usage,
        }
    }
}

/// Which heaps the renderer tracks, and how much of them it may use.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryReport {
    pub valid_heaps: ArrayVec<u32, { vk::MAX_MEMORY_HEAPS }>,
    /// Bytes the renderer may allocate.
    pub device_access_memory: u64,
    /// Total size of the device local heaps.
    pub device_local_memory: u64,
}

impl MemoryReport {
    /// Sum of the current usage of the tracked heaps.
    pub fn usage(&self, budget: &HeapBudget) -> u64 {
        self.valid_heaps
            .iter()
            .map(|&heap| budget.heap_usage[heap as usize])
            .sum()
    }
}

/// Pick the tracked heaps and compute the access budget.
///
/// Integrated devices track every heap, and get a budget clamped so the host
/// isn't starved, yet never below their device local memory.
pub fn classify(
    memory: &vk::PhysicalDeviceMemoryProperties,
    budget: Option<&HeapBudget>,
    is_integrated: bool,
) -> MemoryReport {
    let mut report = MemoryReport::default();
    let mut initial_usage = 0u64;
    let heap_count = (memory.memory_heap_count as usize).min(vk::MAX_MEMORY_HEAPS);
    for (index, heap) in memory.memory_heaps[..heap_count].iter().enumerate() {
        let is_local = heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL);
        if !is_local && !is_integrated {
            continue;
        }
        report.valid_heaps.push(index as u32);
        if is_local {
            report.device_local_memory += heap.size;
        }
        match budget {
            Some(budget) => {
                initial_usage += budget.heap_usage[index];
                report.device_access_memory += budget.heap_budget[index];
            }
            None => report.device_access_memory += heap.size,
        }
    }

    if is_integrated {
        let available = (report.device_access_memory as i64).saturating_sub(initial_usage as i64);
        let clamped = available
            .saturating_sub(HOST_RESERVED_MEMORY)
            .min(INTEGRATED_MEMORY_CEILING)
            .max(report.device_local_memory as i64);
        report.device_access_memory = clamped as u64;
    }
    log::debug!(
        "Tracking memory heaps {:?}, {} bytes accessible",
        report.valid_heaps,
        report.device_access_memory
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1 << 30;

    fn heaps(list: &[(u64, vk::MemoryHeapFlags)]) -> vk::PhysicalDeviceMemoryProperties {
        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_heap_count: list.len() as u32,
            ..Default::default()
        };
        for (heap, &(size, flags)) in memory.memory_heaps.iter_mut().zip(list) {
            *heap = vk::MemoryHeap { size, flags };
        }
        memory
    }

    #[test]
    fn discrete_tracks_local_heaps() {
        let memory = heaps(&[
            (8 * GIB, vk::MemoryHeapFlags::DEVICE_LOCAL),
            (16 * GIB, vk::MemoryHeapFlags::empty()),
            (256 << 20, vk::MemoryHeapFlags::DEVICE_LOCAL),
        ]);
        let report = classify(&memory, None, false);
        assert_eq!(report.valid_heaps.as_slice(), &[0, 2]);
        assert_eq!(report.device_access_memory, 8 * GIB + (256 << 20));
        assert_eq!(report.device_local_memory, report.device_access_memory);
    }

    #[test]
    fn integrated_budget_is_clamped() {
        let memory = heaps(&[
            (GIB, vk::MemoryHeapFlags::DEVICE_LOCAL),
            (32 * GIB, vk::MemoryHeapFlags::empty()),
        ]);
        let report = classify(&memory, None, true);
        assert_eq!(report.valid_heaps.as_slice(), &[0, 1]);
        // 33 GiB - 8 GiB reserved, capped
        assert_eq!(report.device_access_memory, 4 * GIB);

        let mut budget = HeapBudget::default();
        budget.heap_budget[0] = GIB;
        budget.heap_budget[1] = 10 * GIB;
        budget.heap_usage[1] = 10 * GIB;
        let report = classify(&memory, Some(&budget), true);
        assert_eq!(report.device_access_memory, GIB);
        assert_eq!(report.usage(&budget), 10 * GIB);
    }
}
