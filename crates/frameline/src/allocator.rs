//! ## Allocator
//!
//! In Vulkan the application itself is responsible for allocating memory. Frameline only needs to know *where*
//! a resource should live, which is expressed through [MemoryUsage].
//!
//! The [VulkanDevice](crate::context::VulkanDevice) backs all allocations with [Traverse Researche's](https://github.com/Traverse-Research/gpu-allocator)
//! `gpu-allocator`. Other devices (like the [SimDevice](crate::sim::SimDevice)) are free to interpret the usage however they like,
//! as long as host visibility is respected.

mod gpu_allocator;
pub(crate) use self::gpu_allocator::allocate_for;

///Types of memory usage. Make sure to use GpuOnly wherever it applies to get optimal performance.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MemoryUsage {
    Unknown,
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
}

impl MemoryUsage {
    ///True if the CPU can map memory of this usage directly. Writes to everything else go through a staging copy.
    pub fn is_host_visible(&self) -> bool {
        match self {
            MemoryUsage::CpuToGpu | MemoryUsage::GpuToCpu => true,
            MemoryUsage::GpuOnly | MemoryUsage::Unknown => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryUsage;

    #[test]
    fn host_visibility() {
        assert!(MemoryUsage::CpuToGpu.is_host_visible());
        assert!(MemoryUsage::GpuToCpu.is_host_visible());
        assert!(!MemoryUsage::GpuOnly.is_host_visible());
        assert!(!MemoryUsage::Unknown.is_host_visible());
    }
}
