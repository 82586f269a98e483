use ash::vk;
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};

use super::MemoryUsage;
use crate::error::DeviceError;

pub fn memory_usage_to_location(usage: MemoryUsage) -> MemoryLocation {
    match usage {
        MemoryUsage::CpuToGpu => MemoryLocation::CpuToGpu,
        MemoryUsage::GpuOnly => MemoryLocation::GpuOnly,
        MemoryUsage::GpuToCpu => MemoryLocation::GpuToCpu,
        MemoryUsage::Unknown => MemoryLocation::Unknown,
    }
}

///Allocates memory for `requirements`. Buffers are always "linear" in memory, optimal tiled images are not.
pub fn allocate_for(
    allocator: &mut Allocator,
    name: Option<&str>,
    requirements: vk::MemoryRequirements,
    usage: MemoryUsage,
    is_linear: bool,
) -> Result<Allocation, DeviceError> {
    let alloc_desc = AllocationCreateDesc {
        name: name.unwrap_or("frameline allocation"),
        requirements,
        location: memory_usage_to_location(usage),
        linear: is_linear,
        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
    };

    allocator
        .allocate(&alloc_desc)
        .map_err(|e| DeviceError::Allocation(e.to_string()))
}
