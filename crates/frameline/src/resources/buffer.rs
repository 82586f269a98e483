use std::{
    hash::{Hash, Hasher},
    sync::Arc,
};

use ash::vk;
use bytemuck::Pod;

use crate::{
    allocator::MemoryUsage,
    context::Device,
    error::{ConfigurationError, DeviceError, FrameError},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufDesc {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

///What a buffer's content is used for. Decides which pipeline stages a write has to be synchronised against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferMeta {
    ///Vertex data, `count` elements of `stride` bytes.
    Vertex { stride: u32, count: u32 },
    Index { index_type: vk::IndexType, count: u32 },
    ///Host visible source of a copy.
    Staging,
    Generic,
}

impl BufferMeta {
    ///Pipeline stage and access mask of the first read of this buffer's content by the device.
    pub fn consumer_scope(&self) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
        match self {
            BufferMeta::Vertex { .. } => (
                vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT,
                vk::AccessFlags2::VERTEX_ATTRIBUTE_READ,
            ),
            BufferMeta::Index { .. } => (
                vk::PipelineStageFlags2::INDEX_INPUT,
                vk::AccessFlags2::INDEX_READ,
            ),
            BufferMeta::Staging => (
                vk::PipelineStageFlags2::TRANSFER,
                vk::AccessFlags2::TRANSFER_READ,
            ),
            BufferMeta::Generic => (
                vk::PipelineStageFlags2::ALL_COMMANDS,
                vk::AccessFlags2::MEMORY_READ,
            ),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            BufferMeta::Vertex { .. } => "vertex buffer",
            BufferMeta::Index { .. } => "index buffer",
            BufferMeta::Staging => "staging buffer",
            BufferMeta::Generic => "generic buffer",
        }
    }
}

///Kind of buffer created by [Buffer::for_data].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
    Generic,
}

///Index type for elements of `size` bytes.
pub fn index_type_for_size(size: usize) -> Result<vk::IndexType, ConfigurationError> {
    match size {
        2 => Ok(vk::IndexType::UINT16),
        4 => Ok(vk::IndexType::UINT32),
        other => Err(ConfigurationError::UnsupportedIndexSize(other)),
    }
}

///Self managing buffer, released through its device when dropped.
///
/// There is no public way to write to a buffer without synchronisation. Content is changed through
/// [fill](crate::transfer::fill), which needs a [SyncToken](crate::sync::SyncToken).
pub struct Buffer {
    pub desc: BufDesc,
    pub inner: vk::Buffer,
    pub usage: MemoryUsage,
    pub meta: BufferMeta,
    pub device: Arc<dyn Device>,
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.device.destroy_buffer(self.inner)
    }
}

///The hash implementation is based on [Buffer](ash::vk::Buffer)'s hash.
impl Hash for Buffer {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.inner.hash(hasher)
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Eq for Buffer {}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("inner", &self.inner)
            .field("size", &self.desc.size)
            .field("usage", &self.usage)
            .field("meta", &self.meta)
            .finish()
    }
}

impl Buffer {
    pub fn new(
        device: &Arc<dyn Device>,
        description: BufDesc,
        usage: MemoryUsage,
        meta: BufferMeta,
        name: Option<&str>,
    ) -> Result<Self, DeviceError> {
        let inner = device.create_buffer(&description, usage, name)?;

        Ok(Buffer {
            desc: description,
            inner,
            usage,
            meta,
            device: device.clone(),
        })
    }

    ///Creates an uninitialised buffer for `count` elements of `T`. Buffer usage and meta data are derived from `kind`.
    /// All buffers can be used as transfer destination.
    pub fn for_data<T: Pod>(
        device: &Arc<dyn Device>,
        kind: BufferKind,
        count: usize,
        usage: MemoryUsage,
        name: Option<&str>,
    ) -> Result<Self, FrameError> {
        if count == 0 || core::mem::size_of::<T>() == 0 {
            return Err(ConfigurationError::EmptyData.into());
        }
        let element_size = core::mem::size_of::<T>();
        let too_large = || ConfigurationError::BufferTooLarge {
            count,
            element_size,
        };
        let size = element_size
            .checked_mul(count)
            .and_then(|size| vk::DeviceSize::try_from(size).ok())
            .ok_or_else(too_large)?;
        //draw counts are 32 bit
        let element_count = u32::try_from(count).map_err(|_| too_large())?;

        let (flags, meta) = match kind {
            BufferKind::Vertex => (
                vk::BufferUsageFlags::VERTEX_BUFFER,
                BufferMeta::Vertex {
                    stride: u32::try_from(element_size).map_err(|_| too_large())?,
                    count: element_count,
                },
            ),
            BufferKind::Index => (
                vk::BufferUsageFlags::INDEX_BUFFER,
                BufferMeta::Index {
                    index_type: index_type_for_size(element_size)?,
                    count: element_count,
                },
            ),
            BufferKind::Generic => (
                vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
                BufferMeta::Generic,
            ),
        };

        let desc = BufDesc {
            size,
            usage: flags | vk::BufferUsageFlags::TRANSFER_DST,
        };

        Ok(Self::new(device, desc, usage, meta, name)?)
    }

    ///Vertex buffer for `count` vertices of type `V`.
    pub fn new_vertex<V: Pod>(
        device: &Arc<dyn Device>,
        count: usize,
        usage: MemoryUsage,
        name: Option<&str>,
    ) -> Result<Self, FrameError> {
        Self::for_data::<V>(device, BufferKind::Vertex, count, usage, name)
    }

    ///Index buffer for `count` indices of type `I`. Only `u16` and `u32` sized indices are supported.
    pub fn new_index<I: Pod>(
        device: &Arc<dyn Device>,
        count: usize,
        usage: MemoryUsage,
        name: Option<&str>,
    ) -> Result<Self, FrameError> {
        Self::for_data::<I>(device, BufferKind::Index, count, usage, name)
    }

    ///A staging buffer is a host visible buffer that is only used as copy source. It is created and written in one go, before any
    /// device work can reference it.
    pub(crate) fn new_staging_for_data(
        device: &Arc<dyn Device>,
        name: Option<&str>,
        data: &[u8],
    ) -> Result<Self, DeviceError> {
        let desc = BufDesc {
            size: data.len() as vk::DeviceSize,
            usage: vk::BufferUsageFlags::TRANSFER_SRC,
        };
        let buffer = Buffer::new(
            device,
            desc,
            MemoryUsage::CpuToGpu,
            BufferMeta::Staging,
            name,
        )?;
        buffer.write_unsynchronized(0, data)?;
        Ok(buffer)
    }

    ///Writes `data` without any synchronisation.
    pub(crate) fn write_unsynchronized(&self, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        if !self.usage.is_host_visible() {
            #[cfg(feature = "logging")]
            log::error!("Tried to map buffer that has usage: {:?}", self.usage);
            return Err(DeviceError::NotMapable);
        }

        if offset + data.len() as u64 > self.desc.size {
            return Err(DeviceError::OutOfBounds {
                offset,
                requested: data.len() as u64,
                size: self.desc.size,
            });
        }

        #[cfg(feature = "logging")]
        log::trace!(
            "writing to mapped buffer[{:?}] of size {} with offset={}, data_size={}",
            self.inner,
            self.desc.size,
            offset,
            data.len()
        );

        self.device.write_buffer(self.inner, offset, data)
    }

    ///Number of indices, if this is an index buffer.
    pub fn index_count(&self) -> Option<u32> {
        if let BufferMeta::Index { count, .. } = self.meta {
            Some(count)
        } else {
            None
        }
    }
}
