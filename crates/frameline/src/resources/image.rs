use ash::vk;

use crate::{context::Device, error::DeviceError};
use std::{
    hash::{Hash, Hasher},
    sync::Arc,
};

///Image description. Frameline only deals with 2d images without mipmapping or multisampling, therefore format, extent and usage
/// are all there is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImgDesc {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
}

impl ImgDesc {
    ///Color attachment that can be the source of a copy or blit.
    pub fn color_attachment_2d(width: u32, height: u32, format: vk::Format) -> Self {
        ImgDesc {
            format,
            extent: vk::Extent2D { width, height },
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
        }
    }

    ///Depth (and possibly stencil) attachment that can be the source of a copy or blit.
    pub fn depth_attachment_2d(width: u32, height: u32, format: vk::Format) -> Self {
        ImgDesc {
            format,
            extent: vk::Extent2D { width, height },
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_SRC,
        }
    }

    ///Image that is the destination of a copy or blit before being presented.
    pub fn presentable_2d(width: u32, height: u32, format: vk::Format) -> Self {
        ImgDesc {
            format,
            extent: vk::Extent2D { width, height },
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::COLOR_ATTACHMENT,
        }
    }

    pub fn aspect(&self) -> vk::ImageAspectFlags {
        aspect_of_format(self.format)
    }
}

///Returns the aspects an image of `format` has.
pub fn aspect_of_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

///Device local image, destroyed through its device when dropped.
pub struct Image {
    pub desc: ImgDesc,
    pub inner: vk::Image,
    pub device: Arc<dyn Device>,
}

impl Image {
    pub fn new(
        device: &Arc<dyn Device>,
        description: ImgDesc,
        name: Option<&str>,
    ) -> Result<Self, DeviceError> {
        let inner = device.create_image(&description, name)?;
        Ok(Image {
            desc: description,
            inner,
            device: device.clone(),
        })
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.desc.aspect()
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        self.device.destroy_image(self.inner)
    }
}

impl Hash for Image {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state)
    }
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Eq for Image {}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("inner", &self.inner)
            .field("desc", &self.desc)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Image: Send, Sync);
    }

    #[test]
    fn aspects() {
        assert_eq!(
            ImgDesc::depth_attachment_2d(4, 4, vk::Format::D32_SFLOAT).aspect(),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_of_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            ImgDesc::color_attachment_2d(4, 4, vk::Format::R8G8B8A8_UNORM).aspect(),
            vk::ImageAspectFlags::COLOR
        );
    }
}
