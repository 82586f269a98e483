use std::sync::Arc;

use ash::vk;
use smallvec::SmallVec;

use crate::{
    command::ClearValue,
    context::Device,
    error::{ConfigurationError, FrameError},
};

use super::{image::aspect_of_format, Image, ImgDesc};

///Format used for color attachments if nothing else is requested.
pub const DEFAULT_COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
///Format used for depth attachments if nothing else is requested.
pub const DEFAULT_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnLoad {
    Clear,
    Load,
    DontCare,
}

impl OnLoad {
    pub fn to_vk(&self) -> vk::AttachmentLoadOp {
        match self {
            OnLoad::Clear => vk::AttachmentLoadOp::CLEAR,
            OnLoad::Load => vk::AttachmentLoadOp::LOAD,
            OnLoad::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnStore {
    Store,
    DontCare,
}

impl OnStore {
    pub fn to_vk(&self) -> vk::AttachmentStoreOp {
        match self {
            OnStore::Store => vk::AttachmentStoreOp::STORE,
            OnStore::DontCare => vk::AttachmentStoreOp::DONT_CARE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentUsage {
    ///Color output at the given fragment shader location.
    Color(u32),
    DepthStencil,
}

///Immutable description of one framebuffer attachment.
#[derive(Clone, Debug, PartialEq)]
pub struct AttachmentDesc {
    pub format: vk::Format,
    pub on_load: OnLoad,
    pub usage: AttachmentUsage,
    pub on_store: OnStore,
    pub clear_value: ClearValue,
}

impl AttachmentDesc {
    ///Defines an attachment of `format`. The clear value is black for color and the far plane for depth attachments.
    pub fn define(format: vk::Format, on_load: OnLoad, usage: AttachmentUsage, on_store: OnStore) -> Self {
        let clear_value = match usage {
            AttachmentUsage::Color(_) => ClearValue::Color([0.0; 4]),
            AttachmentUsage::DepthStencil => ClearValue::DepthStencil {
                depth: 1.0,
                stencil: 0,
            },
        };

        AttachmentDesc {
            format,
            on_load,
            usage,
            on_store,
            clear_value,
        }
    }

    pub fn with_clear_value(mut self, clear_value: ClearValue) -> Self {
        self.clear_value = clear_value;
        self
    }

    pub fn is_depth(&self) -> bool {
        self.usage == AttachmentUsage::DepthStencil
    }

    ///Layout the attachment is in after the render pass.
    pub fn final_layout(&self) -> vk::ImageLayout {
        match self.usage {
            AttachmentUsage::Color(_) => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            AttachmentUsage::DepthStencil => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    }

    ///Layout expected when the render pass starts. Content that is not loaded can start undefined.
    pub fn initial_layout(&self) -> vk::ImageLayout {
        match self.on_load {
            OnLoad::Load => self.final_layout(),
            OnLoad::Clear | OnLoad::DontCare => vk::ImageLayout::UNDEFINED,
        }
    }

    pub fn aspect(&self) -> vk::ImageAspectFlags {
        aspect_of_format(self.format)
    }

    ///Image description for an image backing this attachment.
    pub fn image_desc(&self, extent: vk::Extent2D) -> ImgDesc {
        match self.usage {
            AttachmentUsage::Color(_) => {
                ImgDesc::color_attachment_2d(extent.width, extent.height, self.format)
            }
            AttachmentUsage::DepthStencil => {
                ImgDesc::depth_attachment_2d(extent.width, extent.height, self.format)
            }
        }
    }
}

///An image bound to an attachment description.
#[derive(Clone, Debug)]
pub struct Attachment {
    pub image: Arc<Image>,
    pub desc: AttachmentDesc,
}

///Render pass and framebuffer handles created by a [Device].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
}

///Set of attachments a render pass draws into. Owns its images (shared through [Arc]) and releases the render target when dropped.
pub struct Framebuffer {
    pub target: RenderTarget,
    pub extent: vk::Extent2D,
    pub attachments: Vec<Attachment>,
    pub device: Arc<dyn Device>,
}

impl Framebuffer {
    ///Creates one image per description, all with `extent`, and the framebuffer for them.
    pub fn new(
        device: &Arc<dyn Device>,
        descriptions: &[AttachmentDesc],
        extent: vk::Extent2D,
    ) -> Result<Self, FrameError> {
        if descriptions.is_empty() {
            return Err(ConfigurationError::NoAttachments.into());
        }

        let attachments = descriptions
            .iter()
            .enumerate()
            .map(|(idx, desc)| {
                let name = format!("framebuffer attachment {}", idx);
                Image::new(device, desc.image_desc(extent), Some(&name)).map(|image| Attachment {
                    image: Arc::new(image),
                    desc: desc.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_attachments(device, attachments)
    }

    ///Creates the framebuffer for already existing images.
    pub fn from_attachments(
        device: &Arc<dyn Device>,
        attachments: Vec<Attachment>,
    ) -> Result<Self, FrameError> {
        let extent = Self::validate(&attachments)?;
        let target = device.create_render_target(&attachments, extent)?;

        #[cfg(feature = "logging")]
        log::trace!(
            "Created framebuffer {:?} with {} attachments at {}x{}",
            target.framebuffer,
            attachments.len(),
            extent.width,
            extent.height
        );

        Ok(Framebuffer {
            target,
            extent,
            attachments,
            device: device.clone(),
        })
    }

    fn validate(attachments: &[Attachment]) -> Result<vk::Extent2D, ConfigurationError> {
        let first = attachments.first().ok_or(ConfigurationError::NoAttachments)?;
        let expected = first.image.extent();
        if expected.width == 0 || expected.height == 0 {
            return Err(ConfigurationError::ZeroViewport);
        }

        let mut locations: SmallVec<[u32; 8]> = SmallVec::new();
        let mut has_depth = false;
        for (index, att) in attachments.iter().enumerate() {
            let extent = att.image.extent();
            if extent != expected {
                return Err(ConfigurationError::AttachmentExtentMismatch {
                    index,
                    width: extent.width,
                    height: extent.height,
                    expected_width: expected.width,
                    expected_height: expected.height,
                });
            }

            match att.desc.usage {
                AttachmentUsage::Color(loc) => {
                    if locations.contains(&loc) {
                        return Err(ConfigurationError::DuplicateColorLocation(loc));
                    }
                    locations.push(loc);
                }
                AttachmentUsage::DepthStencil => {
                    if has_depth {
                        return Err(ConfigurationError::MultipleDepthAttachments);
                    }
                    has_depth = true;
                }
            }
        }

        Ok(expected)
    }

    ///Attachment in order of creation.
    pub fn attachment_at(&self, index: usize) -> Result<&Attachment, ConfigurationError> {
        self.attachments
            .get(index)
            .ok_or(ConfigurationError::InvalidAttachmentIndex {
                index,
                count: self.attachments.len(),
            })
    }

    pub fn has_depth_attachment(&self) -> bool {
        self.attachments.iter().any(|a| a.desc.is_depth())
    }

    pub fn clear_values(&self) -> SmallVec<[ClearValue; 4]> {
        self.attachments.iter().map(|a| a.desc.clear_value).collect()
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.device.destroy_render_target(self.target)
    }
}
