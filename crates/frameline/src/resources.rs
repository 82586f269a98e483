mod image;
pub use image::{aspect_of_format, Image, ImgDesc};

mod buffer;
pub use buffer::{index_type_for_size, BufDesc, Buffer, BufferKind, BufferMeta};

mod framebuffer;
pub use framebuffer::{
    Attachment, AttachmentDesc, AttachmentUsage, Framebuffer, OnLoad, OnStore, RenderTarget,
    DEFAULT_COLOR_FORMAT, DEFAULT_DEPTH_FORMAT,
};

pub mod pipeline;
pub use pipeline::{
    graphics::GraphicsPipeline, PipelineConfig, PipelineConfigBuilder, ShaderDesc, ShaderSource,
    VertexAttribute,
};

mod command_buffer;
pub use command_buffer::CommandBuffer;
