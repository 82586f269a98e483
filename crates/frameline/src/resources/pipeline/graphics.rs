use std::sync::Arc;

use ash::vk;

use super::PipelineConfig;
use crate::{context::Device, error::FrameError, resources::Framebuffer};

///Pipeline that manages its own lifetime and keeps the framebuffer (and therefore the render pass) alive it was created for.
pub struct GraphicsPipeline {
    pub device: Arc<dyn Device>,
    pub pipeline: vk::Pipeline,
    pub config: PipelineConfig,
    pub framebuffer: Arc<Framebuffer>,
}

impl GraphicsPipeline {
    pub fn new(
        device: &Arc<dyn Device>,
        config: PipelineConfig,
        framebuffer: &Arc<Framebuffer>,
    ) -> Result<Self, FrameError> {
        let pipeline = device.create_graphics_pipeline(
            &config,
            &framebuffer.target,
            &framebuffer.attachments,
        )?;

        #[cfg(feature = "logging")]
        log::info!(
            "Created graphics pipeline {:?} with {} attributes for framebuffer {:?}",
            pipeline,
            config.vertex_attributes.len(),
            framebuffer.target.framebuffer
        );

        Ok(GraphicsPipeline {
            device: device.clone(),
            pipeline,
            config,
            framebuffer: framebuffer.clone(),
        })
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        self.device.destroy_pipeline(self.pipeline)
    }
}
