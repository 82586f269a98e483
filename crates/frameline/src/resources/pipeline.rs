use std::{ffi::CString, path::PathBuf};

use ash::vk;
use smallvec::SmallVec;

use crate::error::ConfigurationError;

pub mod graphics;

///Where the SPIR-V code of a shader stage comes from. Frameline never looks into the code, it is handed to the device as is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShaderSource {
    ///Path to a compiled SPIR-V file. Read when the pipeline is created.
    Path(PathBuf),
    SpirV(Vec<u32>),
}

impl From<&str> for ShaderSource {
    fn from(path: &str) -> Self {
        ShaderSource::Path(PathBuf::from(path))
    }
}

impl From<PathBuf> for ShaderSource {
    fn from(path: PathBuf) -> Self {
        ShaderSource::Path(path)
    }
}

impl From<Vec<u32>> for ShaderSource {
    fn from(code: Vec<u32>) -> Self {
        ShaderSource::SpirV(code)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderDesc {
    pub stage: vk::ShaderStageFlags,
    pub source: ShaderSource,
    pub entry: CString,
}

///One vertex attribute read from the vertex buffer at binding 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: vk::Format,
    ///Byte offset in the vertex.
    pub offset: u32,
}

///Immutable graphics pipeline configuration. Created through [PipelineConfig::builder].
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub vertex_stride: u32,
    pub vertex_attributes: SmallVec<[VertexAttribute; 4]>,
    pub shaders: SmallVec<[ShaderDesc; 2]>,
    pub front_face: vk::FrontFace,
    pub cull_mode: vk::CullModeFlags,
    ///Viewport and scissor extent.
    pub viewport: vk::Extent2D,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            vertex_stride: 0,
            vertex_attributes: SmallVec::new(),
            shaders: SmallVec::new(),
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            cull_mode: vk::CullModeFlags::NONE,
            viewport: vk::Extent2D::default(),
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: PipelineConfig::default(),
            error: None,
        }
    }

    pub fn shader(&self, stage: vk::ShaderStageFlags) -> Option<&ShaderDesc> {
        self.shaders.iter().find(|s| s.stage == stage)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.vertex_attributes.is_empty() {
            return Err(ConfigurationError::NoVertexAttributes);
        }
        if self.vertex_stride == 0 {
            return Err(ConfigurationError::ZeroVertexStride);
        }
        for (idx, attrib) in self.vertex_attributes.iter().enumerate() {
            if self.vertex_attributes[..idx]
                .iter()
                .any(|other| other.location == attrib.location)
            {
                return Err(ConfigurationError::DuplicateVertexLocation(attrib.location));
            }
        }
        if self.shader(vk::ShaderStageFlags::VERTEX).is_none() {
            return Err(ConfigurationError::MissingShaderStage("vertex"));
        }
        if self.shader(vk::ShaderStageFlags::FRAGMENT).is_none() {
            return Err(ConfigurationError::MissingShaderStage("fragment"));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ConfigurationError::ZeroViewport);
        }

        Ok(())
    }
}

///Builder for [PipelineConfig]. Start with defaults, change whatever is needed (optionally through [with](Self::with)), then
/// [build](Self::build) to validate.
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
    error: Option<ConfigurationError>,
}

impl PipelineConfigBuilder {
    ///Sets the vertex stride to the size of `V`.
    pub fn vertex_input<V>(mut self) -> Self {
        self.config.vertex_stride = core::mem::size_of::<V>() as u32;
        self
    }

    pub fn vertex_stride(mut self, stride: u32) -> Self {
        self.config.vertex_stride = stride;
        self
    }

    pub fn attribute(mut self, location: u32, format: vk::Format, offset: u32) -> Self {
        self.config.vertex_attributes.push(VertexAttribute {
            location,
            format,
            offset,
        });
        self
    }

    pub fn shader(
        mut self,
        stage: vk::ShaderStageFlags,
        source: impl Into<ShaderSource>,
        entry: &str,
    ) -> Self {
        match CString::new(entry) {
            Ok(entry) => {
                self.config.shaders.retain(|s| s.stage != stage);
                self.config.shaders.push(ShaderDesc {
                    stage,
                    source: source.into(),
                    entry,
                });
            }
            Err(_) => {
                self.error
                    .get_or_insert(ConfigurationError::InvalidEntryPoint(entry.to_owned()));
            }
        }
        self
    }

    ///Vertex shader with entry point `main`.
    pub fn vertex_shader(self, source: impl Into<ShaderSource>) -> Self {
        self.shader(vk::ShaderStageFlags::VERTEX, source, "main")
    }

    ///Fragment shader with entry point `main`.
    pub fn fragment_shader(self, source: impl Into<ShaderSource>) -> Self {
        self.shader(vk::ShaderStageFlags::FRAGMENT, source, "main")
    }

    pub fn front_face(mut self, front_face: vk::FrontFace) -> Self {
        self.config.front_face = front_face;
        self
    }

    pub fn cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.config.cull_mode = cull_mode;
        self
    }

    pub fn viewport(mut self, extent: vk::Extent2D) -> Self {
        self.config.viewport = extent;
        self
    }

    ///Allows changing the configuration before it is validated.
    pub fn with(mut self, mut mapping: impl FnMut(&mut PipelineConfig)) -> Self {
        mapping(&mut self.config);
        self
    }

    pub fn build(self) -> Result<PipelineConfig, ConfigurationError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.config.validate()?;
        Ok(self.config)
    }
}
