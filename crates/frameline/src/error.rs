use ash::vk;

use thiserror::Error;

///Errors reported by a [Device](crate::context::Device) implementation.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device was lost")]
    Lost,
    #[error("Out of memory: {0}")]
    OutOfMemory(vk::Result),
    #[error("Allocation failed: {0}")]
    Allocation(String),
    #[error("Handle {0:#x} is not known to this device")]
    UnknownHandle(u64),
    #[error("Write of {requested} bytes at offset {offset} exceeds buffer size {size}")]
    OutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },
    #[error("Buffer is not host visible and can not be mapped")]
    NotMapable,
    #[error("Waiting timed out")]
    Timeout,
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),
    #[error("Shader source could not be read: {0}")]
    ShaderSource(#[from] std::io::Error),
    #[error("No suitable physical device found. Is a Vulkan capable GPU and driver installed?")]
    NoPhysicalDevice,
    #[error("Vulkan error: {0}")]
    VkError(vk::Result),
}

impl From<vk::Result> for DeviceError {
    fn from(res: vk::Result) -> Self {
        match res {
            vk::Result::ERROR_DEVICE_LOST => DeviceError::Lost,
            vk::Result::TIMEOUT => DeviceError::Timeout,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
                DeviceError::OutOfMemory(res)
            }
            other => DeviceError::VkError(other),
        }
    }
}

///Invalid setup. Always reported while initializing, never recoverable at runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Number of frames in flight must be at least 1")]
    ZeroFramesInFlight,
    #[error("Framebuffer needs at least one attachment")]
    NoAttachments,
    #[error("Attachment {index} has extent {width}x{height}, framebuffer expects {expected_width}x{expected_height}")]
    AttachmentExtentMismatch {
        index: usize,
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
    #[error("Color location {0} is used by more than one attachment")]
    DuplicateColorLocation(u32),
    #[error("Framebuffer has more than one depth/stencil attachment")]
    MultipleDepthAttachments,
    #[error("No attachment at index {index}, framebuffer has {count}")]
    InvalidAttachmentIndex { index: usize, count: usize },
    #[error("Pipeline has no vertex attributes")]
    NoVertexAttributes,
    #[error("Vertex attribute location {0} is declared twice")]
    DuplicateVertexLocation(u32),
    #[error("Pipeline is missing a {0} shader")]
    MissingShaderStage(&'static str),
    #[error("Pipeline viewport has a zero sized extent")]
    ZeroViewport,
    #[error("Buffer of {count} elements with {element_size} bytes each exceeds the addressable size")]
    BufferTooLarge { count: usize, element_size: usize },
    #[error("Vertex stride must not be zero")]
    ZeroVertexStride,
    #[error("Shader entry point {0:?} is not a valid C string")]
    InvalidEntryPoint(String),
    #[error("Index element size {0} is not supported, use u16 or u32")]
    UnsupportedIndexSize(usize),
    #[error("Buffer data is empty")]
    EmptyData,
}

///Errors while recording a [CommandBuffer](crate::resources::CommandBuffer).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandBufferError {
    #[error("Command {0} must be recorded inside a render pass")]
    OutsideRenderPass(&'static str),
    #[error("Command {0} must not be recorded inside a render pass")]
    InsideRenderPass(&'static str),
    #[error("Render pass was already started")]
    NestedRenderPass,
    #[error("Recording finished while a render pass was still open")]
    UnterminatedRenderPass,
    #[error("Draw issued without a bound pipeline")]
    NoPipelineBound,
    #[error("Buffer used as {expected} has no matching meta data")]
    WrongBufferKind { expected: &'static str },
}

///Errors related to handing command buffers to the device queue. None of them are retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("Submitted command buffer is a null handle")]
    NullBuffer,
    #[error("Command buffer {0:#x} was never recorded")]
    NotRecorded(u64),
    #[error("Queue rejected submission: {0}")]
    QueueRejected(vk::Result),
    #[error("In-flight slot {0} failed a previous submission and can not be reused")]
    SlotPoisoned(usize),
    #[error("No frame in progress")]
    NoFrameInProgress,
    #[error("Frame for slot {0} is already in progress")]
    FrameInProgress(usize),
    #[error("In-flight index {index} out of range, queue has {count} slots")]
    InvalidSlot { index: usize, count: usize },
}

///Frame driver state machine misuse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("Invalid driver transition {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("Elements can only be added before the driver is initialized, driver is {0}")]
    ElementAfterInitialize(&'static str),
}

///Top level error, collects all errors frameline can produce.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("CommandBuffer error: {0}")]
    CommandBuffer(#[from] CommandBufferError),
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
    #[error("Other error: {0}")]
    Other(String),
}

impl From<vk::Result> for FrameError {
    fn from(res: vk::Result) -> Self {
        FrameError::Device(res.into())
    }
}

impl FrameError {
    ///True if the underlying device reported a loss. The driver never tries to recover from that.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, FrameError::Device(DeviceError::Lost))
    }
}
