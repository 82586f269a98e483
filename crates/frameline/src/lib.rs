//! # Frameline
//!
//! Frame lifecycle and host/device synchronisation core. Frameline manages the parts of a renderer that sit between "I have a device"
//! and "I draw something every frame":
//!
//! - per in-flight slot resources ([InFlightSet](inflight::InFlightSet)),
//! - command buffers recorded once and re-submitted every frame ([Recorder](recorder::Recorder)),
//! - host writes that are explicitly ordered against device work ([SyncToken](sync::SyncToken), [fill](transfer::fill)),
//! - a single ordered submission per frame that keeps transient buffers alive until the device finished them ([SubmissionQueue](submission::SubmissionQueue)),
//! - and a [FrameDriver](driver::FrameDriver) that runs [Element](driver::Element)s through initialize, update, render and teardown.
//!
//! # Usage
//!
//! Everything is created from an `Arc<dyn Device>`. [VulkanDevice](context::VulkanDevice) wraps a real Vulkan device,
//! [SimDevice](sim::SimDevice) executes the same command stream on a software timeline and reports synchronisation hazards.
//!
//! Surfaces and swapchains are not managed here. The [Window](presentation::Window) trait is the boundary to whatever presents the image.

pub use ash;

///Memory locations and the [gpu-allocator](gpu_allocator) backed allocator of the Vulkan device.
pub mod allocator;

///Backend neutral command stream recorded into command buffers.
pub mod command;

///The [Device](context::Device) capability set and its Vulkan implementation.
pub mod context;

///Allocatable resources. Mostly [Image](resources::Image), [Buffer](resources::Buffer) and [Framebuffer](resources::Framebuffer).
pub mod resources;

///Sync tokens, fences and memory barriers.
pub mod sync;

pub mod transfer;

pub mod inflight;

pub mod recorder;

pub mod submission;

///Window boundary and the offscreen window used for headless runs.
pub mod presentation;

pub mod input;

pub mod overlay;

pub mod timer;

pub mod driver;

///Software device for headless runs and tests.
pub mod sim;

mod error;
pub use error::{
    CommandBufferError, ConfigurationError, DeviceError, DriverError, FrameError, SubmissionError,
};
