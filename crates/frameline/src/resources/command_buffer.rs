use std::{any::Any, sync::Arc};

use ash::vk;

use crate::{command::RecordedCommands, context::Device, error::DeviceError};

///Primary command buffer allocated from the device's command pool.
///
/// Once recorded (see [Recorder](crate::recorder::Recorder)) the buffer owns its [RecordedCommands] and every resource the commands
/// reference. Those captured resources are released after the buffer itself was freed, so a buffer that is still alive
/// always has valid bindings.
pub struct CommandBuffer {
    pub device: Arc<dyn Device>,
    ///the raw vulkan handle
    pub inner: vk::CommandBuffer,
    recorded: Option<RecordedCommands>,
    captured: Vec<Box<dyn Any + Send + Sync>>,
}

impl CommandBuffer {
    pub fn new(device: &Arc<dyn Device>) -> Result<Self, DeviceError> {
        let inner = device.allocate_command_buffer()?;
        Ok(CommandBuffer {
            device: device.clone(),
            inner,
            recorded: None,
            captured: Vec::new(),
        })
    }

    ///True once a recording was finished on this buffer.
    pub fn is_recorded(&self) -> bool {
        self.recorded.is_some()
    }

    pub fn recorded(&self) -> Option<&RecordedCommands> {
        self.recorded.as_ref()
    }

    ///Keeps `resource` alive at least as long as this buffer.
    pub fn attach<T: Any + Send + Sync>(&mut self, resource: T) {
        self.captured.push(Box::new(resource));
    }

    pub fn captured_count(&self) -> usize {
        self.captured.len()
    }

    ///Encodes `commands` and replaces the previous recording. The resources of the old recording are released
    /// after the new one was encoded.
    pub(crate) fn set_recording(
        &mut self,
        commands: RecordedCommands,
        captured: Vec<Box<dyn Any + Send + Sync>>,
    ) -> Result<(), DeviceError> {
        if let Err(e) = self.device.encode(self.inner, commands.commands()) {
            self.recorded = None;
            return Err(e);
        }
        self.recorded = Some(commands);
        let _old = std::mem::replace(&mut self.captured, captured);
        Ok(())
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        self.device.free_command_buffer(self.inner)
    }
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("inner", &self.inner)
            .field(
                "recorded",
                &self.recorded.as_ref().map(|r| r.len()).unwrap_or(0),
            )
            .field("captured", &self.captured.len())
            .finish()
    }
}
