//! # Submission
//!
//! The [SubmissionQueue] collects the command buffers of one frame and hands them to the device in a single, ordered submission.
//!
//! Two kinds of submissions exist:
//!
//! - by reference: the buffer is owned by someone else (usually an [InFlightSet] of pre-recorded buffers) and must outlive its execution.
//! - by ownership: a transient buffer (upload, copy to the presentable image) is moved into the queue. It is kept by the frame's in-flight
//!   slot and dropped once the slot's fence signaled, which is checked the next time the slot [begins](SubmissionQueue::begin_frame).
//!
//! Buffers of one frame execute in the order they were submitted, so a transient copy submitted after a draw observes the draw's writes.

use std::sync::Arc;

use ash::vk::{self, Handle};
use smallvec::SmallVec;

use crate::{
    context::Device,
    error::{DeviceError, FrameError, SubmissionError},
    inflight::InFlightSet,
    resources::CommandBuffer,
    sync::Fence,
};

///A command buffer queued for execution.
#[derive(Debug)]
pub enum Submission {
    ByReference(vk::CommandBuffer),
    ByOwnership(CommandBuffer),
}

impl Submission {
    pub fn handle(&self) -> vk::CommandBuffer {
        match self {
            Submission::ByReference(hdl) => *hdl,
            Submission::ByOwnership(cb) => cb.inner,
        }
    }
}

struct FrameSlot {
    fence: Fence,
    ///Transient buffers of the last submission from this slot.
    retiring: Vec<CommandBuffer>,
    poisoned: bool,
}

pub struct SubmissionQueue {
    device: Arc<dyn Device>,
    slots: InFlightSet<FrameSlot>,
    current: Option<usize>,
    pending: Vec<Submission>,
    flushed_frames: u64,
}

impl SubmissionQueue {
    pub fn new(device: &Arc<dyn Device>, frames_in_flight: usize) -> Result<Self, FrameError> {
        let slots = InFlightSet::try_new(frames_in_flight, |_| {
            Ok::<_, FrameError>(FrameSlot {
                //Signaled, so the first use of each slot does not block
                fence: Fence::new(device, true)?,
                retiring: Vec::new(),
                poisoned: false,
            })
        })?;

        Ok(SubmissionQueue {
            device: device.clone(),
            slots,
            current: None,
            pending: Vec::new(),
            flushed_frames: 0,
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    ///In-flight index of the frame in progress, if any.
    pub fn current_slot(&self) -> Option<usize> {
        self.current
    }

    ///Number of buffers submitted to the current frame so far.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    ///Number of frames that were handed to the device.
    pub fn flushed_frames(&self) -> u64 {
        self.flushed_frames
    }

    ///Number of transient buffers that wait for their slot's fence.
    pub fn retiring(&self) -> usize {
        self.slots.iter().map(|s| s.retiring.len()).sum()
    }

    ///Starts a frame on slot `index`. Blocks until the previous submission of that slot has finished, then releases its transient buffers.
    pub fn begin_frame(&mut self, index: usize) -> Result<(), FrameError> {
        if let Some(current) = self.current {
            return Err(SubmissionError::FrameInProgress(current).into());
        }
        let count = self.slots.len();
        let slot = self
            .slots
            .at_mut(index)
            .ok_or(SubmissionError::InvalidSlot { index, count })?;

        if slot.poisoned {
            return Err(SubmissionError::SlotPoisoned(index).into());
        }

        #[cfg(feature = "profiling")]
        puffin::profile_scope!("wait for in-flight slot");

        slot.fence.wait(u64::MAX)?;

        #[cfg(feature = "logging")]
        if !slot.retiring.is_empty() {
            log::trace!(
                "Retiring {} transient buffers of slot {}",
                slot.retiring.len(),
                index
            );
        }
        slot.retiring.clear();

        self.current = Some(index);
        Ok(())
    }

    fn check_submittable(&self, buffer: &CommandBuffer) -> Result<(), SubmissionError> {
        if self.current.is_none() {
            return Err(SubmissionError::NoFrameInProgress);
        }
        if buffer.inner == vk::CommandBuffer::null() {
            return Err(SubmissionError::NullBuffer);
        }
        if !buffer.is_recorded() {
            return Err(SubmissionError::NotRecorded(buffer.inner.as_raw()));
        }
        Ok(())
    }

    ///Enqueues `buffer` for the current frame. The caller keeps ownership and has to keep the buffer alive until the frame finished.
    pub fn submit_by_reference(&mut self, buffer: &CommandBuffer) -> Result<(), FrameError> {
        self.check_submittable(buffer)?;
        self.pending.push(Submission::ByReference(buffer.inner));
        Ok(())
    }

    ///Enqueues `buffer` for the current frame and takes ownership. It is dropped once the device finished executing it.
    pub fn submit_ownership(&mut self, buffer: CommandBuffer) -> Result<(), FrameError> {
        self.check_submittable(&buffer)?;
        self.pending.push(Submission::ByOwnership(buffer));
        Ok(())
    }

    ///Hands all buffers of the current frame, in submission order, to the device. The slot's fence is signaled once they finished.
    ///
    /// If the device rejects the submission, the slot is poisoned and can't be used anymore.
    pub fn end_frame(&mut self) -> Result<(), FrameError> {
        let index = self.current.take().ok_or(SubmissionError::NoFrameInProgress)?;
        let pending = std::mem::take(&mut self.pending);
        let handles: SmallVec<[vk::CommandBuffer; 8]> =
            pending.iter().map(Submission::handle).collect();

        let count = self.slots.len();
        let slot = self
            .slots
            .at_mut(index)
            .ok_or(SubmissionError::InvalidSlot { index, count })?;

        let submitted = slot
            .fence
            .reset()
            .and_then(|_| self.device.submit(&handles, Some(slot.fence.inner)));

        if let Err(e) = submitted {
            slot.poisoned = true;
            #[cfg(feature = "logging")]
            log::error!("Submission of slot {} failed: {}", index, e);

            return Err(match e {
                DeviceError::Lost => FrameError::Device(DeviceError::Lost),
                DeviceError::VkError(res) | DeviceError::OutOfMemory(res) => {
                    SubmissionError::QueueRejected(res).into()
                }
                other => FrameError::Device(other),
            });
        }

        #[cfg(feature = "logging")]
        log::trace!(
            "Flushed frame on slot {} with {} command buffers",
            index,
            handles.len()
        );

        slot.retiring
            .extend(pending.into_iter().filter_map(|s| match s {
                Submission::ByOwnership(cb) => Some(cb),
                Submission::ByReference(_) => None,
            }));
        self.flushed_frames += 1;
        Ok(())
    }

    ///Blocks until the device is idle and releases all transient buffers.
    pub fn wait_idle(&mut self) -> Result<(), FrameError> {
        self.device.wait_idle()?;
        for slot in self.slots.iter_mut() {
            slot.retiring.clear();
        }
        Ok(())
    }
}

impl Drop for SubmissionQueue {
    fn drop(&mut self) {
        //buffers of an unfinished frame never reached the device.
        self.pending.clear();

        for (_idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.retiring.is_empty() || slot.poisoned {
                continue;
            }
            if let Ok(false) = slot.fence.is_signaled() {
                #[cfg(feature = "logging")]
                log::warn!(
                    "Dropping submission queue with unfinished slot {}, blocking in drop implementation!",
                    _idx
                );
                if let Err(e) = slot.fence.wait(u64::MAX) {
                    #[cfg(feature = "logging")]
                    log::error!("Failed to wait for slot {}: {}, leaking its buffers", _idx, e);
                    std::mem::forget(std::mem::take(&mut slot.retiring));
                    continue;
                }
            }
            slot.retiring.clear();
        }
    }
}
