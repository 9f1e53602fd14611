// SPDX-License-Identifier: CEPL-1.0
//! The per-frame protocol.
//!
//! Each frame waits for the present queue, acquires an image, records and
//! submits one command buffer, presents, then blocks until the device is
//! idle before releasing the command buffer. The steps are expressed
//! against [`FrameOps`] so their order can be checked without a GPU.

use miner_render::Mvp;
use tracing::trace;

use crate::error::{RenderError, RenderResult};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameState {
    #[default]
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

/// What a frame draws: the transform pushed as constants and how many
/// indices of the uploaded mesh to draw.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FramePayload {
    pub mvp: Mvp,
    pub index_count: u32,
}

pub trait FrameOps {
    type Commands: Copy;

    fn wait_present_idle(&mut self) -> RenderResult<()>;
    /// Signals the image-available semaphore once the image is ready.
    fn acquire_image(&mut self) -> RenderResult<u32>;
    fn begin_commands(&mut self) -> RenderResult<Self::Commands>;
    fn record_draw(
        &mut self,
        cmd: Self::Commands,
        image_index: u32,
        payload: &FramePayload,
    ) -> RenderResult<()>;
    /// Waits image-available at colour output, signals render-finished.
    fn submit(&mut self, cmd: Self::Commands) -> RenderResult<()>;
    /// Waits render-finished.
    fn present(&mut self, image_index: u32) -> RenderResult<()>;
    fn wait_device_idle(&mut self) -> RenderResult<()>;
    fn free_commands(&mut self, cmd: Self::Commands);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FrameLoop {
    state: FrameState,
    frames: u64,
}

impl FrameLoop {
    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Runs one frame. Any failure leaves the loop in the state where it
    /// failed and every later call is refused.
    pub fn run<O: FrameOps + ?Sized>(
        &mut self,
        ops: &mut O,
        payload: &FramePayload,
    ) -> RenderResult<()> {
        if self.state != FrameState::Idle {
            return Err(RenderError::FrameAborted(self.state));
        }

        self.state = FrameState::Acquiring;
        ops.wait_present_idle()?;
        let image_index = ops.acquire_image()?;

        self.state = FrameState::Recording;
        let cmd = ops.begin_commands()?;
        ops.record_draw(cmd, image_index, payload)?;

        self.state = FrameState::Submitted;
        ops.submit(cmd)?;

        self.state = FrameState::Presenting;
        ops.present(image_index)?;
        ops.wait_device_idle()?;
        ops.free_commands(cmd);

        self.state = FrameState::Idle;
        self.frames += 1;
        trace!(frame = self.frames, image_index, "frame presented");
        Ok(())
    }
}
