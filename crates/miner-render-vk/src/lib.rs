// SPDX-License-Identifier: CEPL-1.0
//! Vulkan render core for the voxel viewer.
//!
//! [`Context`] owns the instance, device, presentation chain, pipeline and
//! mapped buffers, and implements [`miner_render::Renderer`]. The policy
//! pieces (adapter scoring, surface choices, pipeline state, the frame
//! protocol) live in their own modules and are usable without a device.

pub mod adapter;
pub mod buffer;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod frame;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod swapchain;

pub use context::{Context, ContextConfig, ShaderSource};
pub use error::{RenderError, RenderResult};
pub use frame::{FrameLoop, FrameOps, FramePayload, FrameState};
pub use pipeline::Winding;
