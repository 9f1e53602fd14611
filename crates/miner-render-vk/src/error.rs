// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

use crate::frame::FrameState;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to load the Vulkan loader: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("window handle unavailable: {0}")]
    Handle(#[from] raw_window_handle::HandleError),

    #[error("failed to find GPUs with Vulkan support")]
    NoAdapters,

    #[error("failed to find a suitable GPU")]
    NoCompatibleAdapter,

    #[error("instance layer {0} is not supported")]
    MissingLayer(String),

    #[error("instance extension {0} is not supported")]
    MissingExtension(String),

    #[error("{op} failed: {result}")]
    Api { op: &'static str, result: vk::Result },

    #[error("no memory type in {type_bits:#034b} offers {flags:?}")]
    NoMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },

    #[error("failed to load shader {}: {source}", path.display())]
    Shader {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{requested} bytes at offset {offset} overflow a mapping of {capacity} bytes")]
    BufferOverflow {
        offset: usize,
        requested: usize,
        capacity: usize,
    },

    #[error("a previous frame failed while {0:?}; the frame loop cannot continue")]
    FrameAborted(FrameState),
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Tags a raw `vk::Result` failure with the name of the call that produced it.
pub trait VkCheck<T> {
    fn check(self, op: &'static str) -> RenderResult<T>;
}

impl<T> VkCheck<T> for Result<T, vk::Result> {
    fn check(self, op: &'static str) -> RenderResult<T> {
        self.map_err(|result| RenderError::Api { op, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_names_the_failing_call() {
        let raw: Result<(), vk::Result> = Err(vk::Result::ERROR_DEVICE_LOST);
        let err = raw.check("vkQueueSubmit").unwrap_err();
        assert!(matches!(
            err,
            RenderError::Api {
                op: "vkQueueSubmit",
                result: vk::Result::ERROR_DEVICE_LOST
            }
        ));
        assert!(err.to_string().starts_with("vkQueueSubmit failed"));
    }

    #[test]
    fn overflow_message_carries_sizes() {
        let err = RenderError::BufferOverflow {
            offset: 8,
            requested: 16,
            capacity: 20,
        };
        assert_eq!(
            err.to_string(),
            "16 bytes at offset 8 overflow a mapping of 20 bytes"
        );
    }
}
