// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
pub mod camera;
pub mod mvp;

pub use camera::{Camera, Movement, Projection};
pub use glam;
pub use mvp::Mvp;
