// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub use miner_math::Mvp;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

/// One mesh vertex: position then colour, tightly packed (24 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;
    pub const POS_OFFSET: u32 = std::mem::offset_of!(Vertex, pos) as u32;
    pub const COLOR_OFFSET: u32 = std::mem::offset_of!(Vertex, color) as u32;

    pub const fn new(pos: [f32; 3], color: [f32; 3]) -> Self {
        Self { pos, color }
    }
}

pub trait Renderer {
    type Config;

    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        config: Self::Config,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Draws one frame with the mesh and transform uploaded so far.
    fn render(&mut self) -> Result<()>;
    /// Copies mesh data into the persistently mapped vertex and index buffers.
    fn upload_mesh(&mut self, vertices: &[Vertex], indices: &[u16]) -> Result<()>;
    fn set_transform(&mut self, mvp: &Mvp) -> Result<()>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_matches_pipeline_input() {
        assert_eq!(Vertex::STRIDE, 24);
        assert_eq!(Vertex::POS_OFFSET, 0);
        assert_eq!(Vertex::COLOR_OFFSET, 12);
    }

    #[test]
    fn vertices_cast_to_bytes() {
        let verts = [Vertex::new([1.0, 2.0, 3.0], [0.5, 0.5, 0.5]); 2];
        let bytes: &[u8] = bytemuck::cast_slice(&verts);
        assert_eq!(bytes.len(), 48);
    }
}
