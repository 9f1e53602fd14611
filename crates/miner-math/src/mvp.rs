// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Model, view and projection matrices laid out column-major, back to back.
/// This is both the push-constant block and the uniform buffer contents.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Mvp {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl Mvp {
    pub const FLOATS: usize = 48;

    pub fn new(model: Mat4, view: Mat4, proj: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl Default for Mvp {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_is_48_floats() {
        assert_eq!(std::mem::size_of::<Mvp>(), Mvp::FLOATS * 4);
        assert_eq!(Mvp::default().as_bytes().len(), 192);
    }

    #[test]
    fn matrices_are_column_major() {
        let model = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let mvp = Mvp::new(model, Mat4::IDENTITY, Mat4::IDENTITY);
        assert_eq!(mvp.model[3], [1.0, 2.0, 3.0, 1.0]);
        let floats: &[f32] = bytemuck::cast_slice(mvp.as_bytes());
        assert_eq!(&floats[12..15], &[1.0, 2.0, 3.0]);
        assert_eq!(floats[16], 1.0);
    }
}
