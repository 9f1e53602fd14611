// SPDX-License-Identifier: CEPL-1.0
//! Free-fly camera driven by yaw/pitch angles in degrees.

use bitflags::bitflags;
use glam::{Mat4, Vec3};

pub const PITCH_LIMIT: f32 = 89.0;
const YAW_WRAP: f32 = 360.0;

bitflags! {
    /// Directions requested for this frame, relative to where the camera looks.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Movement: u8 {
        const FORWARD  = 1 << 0;
        const BACKWARD = 1 << 1;
        const LEFT     = 1 << 2;
        const RIGHT    = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl Default for Camera {
    fn default() -> Self {
        // Outside the voxel grid, looking back at the origin.
        Self {
            position: Vec3::new(2.0, 2.0, 2.0),
            yaw: 225.0,
            pitch: -35.0,
        }
    }
}

impl Camera {
    pub fn front(&self) -> Vec3 {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        Vec3::new(pitch.cos() * yaw.cos(), pitch.sin(), pitch.cos() * yaw.sin()).normalize()
    }

    pub fn right(&self) -> Vec3 {
        self.front().cross(Vec3::Y).normalize()
    }

    /// Applies a cursor delta in window pixels. Positive `dy` means the
    /// cursor moved down, which tilts the view down.
    pub fn rotate(&mut self, dx: f32, dy: f32, sensitivity: f32) {
        self.yaw += dx * sensitivity;
        self.pitch -= dy * sensitivity;

        self.pitch = self.pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        if self.yaw > YAW_WRAP {
            self.yaw -= YAW_WRAP;
        } else if self.yaw < -YAW_WRAP {
            self.yaw += YAW_WRAP;
        }
    }

    pub fn translate(&mut self, movement: Movement, distance: f32) {
        let front = self.front();
        let right = self.right();
        let mut step = Vec3::ZERO;
        if movement.contains(Movement::FORWARD) {
            step += front;
        }
        if movement.contains(Movement::BACKWARD) {
            step -= front;
        }
        if movement.contains(Movement::RIGHT) {
            step += right;
        }
        if movement.contains(Movement::LEFT) {
            step -= right;
        }
        self.position += step * distance;
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front(), Vec3::Y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub fov_y_deg: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Projection {
    pub fn new(fov_y_deg: f32, width: u32, height: u32, near: f32, far: f32) -> Self {
        Self {
            fov_y_deg,
            aspect: width.max(1) as f32 / height.max(1) as f32,
            near,
            far,
        }
    }

    /// Right-handed perspective with clip-space Y pointing down.
    pub fn matrix(&self) -> Mat4 {
        let mut proj =
            Mat4::perspective_rh(self.fov_y_deg.to_radians(), self.aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_camera_looks_at_origin() {
        let cam = Camera::default();
        let to_origin = (-cam.position).normalize();
        assert!(cam.front().dot(to_origin) > 0.99);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut cam = Camera::default();
        cam.rotate(0.0, -100_000.0, 0.05);
        assert_eq!(cam.pitch, PITCH_LIMIT);
        cam.rotate(0.0, 100_000.0, 0.05);
        assert_eq!(cam.pitch, -PITCH_LIMIT);
    }

    #[test]
    fn yaw_wraps_past_full_turn() {
        let mut cam = Camera::default();
        cam.rotate(4000.0, 0.0, 0.05);
        assert!((cam.yaw - 65.0).abs() < 1e-3);
    }

    #[test]
    fn forward_moves_along_front() {
        let mut cam = Camera::default();
        let start = cam.position;
        cam.translate(Movement::FORWARD, 1.0);
        assert!((cam.position - start - cam.front()).length() < 1e-5);
        cam.translate(Movement::FORWARD | Movement::BACKWARD, 1.0);
        assert!((cam.position - start - cam.front()).length() < 1e-5);
    }

    #[test]
    fn projection_flips_y() {
        let proj = Projection::new(45.0, 800, 600, 0.1, 1000.0);
        assert!(proj.matrix().y_axis.y < 0.0);
        assert!((proj.aspect - 800.0 / 600.0).abs() < 1e-6);
    }
}
