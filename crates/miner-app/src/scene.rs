// SPDX-License-Identifier: CEPL-1.0
//! The test scene: a small voxel grid meshed into cubes.

use miner_render::Vertex;

pub const GRID: usize = 3;
const CUBE_VERTS: usize = 8;

const CUBE: [Vertex; CUBE_VERTS] = [
    Vertex::new([-1.0, -1.0, -1.0], [1.0, 0.0, 0.0]),
    Vertex::new([0.0, -1.0, -1.0], [0.0, 1.0, 0.0]),
    Vertex::new([0.0, 0.0, -1.0], [0.0, 0.0, 1.0]),
    Vertex::new([-1.0, 0.0, -1.0], [1.0, 1.0, 1.0]),
    Vertex::new([-1.0, -1.0, 0.0], [1.0, 0.0, 0.0]),
    Vertex::new([0.0, -1.0, 0.0], [0.0, 1.0, 0.0]),
    Vertex::new([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
    Vertex::new([-1.0, 0.0, 0.0], [1.0, 1.0, 1.0]),
];

#[rustfmt::skip]
const CUBE_INDICES: [u16; 36] = [
    2, 1, 0, 0, 3, 2, // back
    4, 5, 6, 6, 7, 4, // front
    3, 0, 4, 4, 7, 3, // left
    5, 1, 2, 2, 6, 5, // right
    4, 0, 1, 1, 5, 4, // top
    2, 3, 7, 7, 6, 2, // bottom
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoxelKind {
    #[default]
    Air,
    Core,
    Floor,
    Stone,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Voxel {
    pub transparent: bool,
    pub kind: VoxelKind,
}

pub struct Scene {
    pub voxels: [[[Voxel; GRID]; GRID]; GRID],
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
}

impl Scene {
    pub fn generate() -> Self {
        let mut scene = Self {
            voxels: [[[Voxel::default(); GRID]; GRID]; GRID],
            vertices: Vec::new(),
            indices: Vec::new(),
        };
        scene.fill();
        scene.mesh();
        scene
    }

    fn fill(&mut self) {
        let lo = (GRID / 2) as f32;
        let hi = GRID as f32 * 0.75;
        let inner = |n: usize| (n as f32) > lo && (n as f32) < hi;
        for (i, plane) in self.voxels.iter_mut().enumerate() {
            for (j, row) in plane.iter_mut().enumerate() {
                for (k, voxel) in row.iter_mut().enumerate() {
                    let kind = if inner(i) && inner(j) && inner(k) {
                        VoxelKind::Core
                    } else if i == 0 {
                        VoxelKind::Floor
                    } else {
                        VoxelKind::Stone
                    };
                    *voxel = Voxel {
                        transparent: false,
                        kind,
                    };
                }
            }
        }
    }

    /// Emits one offset copy of the unit cube per opaque voxel.
    fn mesh(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        for (i, plane) in self.voxels.iter().enumerate() {
            for (j, row) in plane.iter().enumerate() {
                for (k, voxel) in row.iter().enumerate() {
                    if voxel.transparent {
                        continue;
                    }
                    let base = self.vertices.len() as u16;
                    let offset = [i as f32, j as f32, k as f32];
                    self.vertices.extend(CUBE.iter().map(|v| Vertex {
                        pos: [
                            v.pos[0] + offset[0],
                            v.pos[1] + offset[1],
                            v.pos[2] + offset[2],
                        ],
                        color: v.color,
                    }));
                    self.indices.extend(CUBE_INDICES.iter().map(|&idx| idx + base));
                }
            }
        }
    }

    pub fn vertex_bytes(&self) -> usize {
        std::mem::size_of_val(self.vertices.as_slice())
    }

    pub fn index_bytes(&self) -> usize {
        std::mem::size_of_val(self.indices.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_grid_meshes_every_cube() {
        let scene = Scene::generate();
        let cubes = GRID * GRID * GRID;
        assert_eq!(scene.vertices.len(), cubes * CUBE_VERTS);
        assert_eq!(scene.indices.len(), cubes * 36);
        assert_eq!(
            scene.indices.iter().copied().max(),
            Some((cubes * CUBE_VERTS - 1) as u16)
        );
    }

    #[test]
    fn cube_indices_stay_within_their_cube() {
        let scene = Scene::generate();
        for (cube, chunk) in scene.indices.chunks(36).enumerate() {
            let base = (cube * CUBE_VERTS) as u16;
            assert!(chunk.iter().all(|&i| i >= base && i < base + CUBE_VERTS as u16));
        }
    }

    #[test]
    fn voxel_kinds() {
        let scene = Scene::generate();
        assert_eq!(scene.voxels[2][2][2].kind, VoxelKind::Core);
        assert_eq!(scene.voxels[0][1][2].kind, VoxelKind::Floor);
        assert_eq!(scene.voxels[1][1][1].kind, VoxelKind::Stone);
    }

    #[test]
    fn mesh_fits_default_buffers() {
        let scene = Scene::generate();
        assert!(scene.vertex_bytes() <= 10240);
        assert!(scene.index_bytes() <= 10240);
    }

    #[test]
    fn last_cube_is_offset_by_grid_position() {
        let scene = Scene::generate();
        let last = &scene.vertices[scene.vertices.len() - CUBE_VERTS..];
        assert_eq!(last[6].pos, [2.0, 2.0, 2.0]);
        assert_eq!(last[0].pos, [1.0, 1.0, 1.0]);
    }
}
