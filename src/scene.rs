// Scene data - one colored triangle
//
// Clip space, y down: apex at the top, clockwise winding.

use glam::{Vec2, Vec3};

/// Interleaved vertex as laid out in the vertex buffer (binding 0)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub pos: Vec2,
    pub color: Vec3,
}

impl Vertex {
    pub const fn new(pos: Vec2, color: Vec3) -> Self {
        Self { pos, color }
    }

    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;
    pub const POS_OFFSET: u32 = std::mem::offset_of!(Vertex, pos) as u32;
    pub const COLOR_OFFSET: u32 = std::mem::offset_of!(Vertex, color) as u32;
}

pub const TRIANGLE: [Vertex; 3] = [
    Vertex::new(Vec2::new(0.0, -0.5), Vec3::new(1.0, 0.0, 0.0)),
    Vertex::new(Vec2::new(0.5, 0.5), Vec3::new(0.0, 1.0, 0.0)),
    Vertex::new(Vec2::new(-0.5, 0.5), Vec3::new(0.0, 0.0, 1.0)),
];
