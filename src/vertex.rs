use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::color::PackedColor;

/// Number of 4-byte slots in one [`BatchVertex`].
pub const SLOTS_PER_VERTEX: usize = 6;

/// Vertices emitted per quad (two triangles, no index buffer).
pub const VERTICES_PER_QUAD: usize = 6;

/// Vertices emitted per box (six independent quads).
pub const VERTICES_PER_BOX: usize = 6 * VERTICES_PER_QUAD;

/// Scratch slots consumed by one box.
pub const SLOTS_PER_BOX: usize = VERTICES_PER_BOX * SLOTS_PER_VERTEX;

/// Packed vertex record uploaded as-is to the GPU.
///
/// Every field is four bytes wide so the record is six uniform slots:
/// position (3), uv (2) and the `0xRRGGBBAA` colour (1).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BatchVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub color: u32,
}

impl BatchVertex {
    pub fn new(position: Vec3, uv: Vec2, color: PackedColor) -> Self {
        Self {
            position: position.into(),
            uv: uv.into(),
            color: color.0,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }

    pub fn uv(&self) -> Vec2 {
        Vec2::from(self.uv)
    }

    pub fn packed_color(&self) -> PackedColor {
        PackedColor(self.color)
    }

    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<BatchVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x3,
                offset: 0,
                shader_location: 0,
            },
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x2,
                offset: (3 * std::mem::size_of::<f32>()) as u64,
                shader_location: 1,
            },
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Uint32,
                offset: (5 * std::mem::size_of::<f32>()) as u64,
                shader_location: 2,
            },
        ],
    };
}
