//! Collaborators the batch engine draws through.
//!
//! The engine only ever sees a [`RenderBackend`] that can hand out one mesh
//! sink and one placeholder texture. [`RecordingBackend`] keeps everything in
//! memory for headless runs; [`GpuBackend`] uploads to wgpu buffers and draws
//! into an offscreen target.

pub mod common;
pub mod gpu;
pub mod recording;

pub use common::CameraParams;
pub use gpu::{GpuBackend, GpuMesh, GpuTexture};
pub use recording::{DrawCall, RecordingBackend, RecordingMesh, SolidTexture};

use crate::error::BatchError;
use crate::vertex::BatchVertex;

/// Destination for a flushed batch.
///
/// `upload` receives every vertex written since the previous flush and is
/// always followed by exactly one `draw` of the same count.
pub trait MeshSink {
    type Texture;

    fn upload(&mut self, vertices: &[BatchVertex]);

    fn draw(&mut self, vertex_count: u32, texture: &Self::Texture);
}

/// Factory for the resources a batch engine owns.
pub trait RenderBackend {
    type Texture;
    type Mesh: MeshSink<Texture = Self::Texture>;

    /// Creates a mesh able to hold `max_vertices` without reallocating.
    fn create_mesh(&self, label: &str, max_vertices: usize) -> Result<Self::Mesh, BatchError>;

    /// Creates a flat white texture that needs no external asset.
    fn create_placeholder_texture(&self, label: &str) -> Result<Self::Texture, BatchError>;
}
