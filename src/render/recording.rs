use crate::error::BatchError;
use crate::vertex::{BatchVertex, SLOTS_PER_VERTEX};

use super::{MeshSink, RenderBackend};

/// Identifier of the placeholder texture handed out by [`RecordingBackend`].
pub const PLACEHOLDER_TEXTURE_ID: u32 = 0;

/// A single-colour texture known only by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolidTexture {
    pub id: u32,
    pub rgba: [u8; 4],
}

impl SolidTexture {
    pub fn new(id: u32, rgba: [u8; 4]) -> Self {
        Self { id, rgba }
    }
}

/// One `draw` as seen by a [`RecordingMesh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub vertex_count: u32,
    pub texture: u32,
}

/// In-memory mesh that keeps the last upload and a log of every draw.
#[derive(Debug, Clone)]
pub struct RecordingMesh {
    label: String,
    vertices: Vec<BatchVertex>,
    draws: Vec<DrawCall>,
}

impl RecordingMesh {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Vertices from the most recent upload.
    pub fn uploaded(&self) -> &[BatchVertex] {
        &self.vertices
    }

    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    pub fn last_draw(&self) -> Option<DrawCall> {
        self.draws.last().copied()
    }

    pub fn total_vertices_drawn(&self) -> u64 {
        self.draws.iter().map(|draw| u64::from(draw.vertex_count)).sum()
    }
}

impl MeshSink for RecordingMesh {
    type Texture = SolidTexture;

    fn upload(&mut self, vertices: &[BatchVertex]) {
        self.vertices.clear();
        self.vertices.extend_from_slice(vertices);
    }

    fn draw(&mut self, vertex_count: u32, texture: &SolidTexture) {
        self.draws.push(DrawCall {
            vertex_count,
            texture: texture.id,
        });
    }
}

/// Headless backend used by tests and the summary mode of the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordingBackend;

impl RenderBackend for RecordingBackend {
    type Texture = SolidTexture;
    type Mesh = RecordingMesh;

    fn create_mesh(&self, label: &str, max_vertices: usize) -> Result<RecordingMesh, BatchError> {
        let mut vertices = Vec::new();
        vertices
            .try_reserve_exact(max_vertices)
            .map_err(|_| BatchError::Allocation {
                what: "recording mesh",
                slots: max_vertices.saturating_mul(SLOTS_PER_VERTEX),
            })?;
        Ok(RecordingMesh {
            label: label.to_string(),
            vertices,
            draws: Vec::new(),
        })
    }

    fn create_placeholder_texture(&self, _label: &str) -> Result<SolidTexture, BatchError> {
        Ok(SolidTexture::new(PLACEHOLDER_TEXTURE_ID, [255; 4]))
    }
}
