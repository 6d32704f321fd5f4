//! # Batch: Accumulate Lit Boxes, Submit Once
//!
//! A [`BatchEngine`] owns a fixed-capacity scratch buffer of packed vertices,
//! a transform stack and a directional light. Callers push model transforms,
//! emit boxes, and finally [`flush`](BatchEngine::flush), which uploads
//! everything written so far to the engine's mesh and issues a single draw.
//!
//! ## Per-face shading
//!
//! Lighting is baked into vertex colours while the batch is built. Each face
//! normal is rotated by the rotation part of the combined transform (scale,
//! skew and translation never touch it) and shaded with
//! `0.8 + 0.2 * dot(normal, sun)`. The shade is uniform across the face.
//!
//! ## Capacity
//!
//! The scratch buffer never grows. Writing past it is a caller bug and
//! panics before anything is written; use [`remaining_slots`] to decide when
//! to flush.
//!
//! [`remaining_slots`]: BatchEngine::remaining_slots

use glam::{Mat4, Vec2, Vec3, Vec4};
use log::{debug, info};

use crate::color::PackedColor;
use crate::config::BatchConfig;
use crate::error::BatchError;
use crate::light::Lighting;
use crate::render::{MeshSink, RenderBackend};
use crate::scene::ChunkCoord;
use crate::transform::{Decomposition, TransformStack};
use crate::vertex::{BatchVertex, SLOTS_PER_VERTEX, VERTICES_PER_BOX, VERTICES_PER_QUAD};

/// Tint used by [`BatchEngine::test`] so probe geometry stands out.
pub const PROBE_TINT: Vec4 = Vec4::new(1.0, 0.0, 1.0, 1.0);

const QUAD_UVS: [Vec2; 4] = [
    Vec2::new(0.0, 0.0),
    Vec2::new(1.0, 0.0),
    Vec2::new(1.0, 1.0),
    Vec2::new(0.0, 1.0),
];

// bottom-left, bottom-right, top-right / bottom-left, top-right, top-left
const QUAD_FAN: [usize; VERTICES_PER_QUAD] = [0, 1, 2, 0, 2, 3];

/// Whether geometry is waiting for a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Accumulating,
    Flushed,
}

/// Retained vertex batcher for one chunk.
pub struct BatchEngine<B: RenderBackend> {
    owner: ChunkCoord,
    vertices: Vec<BatchVertex>,
    capacity: usize,
    transforms: TransformStack,
    lighting: Lighting,
    mesh: B::Mesh,
    placeholder: B::Texture,
}

impl<B: RenderBackend> BatchEngine<B> {
    /// Creates an engine able to hold `capacity_slots` scalar slots between
    /// flushes, using the default sun.
    pub fn new(backend: &B, capacity_slots: usize, owner: ChunkCoord) -> Result<Self, BatchError> {
        Self::with_lighting(backend, capacity_slots, owner, Lighting::default())
    }

    /// Creates an engine from a validated configuration.
    pub fn from_config(
        backend: &B,
        config: &BatchConfig,
        owner: ChunkCoord,
    ) -> Result<Self, BatchError> {
        let lighting = config.lighting()?;
        Self::build(backend, config.capacity_slots, owner, lighting, &config.label)
    }

    pub fn with_lighting(
        backend: &B,
        capacity_slots: usize,
        owner: ChunkCoord,
        lighting: Lighting,
    ) -> Result<Self, BatchError> {
        Self::build(backend, capacity_slots, owner, lighting, "chunk-batch")
    }

    fn build(
        backend: &B,
        capacity_slots: usize,
        owner: ChunkCoord,
        lighting: Lighting,
        label: &str,
    ) -> Result<Self, BatchError> {
        let capacity = capacity_slots / SLOTS_PER_VERTEX;
        if capacity == 0
            || capacity_slots % SLOTS_PER_VERTEX != 0
            || u32::try_from(capacity).is_err()
        {
            return Err(BatchError::InvalidCapacity {
                slots: capacity_slots,
            });
        }

        let mut vertices = Vec::new();
        vertices
            .try_reserve_exact(capacity)
            .map_err(|_| BatchError::Allocation {
                what: "scratch buffer",
                slots: capacity_slots,
            })?;

        let mesh = backend.create_mesh(label, capacity)?;
        let placeholder = backend.create_placeholder_texture(&format!("{label}-placeholder"))?;

        info!("created batch {label} for chunk {owner} with room for {capacity} vertices");

        Ok(Self {
            owner,
            vertices,
            capacity,
            transforms: TransformStack::new(),
            lighting,
            mesh,
            placeholder,
        })
    }

    /// Composes `matrix` onto the combined transform, saving the previous one.
    pub fn push_matrix(&mut self, matrix: Mat4) {
        self.transforms.push(matrix);
    }

    /// Restores the transform saved by the matching [`push_matrix`](Self::push_matrix).
    ///
    /// # Panics
    ///
    /// Panics when the transform stack is empty.
    pub fn pop_matrix(&mut self) {
        self.transforms.pop();
    }

    /// Emits a white box centred at `center` with the given half-extents.
    pub fn emit_box(&mut self, center: Vec3, half_extents: Vec3) {
        self.emit_box_tinted(center, half_extents, Vec4::ONE);
    }

    /// Emits a box whose per-face shade is multiplied by `tint`.
    ///
    /// Each face is an independent quad, so a box is 36 vertices.
    ///
    /// # Panics
    ///
    /// Panics if the box does not fit in the remaining capacity.
    pub fn emit_box_tinted(&mut self, center: Vec3, half_extents: Vec3, tint: Vec4) {
        self.ensure_room(VERTICES_PER_BOX);
        let s = half_extents;
        let faces = [
            // normal, right, up
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        for (normal, right, up) in faces {
            self.plane(center + normal * s, right * s, up * s, normal, tint);
        }
    }

    /// Diagnostic box drawn with [`PROBE_TINT`].
    pub fn test(&mut self, center: Vec3, half_extents: Vec3) {
        debug!("probe box at {center} with half-extents {half_extents}");
        self.emit_box_tinted(center, half_extents, PROBE_TINT);
    }

    /// Emits one lit quad spanning `center ± right ± up`.
    fn plane(&mut self, center: Vec3, right: Vec3, up: Vec3, normal: Vec3, tint: Vec4) {
        self.ensure_room(VERTICES_PER_QUAD);

        let facing = self.transforms.reorient(normal);
        let shade = self.lighting.diffuse(facing);
        let color = PackedColor::from_rgba(Vec4::new(shade, shade, shade, 1.0) * tint);

        let corners = [
            center - right - up,
            center + right - up,
            center + right + up,
            center - right + up,
        ];
        for corner in QUAD_FAN {
            self.vertex(corners[corner], QUAD_UVS[corner], color);
        }
    }

    fn ensure_room(&self, vertices: usize) {
        assert!(
            self.vertices.len() + vertices <= self.capacity,
            "batch for chunk {} overflows: {} of {} vertices used, flush first",
            self.owner,
            self.vertices.len(),
            self.capacity
        );
    }

    fn vertex(&mut self, position: Vec3, uv: Vec2, color: PackedColor) {
        let world = self.transforms.transform_point(position);
        self.vertices.push(BatchVertex::new(world, uv, color));
    }

    /// Uploads pending vertices and draws them with the placeholder texture.
    ///
    /// Returns the number of vertices drawn. An empty batch still issues a
    /// zero-vertex draw.
    pub fn flush(&mut self) -> u32 {
        let count = self.submit(None);
        debug!("flushed {count} vertices for chunk {}", self.owner);
        count
    }

    /// Like [`flush`](Self::flush) but draws with a caller-bound texture.
    pub fn flush_with(&mut self, texture: &B::Texture) -> u32 {
        let count = self.submit(Some(texture));
        debug!(
            "flushed {count} vertices for chunk {} with a bound texture",
            self.owner
        );
        count
    }

    fn submit(&mut self, texture: Option<&B::Texture>) -> u32 {
        let count = u32::try_from(self.vertices.len())
            .expect("vertex count is bounded by a capacity validated to fit u32");
        self.mesh.upload(&self.vertices);
        self.mesh.draw(count, texture.unwrap_or(&self.placeholder));
        self.vertices.clear();
        count
    }

    /// Scalar slots written since the last flush.
    pub fn cursor(&self) -> usize {
        self.vertices.len() * SLOTS_PER_VERTEX
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Capacity in scalar slots.
    pub fn capacity(&self) -> usize {
        self.capacity * SLOTS_PER_VERTEX
    }

    pub fn remaining_slots(&self) -> usize {
        self.capacity() - self.cursor()
    }

    /// Vertices written since the last flush, in emission order.
    pub fn pending(&self) -> &[BatchVertex] {
        &self.vertices
    }

    pub fn state(&self) -> BatchState {
        if self.vertices.is_empty() {
            BatchState::Flushed
        } else {
            BatchState::Accumulating
        }
    }

    pub fn combined(&self) -> Mat4 {
        self.transforms.combined()
    }

    pub fn decomposition(&mut self) -> Decomposition {
        *self.transforms.decomposition()
    }

    /// Number of transforms currently pushed.
    pub fn depth(&self) -> usize {
        self.transforms.depth()
    }

    /// Clears the transform stack for a new batch lifetime.
    pub fn reset_transforms(&mut self) {
        self.transforms.reset();
    }

    pub fn owner(&self) -> ChunkCoord {
        self.owner
    }

    pub fn lighting(&self) -> &Lighting {
        &self.lighting
    }

    pub fn mesh(&self) -> &B::Mesh {
        &self.mesh
    }

    pub fn placeholder(&self) -> &B::Texture {
        &self.placeholder
    }
}
