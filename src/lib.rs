//! Retained vertex batching for chunk geometry.
//!
//! A [`BatchEngine`] accumulates lit, textured boxes into one fixed-capacity
//! buffer of packed vertices and submits it with a single draw on flush.
//! GPU access sits behind the [`RenderBackend`] trait so the batching logic
//! runs the same against wgpu or the in-memory [`RecordingBackend`].

pub mod batch;
pub mod color;
pub mod config;
pub mod error;
pub mod light;
pub mod render;
pub mod scene;
pub mod transform;
pub mod vertex;

pub use batch::{BatchEngine, BatchState};
pub use color::{pack_rgba, unpack_rgba, PackedColor};
pub use config::BatchConfig;
pub use error::BatchError;
pub use light::Lighting;
pub use render::{
    CameraParams, GpuBackend, MeshSink, RecordingBackend, RecordingMesh, RenderBackend,
};
pub use scene::{ChunkCoord, ChunkScene, EmitStats, SceneNode};
pub use transform::{Decomposition, TransformStack};
pub use vertex::{BatchVertex, SLOTS_PER_BOX, SLOTS_PER_VERTEX};
