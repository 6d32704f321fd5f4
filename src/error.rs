use thiserror::Error;

use crate::vertex::SLOTS_PER_VERTEX;

/// Failures that can occur while building a batch engine or its GPU resources.
///
/// Everything past construction is infallible: overflowing the scratch buffer
/// or popping an empty transform stack are caller bugs and panic instead.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(
        "capacity of {slots} slots is not a non-zero multiple of {} within a 32-bit vertex count",
        SLOTS_PER_VERTEX
    )]
    InvalidCapacity { slots: usize },

    #[error("unable to reserve {slots} slots for the {what}")]
    Allocation { what: &'static str, slots: usize },

    #[error("sun direction {0:?} cannot be normalized")]
    InvalidLight(glam::Vec3),

    #[error("no suitable GPU adapter is available")]
    AdapterUnavailable,

    #[error("failed to request GPU device: {0}")]
    DeviceRequest(String),
}
