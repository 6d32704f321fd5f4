use glam::Vec3;

use crate::error::BatchError;

/// Direction towards the sun used when nothing else is configured. Applied
/// exactly as written, without renormalizing.
pub const DEFAULT_SUN: Vec3 = Vec3::new(0.411934, 0.863868, -0.279161);

const AMBIENT: f32 = 0.8;
const DIRECTIONAL: f32 = 0.2;

/// Directional lighting applied while geometry is batched.
///
/// The sun vector is fixed for the lifetime of the value. Shading is
/// `0.8 + 0.2 * dot(normal, sun)` with no clamp at zero, so faces turned
/// away from the sun bottom out at 0.6 instead of going dark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lighting {
    sun: Vec3,
}

impl Lighting {
    pub fn new(sun: Vec3) -> Result<Self, BatchError> {
        let normalized = sun.try_normalize().ok_or(BatchError::InvalidLight(sun))?;
        Ok(Self { sun: normalized })
    }

    /// Vector pointing towards the light.
    pub fn sun(&self) -> Vec3 {
        self.sun
    }

    /// Diffuse factor for a unit normal, in `[0.6, 1.0]`.
    pub fn diffuse(&self, normal: Vec3) -> f32 {
        AMBIENT + DIRECTIONAL * normal.dot(self.sun)
    }
}

impl Default for Lighting {
    fn default() -> Self {
        Self { sun: DEFAULT_SUN }
    }
}
