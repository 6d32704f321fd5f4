use glam::{Mat3, Mat4, Quat, Vec3, Vec4};
use log::warn;

/// Components of an affine (or projective) transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decomposition {
    pub scale: Vec3,
    pub rotation: Quat,
    pub translation: Vec3,
    /// Shear factors: `x` = XZ, `y` = YZ, `z` = XY.
    pub skew: Vec3,
    pub perspective: Vec4,
}

impl Decomposition {
    pub const IDENTITY: Self = Self {
        scale: Vec3::ONE,
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
        skew: Vec3::ZERO,
        perspective: Vec4::W,
    };

    /// Splits `matrix` into scale, rotation, translation, skew and perspective.
    ///
    /// Returns `None` for singular matrices (zero scale on any axis, or a zero
    /// homogeneous coordinate).
    pub fn of(matrix: Mat4) -> Option<Self> {
        let w = matrix.w_axis.w;
        if w.abs() <= f32::EPSILON {
            return None;
        }
        let mut local = matrix * (1.0 / w);

        let mut affine = local;
        affine.x_axis.w = 0.0;
        affine.y_axis.w = 0.0;
        affine.z_axis.w = 0.0;
        affine.w_axis.w = 1.0;
        if affine.determinant().abs() <= f32::EPSILON {
            return None;
        }

        let projective = local.x_axis.w != 0.0 || local.y_axis.w != 0.0 || local.z_axis.w != 0.0;
        let perspective = if projective {
            let rhs = Vec4::new(
                local.x_axis.w,
                local.y_axis.w,
                local.z_axis.w,
                local.w_axis.w,
            );
            local.x_axis.w = 0.0;
            local.y_axis.w = 0.0;
            local.z_axis.w = 0.0;
            local.w_axis.w = 1.0;
            affine.inverse().transpose() * rhs
        } else {
            Vec4::W
        };

        let translation = local.w_axis.truncate();

        let mut row0 = local.x_axis.truncate();
        let mut row1 = local.y_axis.truncate();
        let mut row2 = local.z_axis.truncate();
        let mut scale = Vec3::ZERO;
        let mut skew = Vec3::ZERO;

        scale.x = row0.length();
        row0 = row0.try_normalize()?;

        skew.z = row0.dot(row1);
        row1 -= row0 * skew.z;
        scale.y = row1.length();
        row1 = row1.try_normalize()?;
        skew.z /= scale.y;

        skew.x = row0.dot(row2);
        row2 -= row0 * skew.x;
        skew.y = row1.dot(row2);
        row2 -= row1 * skew.y;
        scale.z = row2.length();
        row2 = row2.try_normalize()?;
        skew.y /= scale.z;
        skew.x /= scale.z;

        // Mirrored basis: fold the reflection into the scale.
        if row0.dot(row1.cross(row2)) < 0.0 {
            scale = -scale;
            row0 = -row0;
            row1 = -row1;
            row2 = -row2;
        }

        let rotation = Quat::from_mat3(&Mat3::from_cols(row0, row1, row2)).normalize();

        Some(Self {
            scale,
            rotation,
            translation,
            skew,
            perspective,
        })
    }
}

impl Default for Decomposition {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Nested model transforms applied to batched geometry.
///
/// The combined matrix is the product of every pushed matrix, composed with
/// column vectors (`combined * m`), so the innermost push acts on the vertex
/// first. The decomposition used for lighting is computed lazily after each
/// change.
#[derive(Debug, Clone)]
pub struct TransformStack {
    saved: Vec<Mat4>,
    combined: Mat4,
    decomposition: Option<Decomposition>,
}

impl TransformStack {
    pub fn new() -> Self {
        Self {
            saved: Vec::new(),
            combined: Mat4::IDENTITY,
            decomposition: Some(Decomposition::IDENTITY),
        }
    }

    /// Saves the current transform and composes `matrix` onto it.
    pub fn push(&mut self, matrix: Mat4) {
        self.saved.push(self.combined);
        self.combined *= matrix;
        self.decomposition = None;
    }

    /// Restores the transform saved by the matching [`push`](Self::push).
    ///
    /// # Panics
    ///
    /// Panics when nothing has been pushed.
    pub fn pop(&mut self) {
        self.combined = self
            .saved
            .pop()
            .expect("pop_matrix called without a matching push_matrix");
        self.decomposition = None;
    }

    /// Drops every saved transform and returns to identity.
    pub fn reset(&mut self) {
        self.saved.clear();
        self.combined = Mat4::IDENTITY;
        self.decomposition = Some(Decomposition::IDENTITY);
    }

    pub fn combined(&self) -> Mat4 {
        self.combined
    }

    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    /// Decomposition of the combined transform. Degenerate transforms fall
    /// back to the identity decomposition so normals stay unrotated.
    pub fn decomposition(&mut self) -> &Decomposition {
        let combined = self.combined;
        self.decomposition.get_or_insert_with(|| {
            Decomposition::of(combined).unwrap_or_else(|| {
                warn!("combined transform is not decomposable; lighting uses unrotated normals");
                Decomposition::IDENTITY
            })
        })
    }

    /// Rotates a face normal by the rotation part of the combined transform.
    pub fn reorient(&mut self, normal: Vec3) -> Vec3 {
        self.decomposition().rotation * normal
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.combined.transform_point3(point)
    }
}

impl Default for TransformStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn approx_vec3(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    #[test]
    fn decomposes_translation_rotation_scale() {
        let rotation = Quat::from_rotation_y(0.7);
        let matrix = Mat4::from_scale_rotation_translation(
            Vec3::new(2.0, 3.0, 4.0),
            rotation,
            Vec3::new(1.0, -2.0, 5.0),
        );
        let parts = Decomposition::of(matrix).unwrap();
        assert!(approx_vec3(parts.scale, Vec3::new(2.0, 3.0, 4.0)));
        assert!(approx_vec3(parts.translation, Vec3::new(1.0, -2.0, 5.0)));
        assert!(parts.rotation.angle_between(rotation) < 1e-4);
        assert!(approx_vec3(parts.skew, Vec3::ZERO));
        assert_eq!(parts.perspective, Vec4::W);
    }

    #[test]
    fn extracts_shear() {
        // x' = x + 0.5 * y
        let mut matrix = Mat4::IDENTITY;
        matrix.y_axis.x = 0.5;
        let parts = Decomposition::of(matrix).unwrap();
        assert!((parts.skew.z - 0.5).abs() < 1e-5);
        assert!(parts.rotation.angle_between(Quat::IDENTITY) < 1e-4);
    }

    #[test]
    fn extracts_perspective_row() {
        let mut matrix = Mat4::IDENTITY;
        matrix.z_axis.w = -1.0;
        let parts = Decomposition::of(matrix).unwrap();
        assert!((parts.perspective - Vec4::new(0.0, 0.0, -1.0, 1.0)).abs().max_element() < 1e-5);
    }

    #[test]
    fn singular_matrices_do_not_decompose() {
        assert!(Decomposition::of(Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0))).is_none());
        assert!(Decomposition::of(Mat4::ZERO).is_none());
    }

    #[test]
    fn nested_push_pop_restores_combined() {
        let mut stack = TransformStack::new();
        let matrices = [
            Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)),
            Mat4::from_rotation_z(0.4),
            Mat4::from_scale(Vec3::splat(2.0)),
        ];
        stack.push(matrices[0]);
        let after_first = stack.combined();
        stack.push(matrices[1]);
        stack.push(matrices[2]);
        assert_eq!(stack.depth(), 3);
        stack.pop();
        stack.pop();
        assert_eq!(stack.combined(), after_first);
        stack.pop();
        assert_eq!(stack.combined(), Mat4::IDENTITY);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn inner_push_applies_first() {
        let mut stack = TransformStack::new();
        stack.push(Mat4::from_translation(Vec3::X * 10.0));
        stack.push(Mat4::from_scale(Vec3::splat(2.0)));
        assert!(approx_vec3(stack.transform_point(Vec3::ONE), Vec3::new(12.0, 2.0, 2.0)));
    }

    #[test]
    fn reorient_ignores_translation_and_scale() {
        let mut stack = TransformStack::new();
        stack.push(Mat4::from_scale_rotation_translation(
            Vec3::splat(5.0),
            Quat::from_rotation_z(FRAC_PI_2),
            Vec3::new(9.0, 9.0, 9.0),
        ));
        assert!(approx_vec3(stack.reorient(Vec3::X), Vec3::Y));
        stack.pop();
        assert!(approx_vec3(stack.reorient(Vec3::X), Vec3::X));
    }

    #[test]
    fn degenerate_transform_keeps_normals_unrotated() {
        let mut stack = TransformStack::new();
        stack.push(Mat4::from_scale(Vec3::ZERO));
        assert_eq!(*stack.decomposition(), Decomposition::IDENTITY);
        assert_eq!(stack.reorient(Vec3::Z), Vec3::Z);
    }

    #[test]
    #[should_panic(expected = "without a matching push_matrix")]
    fn pop_on_empty_stack_panics() {
        TransformStack::new().pop();
    }
}
