use crate::error::PreprocessError;

const DETERMINANT_EPSILON: f32 = 1e-8;

/// A 2x3 affine matrix mapping **source** pixel coordinates to
/// **destination** pixel coordinates:
///
/// ```text
/// x' = scale_x * x + skew_x  * y + translate_x
/// y' = skew_y  * x + scale_y * y + translate_y
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub scale_x: f32,
    pub skew_x: f32,
    pub translate_x: f32,
    pub skew_y: f32,
    pub scale_y: f32,
    pub translate_y: f32,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    pub const fn identity() -> Self {
        Self {
            scale_x: 1.0,
            skew_x: 0.0,
            translate_x: 0.0,
            skew_y: 0.0,
            scale_y: 1.0,
            translate_y: 0.0,
        }
    }

    pub fn translate(dx: f32, dy: f32) -> Self {
        Self {
            translate_x: dx,
            translate_y: dy,
            ..Self::identity()
        }
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            scale_x: sx,
            scale_y: sy,
            ..Self::identity()
        }
    }

    /// Rotation about the origin. Positive angles turn clockwise on screen
    /// because image y grows downwards. Quarter turns use exact values.
    pub fn rotate(degrees: f32) -> Self {
        let normalized = degrees.rem_euclid(360.0);
        let (sin, cos) = if normalized == 0.0 {
            (0.0, 1.0)
        } else if normalized == 90.0 {
            (1.0, 0.0)
        } else if normalized == 180.0 {
            (0.0, -1.0)
        } else if normalized == 270.0 {
            (-1.0, 0.0)
        } else {
            normalized.to_radians().sin_cos()
        };

        Self {
            scale_x: cos,
            skew_x: -sin,
            translate_x: 0.0,
            skew_y: sin,
            scale_y: cos,
            translate_y: 0.0,
        }
    }

    /// The transform that applies `self` first and `next` afterwards.
    pub fn then(&self, next: &AffineTransform) -> Self {
        Self {
            scale_x: next.scale_x * self.scale_x + next.skew_x * self.skew_y,
            skew_x: next.scale_x * self.skew_x + next.skew_x * self.scale_y,
            translate_x: next.scale_x * self.translate_x + next.skew_x * self.translate_y + next.translate_x,
            skew_y: next.skew_y * self.scale_x + next.scale_y * self.skew_y,
            scale_y: next.skew_y * self.skew_x + next.scale_y * self.scale_y,
            translate_y: next.skew_y * self.translate_x + next.scale_y * self.translate_y + next.translate_y,
        }
    }

    #[inline]
    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.scale_x * x + self.skew_x * y + self.translate_x,
            self.skew_y * x + self.scale_y * y + self.translate_y,
        )
    }

    pub fn determinant(&self) -> f32 {
        self.scale_x * self.scale_y - self.skew_x * self.skew_y
    }

    /// Destination-to-source mapping, or `None` when the matrix is singular.
    pub fn invert(&self) -> Option<Self> {
        let det = self.determinant();
        if det.abs() < DETERMINANT_EPSILON {
            return None;
        }

        let scale_x = self.scale_y / det;
        let skew_x = -self.skew_x / det;
        let skew_y = -self.skew_y / det;
        let scale_y = self.scale_x / det;

        Some(Self {
            scale_x,
            skew_x,
            translate_x: -(scale_x * self.translate_x + skew_x * self.translate_y),
            skew_y,
            scale_y,
            translate_y: -(skew_y * self.translate_x + scale_y * self.translate_y),
        })
    }

    pub fn is_identity(&self, epsilon: f32) -> bool {
        let id = Self::identity();
        (self.scale_x - id.scale_x).abs() <= epsilon
            && self.skew_x.abs() <= epsilon
            && self.translate_x.abs() <= epsilon
            && self.skew_y.abs() <= epsilon
            && (self.scale_y - id.scale_y).abs() <= epsilon
            && self.translate_y.abs() <= epsilon
    }

    /// True when the matrix only scales and translates along the axes.
    pub fn is_axis_aligned(&self) -> bool {
        self.skew_x == 0.0 && self.skew_y == 0.0
    }
}

/// Build the single matrix that undoes sensor rotation and scales the
/// (cropped) source onto the destination.
///
/// Steps, each applied to the point after the previous one:
/// recenter on the origin, rotate, scale the effective (possibly transposed)
/// size onto the destination, re-anchor on the destination center.
/// Recentering and re-anchoring only happen for non-zero rotations, and the
/// scale is skipped when the sizes already match.
pub fn transform_matrix(
    rotation_degrees: i32,
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
) -> Result<AffineTransform, PreprocessError> {
    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(PreprocessError::Transform(format!(
            "cannot map {src_width}x{src_height} onto {dst_width}x{dst_height}"
        )));
    }

    let mut matrix = AffineTransform::identity();

    if rotation_degrees != 0 {
        matrix = matrix
            .then(&AffineTransform::translate(
                -(src_width as f32) / 2.0,
                -(src_height as f32) / 2.0,
            ))
            .then(&AffineTransform::rotate(rotation_degrees as f32));
    }

    let transpose = (rotation_degrees.unsigned_abs() + 90) % 180 == 0;
    let (effective_width, effective_height) = if transpose {
        (src_height, src_width)
    } else {
        (src_width, src_height)
    };

    if (effective_width, effective_height) != (dst_width, dst_height) {
        matrix = matrix.then(&AffineTransform::scale(
            dst_width as f32 / effective_width as f32,
            dst_height as f32 / effective_height as f32,
        ));
    }

    if rotation_degrees != 0 {
        matrix = matrix.then(&AffineTransform::translate(
            dst_width as f32 / 2.0,
            dst_height as f32 / 2.0,
        ));
    }

    if matrix.invert().is_none() {
        return Err(PreprocessError::Transform(format!(
            "matrix for {rotation_degrees} deg {src_width}x{src_height} -> {dst_width}x{dst_height} is not invertible"
        )));
    }

    Ok(matrix)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlanKey {
    rotation_degrees: i32,
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
}

/// Caches the last planned transform and only recomputes it when the
/// rotation or either size changes.
#[derive(Debug, Default)]
pub struct TransformPlanner {
    cached: Option<(PlanKey, AffineTransform)>,
}

impl TransformPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(
        &mut self,
        rotation_degrees: i32,
        src_width: u32,
        src_height: u32,
        dst_width: u32,
        dst_height: u32,
    ) -> Result<AffineTransform, PreprocessError> {
        let key = PlanKey {
            rotation_degrees,
            src_width,
            src_height,
            dst_width,
            dst_height,
        };

        if let Some((cached_key, transform)) = self.cached {
            if cached_key == key {
                return Ok(transform);
            }
        }

        let transform = transform_matrix(rotation_degrees, src_width, src_height, dst_width, dst_height)?;
        tracing::debug!(
            rotation_degrees,
            src_width,
            src_height,
            dst_width,
            dst_height,
            ?transform,
            "Planned frame transform"
        );
        self.cached = Some((key, transform));
        Ok(transform)
    }

    /// The transform returned by the last successful `plan` call.
    pub fn cached(&self) -> Option<AffineTransform> {
        self.cached.map(|(_, transform)| transform)
    }
}
