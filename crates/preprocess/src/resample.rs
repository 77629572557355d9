use crate::error::PreprocessError;
use crate::packed::PackedPixelBuffer;
use crate::scratch::try_alloc;
use crate::transform::AffineTransform;
use common::span;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use image::RgbaImage;

const COVER_EPSILON: f32 = 1e-3;

/// Paints a source surface through an affine transform into a fixed-size
/// destination and packs the result for the detector.
///
/// The destination surface is allocated once. It is cleared to transparent
/// black before every draw, so pixels the transform does not reach never
/// carry content from an earlier frame.
pub struct FrameResampler {
    width: u32,
    height: u32,
    surface: Vec<u8>,
    resizer: Resizer,
}

impl FrameResampler {
    pub fn new(width: u32, height: u32) -> Result<Self, PreprocessError> {
        if width == 0 || height == 0 {
            return Err(PreprocessError::Resource(format!(
                "destination surface {width}x{height} is empty"
            )));
        }
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| PreprocessError::Resource(format!("surface {width}x{height} overflows usize")))?;

        Ok(Self {
            width,
            height,
            surface: try_alloc(len)?,
            resizer: Resizer::new(),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The RGBA destination surface as painted by the last `resample` call.
    pub fn surface(&self) -> &[u8] {
        &self.surface
    }

    pub fn resample(
        &mut self,
        source: &RgbaImage,
        transform: &AffineTransform,
        out: &mut PackedPixelBuffer,
    ) -> Result<(), PreprocessError> {
        let _s = span!("resample");

        if (out.width(), out.height()) != (self.width, self.height) {
            return Err(PreprocessError::Resource(format!(
                "packed buffer is {}x{} but the resampler draws {}x{}",
                out.width(),
                out.height(),
                self.width,
                self.height
            )));
        }

        let (src_width, src_height) = source.dimensions();
        if src_width == 0 || src_height == 0 {
            return Err(PreprocessError::Format("source surface is empty".to_string()));
        }

        self.surface.fill(0);

        if (src_width, src_height) == (self.width, self.height) && transform.is_identity(1e-6) {
            self.surface.copy_from_slice(source.as_raw());
        } else if self.covers_destination(transform, src_width, src_height) {
            let _s = common::span_debug!("resize_convolution");
            let src = ImageRef::new(src_width, src_height, source.as_raw(), PixelType::U8x4)?;
            let mut dst = Image::from_slice_u8(self.width, self.height, &mut self.surface, PixelType::U8x4)?;
            self.resizer.resize(
                &src,
                &mut dst,
                &ResizeOptions::new()
                    .resize_alg(ResizeAlg::Convolution(FilterType::Bilinear))
                    .use_alpha(false),
            )?;
        } else {
            let inverse = transform.invert().ok_or_else(|| {
                PreprocessError::Transform(format!("{transform:?} has no inverse"))
            })?;
            self.warp(source, &inverse);
        }

        out.pack_rgba(&self.surface)
    }

    /// A positive axis-aligned scale with no offset that lands the whole
    /// source exactly on the whole destination.
    fn covers_destination(&self, t: &AffineTransform, src_width: u32, src_height: u32) -> bool {
        t.is_axis_aligned()
            && t.scale_x > 0.0
            && t.scale_y > 0.0
            && t.translate_x.abs() < COVER_EPSILON
            && t.translate_y.abs() < COVER_EPSILON
            && (t.scale_x * src_width as f32 - self.width as f32).abs() < COVER_EPSILON
            && (t.scale_y * src_height as f32 - self.height as f32).abs() < COVER_EPSILON
    }

    /// Inverse-map every destination pixel center into the source and
    /// sample it bilinearly.
    fn warp(&mut self, source: &RgbaImage, inverse: &AffineTransform) {
        let _s = common::span_debug!("warp_bilinear");

        let (src_width, src_height) = source.dimensions();
        let (sw, sh) = (src_width as f32, src_height as f32);
        let src = source.as_raw();
        let row_bytes = self.width as usize * 4;

        for (dy, row) in self.surface.chunks_exact_mut(row_bytes).enumerate() {
            for (dx, px) in row.chunks_exact_mut(4).enumerate() {
                let (sx, sy) = inverse.map_point(dx as f32 + 0.5, dy as f32 + 0.5);
                if sx < 0.0 || sy < 0.0 || sx >= sw || sy >= sh {
                    continue;
                }
                px.copy_from_slice(&sample_bilinear(
                    src,
                    src_width as usize,
                    src_height as usize,
                    sx,
                    sy,
                ));
            }
        }
    }
}

/// Bilinear sample at continuous coordinates where pixel `i` covers
/// `[i, i + 1)`; neighbours are clamped to the image edge.
fn sample_bilinear(src: &[u8], width: usize, height: usize, x: f32, y: f32) -> [u8; 4] {
    let fx = (x - 0.5).max(0.0);
    let fy = (y - 0.5).max(0.0);
    let x0 = (fx.floor() as usize).min(width - 1);
    let y0 = (fy.floor() as usize).min(height - 1);
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let tx = (fx - x0 as f32).clamp(0.0, 1.0);
    let ty = (fy - y0 as f32).clamp(0.0, 1.0);

    let at = |x: usize, y: usize| (y * width + x) * 4;
    let (p00, p10, p01, p11) = (at(x0, y0), at(x1, y0), at(x0, y1), at(x1, y1));

    let mut out = [0u8; 4];
    for (c, value) in out.iter_mut().enumerate() {
        let top = src[p00 + c] as f32 * (1.0 - tx) + src[p10 + c] as f32 * tx;
        let bottom = src[p01 + c] as f32 * (1.0 - tx) + src[p11 + c] as f32 * tx;
        *value = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packed::unpack;
    use crate::transform::transform_matrix;
    use image::Rgba;

    fn uniform(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(color))
    }

    #[test]
    fn test_quarter_turn_moves_top_left_to_top_right() {
        let mut source = uniform(4, 2, [0, 0, 255, 255]);
        source.put_pixel(0, 0, Rgba([255, 0, 0, 255]));

        let transform = transform_matrix(90, 4, 2, 2, 4).unwrap();
        let mut resampler = FrameResampler::new(2, 4).unwrap();
        let mut out = PackedPixelBuffer::new(2, 4).unwrap();

        resampler.resample(&source, &transform, &mut out).unwrap();

        assert_eq!(unpack(out.pixel(1, 0).unwrap()), [255, 0, 0, 255]);
        assert_eq!(unpack(out.pixel(0, 0).unwrap()), [0, 0, 255, 255]);
        assert_eq!(unpack(out.pixel(1, 3).unwrap()), [0, 0, 255, 255]);
    }

    #[test]
    fn test_scaled_uniform_source_stays_uniform() {
        let source = uniform(640, 480, [90, 160, 30, 255]);
        let transform = transform_matrix(0, 640, 480, 300, 300).unwrap();
        let mut resampler = FrameResampler::new(300, 300).unwrap();
        let mut out = PackedPixelBuffer::new(300, 300).unwrap();

        resampler.resample(&source, &transform, &mut out).unwrap();

        for &pixel in out.as_slice() {
            let [r, g, b, _] = unpack(pixel);
            assert!(r.abs_diff(90) <= 1 && g.abs_diff(160) <= 1 && b.abs_diff(30) <= 1);
        }
    }

    #[test]
    fn test_rotated_uniform_source_fills_destination() {
        let source = uniform(64, 48, [10, 20, 30, 255]);
        let transform = transform_matrix(270, 64, 48, 30, 30).unwrap();
        let mut resampler = FrameResampler::new(30, 30).unwrap();
        let mut out = PackedPixelBuffer::new(30, 30).unwrap();

        resampler.resample(&source, &transform, &mut out).unwrap();

        assert!(out.as_slice().iter().all(|&p| unpack(p) == [10, 20, 30, 255]));
    }

    #[test]
    fn test_uncovered_pixels_are_cleared_between_draws() {
        let source = uniform(4, 4, [200, 200, 200, 255]);
        let mut resampler = FrameResampler::new(4, 4).unwrap();
        let mut out = PackedPixelBuffer::new(4, 4).unwrap();

        resampler
            .resample(&source, &AffineTransform::identity(), &mut out)
            .unwrap();
        assert!(out.as_slice().iter().all(|&p| p == 0xFFC8_C8C8));

        resampler
            .resample(&source, &AffineTransform::scale(0.5, 0.5), &mut out)
            .unwrap();

        assert_eq!(out.pixel(0, 0), Some(0xFFC8_C8C8));
        assert_eq!(out.pixel(3, 3), Some(0), "Stale pixels must be cleared to transparent black");
        assert_eq!(out.pixel(2, 0), Some(0));
    }

    #[test]
    fn test_wrong_output_size_is_resource_error() {
        let source = uniform(4, 4, [0, 0, 0, 255]);
        let mut resampler = FrameResampler::new(4, 4).unwrap();
        let mut out = PackedPixelBuffer::new(3, 3).unwrap();

        let result = resampler.resample(&source, &AffineTransform::identity(), &mut out);
        assert!(matches!(result, Err(PreprocessError::Resource(_))));
    }
}
