use crate::config::{ColorRange, FrameCapabilities, PlaneLayout};
use crate::error::PreprocessError;
use crate::frame::{CropRect, Frame, Plane};
use crate::scratch::ensure_len;
use common::span;
use image::RgbaImage;
use rayon::prelude::*;

/// Converts sensor frames into interleaved RGBA.
///
/// YUV 4:2:0 frames are first staged into an NV21 scratch buffer (cropped
/// luma followed by interleaved V/U at half resolution), which is then
/// expanded to RGBA. The scratch buffer is owned by the converter and only
/// reallocated when the cropped pixel count changes.
pub struct ColorConverter {
    capabilities: FrameCapabilities,
    staging: Vec<u8>,
}

/// Where one source plane lands in the staging buffer.
#[derive(Clone, Copy)]
struct StagingTarget {
    offset: usize,
    stride: usize,
}

/// Byte extents of one cropped row inside a plane.
#[derive(Clone, Copy)]
struct RowGeometry {
    /// Offset of the first sample of a row, relative to the row start.
    lead: usize,
    /// Bytes spanned from the first to the last sample of a row.
    len: usize,
}

impl ColorConverter {
    pub fn new(capabilities: FrameCapabilities) -> Self {
        Self {
            capabilities,
            staging: Vec::new(),
        }
    }

    pub fn capabilities(&self) -> FrameCapabilities {
        self.capabilities
    }

    /// The frame's crop, or a `Format` error when it is empty or reaches
    /// outside the frame. Callers sizing a surface from the crop check here
    /// first.
    pub fn check_crop(frame: &Frame) -> Result<CropRect, PreprocessError> {
        let crop = frame.crop();
        if crop.width() == 0
            || crop.height() == 0
            || crop.right > frame.width()
            || crop.bottom > frame.height()
        {
            return Err(PreprocessError::Format(format!(
                "crop {:?} is empty or outside the {}x{} frame",
                crop,
                frame.width(),
                frame.height()
            )));
        }
        Ok(crop)
    }

    /// Convert the cropped region of `frame` into `out`, which must be
    /// exactly crop width x crop height.
    pub fn convert(&mut self, frame: &Frame, out: &mut RgbaImage) -> Result<(), PreprocessError> {
        let _s = span!("convert");

        let crop = Self::check_crop(frame)?;

        if out.dimensions() != (crop.width(), crop.height()) {
            return Err(PreprocessError::Format(format!(
                "surface is {}x{} but crop is {}x{}",
                out.width(),
                out.height(),
                crop.width(),
                crop.height()
            )));
        }

        let expected_planes = self.capabilities.layout.plane_count();
        if frame.planes().len() != expected_planes {
            return Err(PreprocessError::Format(format!(
                "{:?} frames need {} planes, got {}",
                self.capabilities.layout,
                expected_planes,
                frame.planes().len()
            )));
        }

        tracing::trace!(
            width = crop.width(),
            height = crop.height(),
            layout = ?self.capabilities.layout,
            "Converting frame"
        );

        match self.capabilities.layout {
            PlaneLayout::Yuv420 => {
                let chroma = self.stage_nv21(frame.planes(), crop)?;
                self.nv21_to_rgba(crop, chroma, out);
            }
            PlaneLayout::Rgba8888 => copy_rgba(&frame.planes()[0], crop, out)?,
        }

        Ok(())
    }

    fn stage_nv21(&mut self, planes: &[Plane], crop: CropRect) -> Result<CropRect, PreprocessError> {
        let _s = common::span_debug!("stage_nv21");

        let chroma = crop.halved();
        if chroma.width() == 0 || chroma.height() == 0 {
            return Err(PreprocessError::Format(format!(
                "crop {}x{} is too small for 4:2:0 chroma",
                crop.width(),
                crop.height()
            )));
        }

        let pixel_count = crop.width() as usize * crop.height() as usize;
        let chroma_count = chroma.width() as usize * chroma.height() as usize;
        ensure_len(&mut self.staging, pixel_count + 2 * chroma_count)?;

        for (index, plane) in planes.iter().enumerate() {
            let (plane_crop, target) = match index {
                0 => (crop, StagingTarget { offset: 0, stride: 1 }),
                // U goes to the odd slots, V to the even ones (NV21 order).
                1 => (
                    chroma,
                    StagingTarget {
                        offset: pixel_count + 1,
                        stride: 2,
                    },
                ),
                _ => (
                    chroma,
                    StagingTarget {
                        offset: pixel_count,
                        stride: 2,
                    },
                ),
            };
            stage_plane(plane, index, plane_crop, target, &mut self.staging)?;
        }

        Ok(chroma)
    }

    fn nv21_to_rgba(&self, crop: CropRect, chroma: CropRect, out: &mut RgbaImage) {
        let _s = common::span_debug!("nv21_to_rgba");

        let width = crop.width() as usize;
        let pixel_count = width * crop.height() as usize;
        let (luma, vu) = self.staging.split_at(pixel_count);

        let chroma_width = chroma.width() as usize;
        let chroma_height = chroma.height() as usize;
        let range = self.capabilities.range;

        let convert_row = |(y, row): (usize, &mut [u8])| {
            let chroma_y = ((crop.top as usize + y) / 2 - chroma.top as usize).min(chroma_height - 1);
            let luma_row = &luma[y * width..(y + 1) * width];
            let vu_row = &vu[chroma_y * chroma_width * 2..(chroma_y + 1) * chroma_width * 2];

            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let chroma_x =
                    ((crop.left as usize + x) / 2 - chroma.left as usize).min(chroma_width - 1);
                let v = vu_row[chroma_x * 2];
                let u = vu_row[chroma_x * 2 + 1];
                px[..3].copy_from_slice(&yuv_to_rgb(luma_row[x], u, v, range));
                px[3] = 255;
            }
        };

        let buf: &mut [u8] = &mut **out;
        if self.capabilities.parallel {
            buf.par_chunks_exact_mut(width * 4)
                .enumerate()
                .for_each(convert_row);
        } else {
            buf.chunks_exact_mut(width * 4)
                .enumerate()
                .for_each(convert_row);
        }
    }
}

/// Validate that every cropped row of `plane` lies inside its buffer and
/// that rows do not overlap.
fn row_geometry(
    plane: &Plane,
    index: usize,
    crop: CropRect,
    sample_bytes: usize,
) -> Result<RowGeometry, PreprocessError> {
    if plane.pixel_stride < sample_bytes {
        return Err(PreprocessError::Format(format!(
            "plane {index}: pixel stride {} is smaller than a {sample_bytes}-byte sample",
            plane.pixel_stride
        )));
    }

    let width = crop.width() as usize;
    let height = crop.height() as usize;
    let geometry = RowGeometry {
        lead: crop.left as usize * plane.pixel_stride,
        len: (width - 1) * plane.pixel_stride + sample_bytes,
    };

    if plane.row_stride < geometry.lead + geometry.len {
        return Err(PreprocessError::Format(format!(
            "plane {index}: row stride {} is smaller than the {} bytes a cropped row needs",
            plane.row_stride,
            geometry.lead + geometry.len
        )));
    }

    let required = (crop.top as usize + height - 1) * plane.row_stride + geometry.lead + geometry.len;
    if plane.data.len() < required {
        return Err(PreprocessError::Format(format!(
            "plane {index}: buffer holds {} bytes but the crop needs {}",
            plane.data.len(),
            required
        )));
    }

    Ok(geometry)
}

fn stage_plane(
    plane: &Plane,
    index: usize,
    crop: CropRect,
    target: StagingTarget,
    staging: &mut [u8],
) -> Result<(), PreprocessError> {
    let geometry = row_geometry(plane, index, crop, 1)?;
    let width = crop.width() as usize;
    let bulk = plane.pixel_stride == 1 && target.stride == 1;

    let mut out = target.offset;
    for row in 0..crop.height() as usize {
        let start = (row + crop.top as usize) * plane.row_stride + geometry.lead;
        let src = &plane.data[start..start + geometry.len];

        if bulk {
            staging[out..out + width].copy_from_slice(src);
            out += width;
        } else {
            for col in 0..width {
                staging[out] = src[col * plane.pixel_stride];
                out += target.stride;
            }
        }
    }

    Ok(())
}

fn copy_rgba(plane: &Plane, crop: CropRect, out: &mut RgbaImage) -> Result<(), PreprocessError> {
    let geometry = row_geometry(plane, 0, crop, 4)?;
    let width = crop.width() as usize;
    let pixel_stride = plane.pixel_stride;

    let buf: &mut [u8] = &mut **out;
    for (row, dst) in buf.chunks_exact_mut(width * 4).enumerate() {
        let start = (row + crop.top as usize) * plane.row_stride + geometry.lead;
        let src = &plane.data[start..start + geometry.len];

        if pixel_stride == 4 {
            dst.copy_from_slice(src);
        } else {
            for (x, px) in dst.chunks_exact_mut(4).enumerate() {
                px.copy_from_slice(&src[x * pixel_stride..x * pixel_stride + 4]);
            }
        }
    }

    Ok(())
}

/// BT.601 YUV to RGB with 8-bit fixed-point coefficients.
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8, range: ColorRange) -> [u8; 3] {
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let (r, g, b) = match range {
        // R = 1.164(Y-16) + 1.596V', G = 1.164(Y-16) - 0.391U' - 0.813V', B = 1.164(Y-16) + 2.018U'
        ColorRange::Limited => {
            let c = 298 * (y as i32 - 16);
            (
                (c + 409 * e + 128) >> 8,
                (c - 100 * d - 208 * e + 128) >> 8,
                (c + 516 * d + 128) >> 8,
            )
        }
        // R = Y + 1.402V', G = Y - 0.344U' - 0.714V', B = Y + 1.772U'
        ColorRange::Full => {
            let y = y as i32;
            (
                y + ((359 * e) >> 8),
                y - ((88 * d + 183 * e) >> 8),
                y + ((454 * d) >> 8),
            )
        }
    };

    [
        r.clamp(0, 255) as u8,
        g.clamp(0, 255) as u8,
        b.clamp(0, 255) as u8,
    ]
}
