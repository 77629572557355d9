use crate::error::PreprocessError;
use crate::scratch::try_alloc;

/// Pack one pixel as `0xAARRGGBB`.
#[inline]
pub fn argb(r: u8, g: u8, b: u8, a: u8) -> u32 {
    ((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Split a packed pixel into `[r, g, b, a]`.
#[inline]
pub fn unpack(pixel: u32) -> [u8; 4] {
    [
        (pixel >> 16) as u8,
        (pixel >> 8) as u8,
        pixel as u8,
        (pixel >> 24) as u8,
    ]
}

/// Fixed-size, row-major array of packed ARGB pixels handed to the detector.
///
/// Allocated once; its length is always `width * height` and never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedPixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl PackedPixelBuffer {
    pub fn new(width: u32, height: u32) -> Result<Self, PreprocessError> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| PreprocessError::Resource(format!("{width}x{height} pixel buffer overflows usize")))?;
        Ok(Self {
            width,
            height,
            pixels: try_alloc(len)?,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y as usize * self.width as usize + x as usize).copied()
    }

    /// Overwrite every pixel from an interleaved RGBA byte slice of exactly
    /// `len() * 4` bytes.
    pub fn pack_rgba(&mut self, rgba: &[u8]) -> Result<(), PreprocessError> {
        if rgba.len() != self.pixels.len() * 4 {
            return Err(PreprocessError::Resource(format!(
                "expected {} RGBA bytes for a {}x{} buffer, got {}",
                self.pixels.len() * 4,
                self.width,
                self.height,
                rgba.len()
            )));
        }

        for (dst, px) in self.pixels.iter_mut().zip(rgba.chunks_exact(4)) {
            *dst = argb(px[0], px[1], px[2], px[3]);
        }
        Ok(())
    }

    /// Write the pixels as tightly packed RGB bytes (HWC), reusing `out`.
    pub fn write_rgb(&self, out: &mut Vec<u8>) {
        out.clear();
        out.reserve(self.pixels.len() * 3);
        for &pixel in &self.pixels {
            let [r, g, b, _] = unpack(pixel);
            out.extend_from_slice(&[r, g, b]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argb_layout() {
        assert_eq!(argb(0x11, 0x22, 0x33, 0xFF), 0xFF11_2233);
        assert_eq!(unpack(0x8011_2233), [0x11, 0x22, 0x33, 0x80]);
    }

    #[test]
    fn test_capacity_matches_dimensions() {
        let buf = PackedPixelBuffer::new(300, 200).unwrap();
        assert_eq!(buf.len(), 60_000);
        assert!(buf.as_slice().iter().all(|&p| p == 0));
    }

    #[test]
    fn test_pack_rgba_rejects_wrong_length() {
        let mut buf = PackedPixelBuffer::new(2, 2).unwrap();
        let result = buf.pack_rgba(&[0u8; 12]);
        assert!(matches!(result, Err(PreprocessError::Resource(_))));
        assert_eq!(buf.len(), 4, "Capacity must not change on failure");
    }

    #[test]
    fn test_pack_and_read_back_rgb() {
        let mut buf = PackedPixelBuffer::new(2, 1).unwrap();
        buf.pack_rgba(&[255, 0, 0, 255, 1, 2, 3, 0]).unwrap();

        assert_eq!(buf.pixel(0, 0), Some(0xFFFF_0000));
        assert_eq!(buf.pixel(1, 0), Some(0x0001_0203));
        assert_eq!(buf.pixel(2, 0), None);

        let mut rgb = vec![9; 64];
        buf.write_rgb(&mut rgb);
        assert_eq!(rgb, vec![255, 0, 0, 1, 2, 3]);
    }
}
