use crate::error::PreprocessError;
use image::RgbaImage;

/// Allocate a zero-filled buffer, reporting allocation failure instead of
/// aborting the process.
pub fn try_alloc<T: Clone + Default>(len: usize) -> Result<Vec<T>, PreprocessError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    buf.resize(len, T::default());
    Ok(buf)
}

/// Resize `buf` to exactly `len` elements. Memory is only requested when the
/// length actually changes; contents are left for the caller to overwrite.
pub fn ensure_len<T: Clone + Default>(buf: &mut Vec<T>, len: usize) -> Result<(), PreprocessError> {
    if buf.len() == len {
        return Ok(());
    }
    if len > buf.len() {
        buf.try_reserve_exact(len - buf.len())?;
    }
    buf.resize(len, T::default());
    Ok(())
}

/// Allocate a transparent black RGBA surface.
pub fn alloc_surface(width: u32, height: u32) -> Result<RgbaImage, PreprocessError> {
    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| {
            PreprocessError::Resource(format!("surface {width}x{height} overflows usize"))
        })?;
    let raw = try_alloc::<u8>(len)?;
    RgbaImage::from_raw(width, height, raw).ok_or_else(|| {
        PreprocessError::Resource(format!("surface {width}x{height} has inconsistent size"))
    })
}
