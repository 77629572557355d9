use crate::config::{CaptureConfig, FrameFormat};
use crate::pool::{FramePool, PoolLease};
use anyhow::{Context, Result};
use preprocess::Frame;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Outcome of one capture attempt.
#[derive(Debug)]
pub enum Captured {
    Frame(Frame),
    /// Every pool buffer is still held downstream; the frame was dropped at
    /// the source.
    Skipped,
    EndOfStream,
}

/// Replays raw frames stored back to back in a file, the way a sensor would
/// deliver them: pooled plane buffers, strides, rotation metadata.
pub struct RawFrameSource {
    path: PathBuf,
    reader: BufReader<File>,
    format: FrameFormat,
    width: u32,
    height: u32,
    rotation_degrees: i32,
    loop_playback: bool,
    pool: FramePool,
    sequence: u64,
    skipped: u64,
}

impl RawFrameSource {
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        config.validate()?;

        let file = File::open(&config.frame_file)
            .with_context(|| format!("Failed to open frame file {}", config.frame_file.display()))?;

        let pool = FramePool::new(
            config.pool_size,
            &plane_lens(config.format, config.width, config.height),
        );

        tracing::info!(
            path = %config.frame_file.display(),
            width = config.width,
            height = config.height,
            format = ?config.format,
            rotation = config.rotation_degrees,
            pool_size = config.pool_size,
            "Frame source opened"
        );

        Ok(Self {
            path: config.frame_file.clone(),
            reader: BufReader::new(file),
            format: config.format,
            width: config.width,
            height: config.height,
            rotation_degrees: config.rotation_degrees,
            loop_playback: config.loop_playback,
            pool,
            sequence: 0,
            skipped: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    /// Frames dropped because the pool was empty.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn next_frame(&mut self) -> Result<Captured> {
        let frame_len = self.format.frame_len(self.width, self.height);

        let Some(mut lease) = self.pool.acquire() else {
            // Advance past the frame as the sensor would.
            self.skipped += 1;
            self.sequence += 1;
            self.reader
                .seek_relative(frame_len as i64)
                .context("Failed to skip frame")?;
            tracing::debug!(
                sequence = self.sequence,
                outstanding = self.pool.outstanding(),
                "Frame pool exhausted, skipping capture"
            );
            return Ok(Captured::Skipped);
        };

        if !self.read_frame(&mut lease)? {
            if !self.loop_playback {
                return Ok(Captured::EndOfStream);
            }
            self.reader
                .seek(SeekFrom::Start(0))
                .context("Failed to rewind frame file")?;
            if !self.read_frame(&mut lease)? {
                tracing::warn!(path = %self.path.display(), "Frame file holds no complete frame");
                return Ok(Captured::EndOfStream);
            }
        }

        self.sequence += 1;
        let frame = lease
            .into_frame(self.width, self.height, &strides(self.format, self.width))
            .with_rotation(self.rotation_degrees)
            .with_sequence(self.sequence);

        Ok(Captured::Frame(frame))
    }

    /// Fill the lease with the next frame. `false` at end of file.
    fn read_frame(&mut self, lease: &mut PoolLease) -> Result<bool> {
        let buffers = lease.buffers_mut();

        let read = match self.format {
            FrameFormat::I420 | FrameFormat::Rgba => buffers
                .iter_mut()
                .try_for_each(|buf| self.reader.read_exact(buf)),
            FrameFormat::Nv21 => read_nv21(&mut self.reader, buffers),
        };

        match read {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to read frame from {}", self.path.display())),
        }
    }
}

/// Read an NV21 frame into `[y, u, v]`. V receives the interleaved VU
/// bytes; U is the same bytes shifted by one.
fn read_nv21(reader: &mut impl Read, buffers: &mut [Vec<u8>]) -> io::Result<()> {
    let [luma, u, v] = buffers else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "NV21 needs three plane buffers"));
    };
    reader.read_exact(luma)?;
    reader.read_exact(v)?;
    u.copy_from_slice(&v[1..]);
    Ok(())
}

fn plane_lens(format: FrameFormat, width: u32, height: u32) -> Vec<usize> {
    let pixels = width as usize * height as usize;
    match format {
        FrameFormat::I420 => vec![pixels, pixels / 4, pixels / 4],
        FrameFormat::Nv21 => vec![pixels, pixels / 2 - 1, pixels / 2],
        FrameFormat::Rgba => vec![pixels * 4],
    }
}

fn strides(format: FrameFormat, width: u32) -> Vec<(usize, usize)> {
    let w = width as usize;
    match format {
        FrameFormat::I420 => vec![(w, 1), (w / 2, 1), (w / 2, 1)],
        FrameFormat::Nv21 => vec![(w, 1), (w, 2), (w, 2)],
        FrameFormat::Rgba => vec![(w * 4, 4)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_lens_cover_one_frame() {
        for format in [FrameFormat::I420, FrameFormat::Rgba] {
            let total: usize = plane_lens(format, 8, 4).iter().sum();
            assert_eq!(total, format.frame_len(8, 4));
        }
        // The U view of NV21 overlaps V, so it is one byte short of a copy.
        let nv21 = plane_lens(FrameFormat::Nv21, 8, 4);
        assert_eq!(nv21[0] + nv21[2], FrameFormat::Nv21.frame_len(8, 4));
    }

    #[test]
    fn test_nv21_strides_interleave_chroma() {
        assert_eq!(strides(FrameFormat::Nv21, 640)[1], (640, 2));
        assert_eq!(strides(FrameFormat::I420, 640)[2], (320, 1));
    }
}
