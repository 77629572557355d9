use preprocess::{Frame, Plane};
use std::sync::{Arc, Mutex, PoisonError};

struct PoolInner {
    free: Mutex<Vec<Vec<Vec<u8>>>>,
    capacity: usize,
}

impl PoolInner {
    fn give_back(&self, buffers: Vec<Vec<u8>>) {
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.capacity {
            free.push(buffers);
        }
    }
}

/// Fixed set of plane-buffer sets shared between the capture loop and the
/// frames it hands out.
///
/// A frame keeps its buffers until it is dropped, at which point they return
/// here. A consumer that holds on to frames drains the pool and capture
/// starts skipping.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

impl FramePool {
    /// Pre-allocate `capacity` sets, each with one zeroed buffer per entry in
    /// `plane_lens`.
    pub fn new(capacity: usize, plane_lens: &[usize]) -> Self {
        let free = (0..capacity)
            .map(|_| plane_lens.iter().map(|&len| vec![0u8; len]).collect())
            .collect();

        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(free),
                capacity,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn available(&self) -> usize {
        self.inner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Sets currently owned by leases or live frames.
    pub fn outstanding(&self) -> usize {
        self.capacity() - self.available()
    }

    /// Take a buffer set, or `None` when every set is in use.
    pub fn acquire(&self) -> Option<PoolLease> {
        let buffers = self
            .inner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()?;

        Some(PoolLease {
            buffers: Some(buffers),
            pool: Arc::clone(&self.inner),
        })
    }
}

/// A borrowed buffer set. Goes back to the pool when dropped unless it was
/// turned into a [`Frame`].
pub struct PoolLease {
    buffers: Option<Vec<Vec<u8>>>,
    pool: Arc<PoolInner>,
}

impl PoolLease {
    pub fn buffers_mut(&mut self) -> &mut [Vec<u8>] {
        self.buffers.as_deref_mut().unwrap_or_default()
    }

    /// Wrap the buffers in a frame. `strides` gives `(row_stride,
    /// pixel_stride)` for each buffer in order. The frame's release hook
    /// returns the buffers to the pool.
    pub fn into_frame(mut self, width: u32, height: u32, strides: &[(usize, usize)]) -> Frame {
        let buffers = self.buffers.take().unwrap_or_default();
        let planes = buffers
            .into_iter()
            .zip(strides)
            .map(|(data, &(row_stride, pixel_stride))| Plane::new(data, row_stride, pixel_stride))
            .collect();

        let pool = Arc::clone(&self.pool);
        Frame::new(width, height, planes).on_release(move |planes: Vec<Plane>| {
            pool.give_back(planes.into_iter().map(|p| p.data).collect());
        })
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        if let Some(buffers) = self.buffers.take() {
            self.pool.give_back(buffers);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_until_exhausted() {
        let pool = FramePool::new(2, &[16]);
        let a = pool.acquire();
        let b = pool.acquire();

        assert!(a.is_some() && b.is_some());
        assert!(pool.acquire().is_none(), "Pool of two must run dry");
        assert_eq!(pool.outstanding(), 2);
    }

    #[test]
    fn test_dropped_lease_returns_buffers() {
        let pool = FramePool::new(1, &[4, 2]);
        {
            let mut lease = pool.acquire().unwrap();
            assert_eq!(lease.buffers_mut().len(), 2);
        }
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_frame_release_returns_buffers() {
        let pool = FramePool::new(1, &[8, 2, 2]);
        let frame = pool
            .acquire()
            .unwrap()
            .into_frame(4, 2, &[(4, 1), (2, 1), (2, 1)]);

        assert_eq!(frame.planes().len(), 3);
        assert_eq!(frame.planes()[1].row_stride, 2);
        assert_eq!(pool.available(), 0);

        drop(frame);
        assert_eq!(pool.available(), 1);

        let mut lease = pool.acquire().unwrap();
        assert_eq!(lease.buffers_mut()[0].len(), 8, "Buffers are recycled intact");
    }
}
