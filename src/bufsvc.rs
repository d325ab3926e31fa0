// src/bufsvc.rs

//! Fire-and-forget disk I/O for the shared sample buffers. The control
//! context requests reads, writes and clears in seconds; a backend carries
//! them out off the control thread and the engine is never involved.

use std::path::Path;

use anyhow::Result;

/// Identifies one of the shared sample buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferHandle(pub usize);

/// Asynchronous contract for loading, saving and clearing buffer regions.
/// Requests are queued and return immediately; completion is best-effort and
/// not observable beyond the backend's own logging.
pub trait BufferService {
    /// Read a mono sound file into one buffer starting at `dst_sec`, reading
    /// from `src_sec` in the file for up to `dur_sec` seconds.
    fn request_read_mono(
        &mut self,
        path: &Path,
        buffer: BufferHandle,
        src_sec: f32,
        dst_sec: f32,
        dur_sec: f32,
    ) -> Result<()>;

    /// Read a stereo sound file into two buffers at once.
    fn request_read_stereo(
        &mut self,
        path: &Path,
        left: BufferHandle,
        right: BufferHandle,
        src_sec: f32,
        dst_sec: f32,
        dur_sec: f32,
    ) -> Result<()>;

    /// Write a region of one buffer to a mono sound file.
    fn request_write_mono(
        &mut self,
        path: &Path,
        buffer: BufferHandle,
        src_sec: f32,
        dur_sec: f32,
    ) -> Result<()>;

    /// Write matching regions of two buffers to a stereo sound file.
    fn request_write_stereo(
        &mut self,
        path: &Path,
        left: BufferHandle,
        right: BufferHandle,
        src_sec: f32,
        dur_sec: f32,
    ) -> Result<()>;

    /// Zero a region of one buffer.
    fn request_clear(&mut self, buffer: BufferHandle, start_sec: f32, dur_sec: f32) -> Result<()>;
}

/// Backend that accepts every request and does nothing, for headless use and
/// tests.
pub struct NullBufferService;

impl BufferService for NullBufferService {
    fn request_read_mono(
        &mut self,
        path: &Path,
        buffer: BufferHandle,
        src_sec: f32,
        dst_sec: f32,
        dur_sec: f32,
    ) -> Result<()> {
        log::debug!(
            "read mono {} -> buffer {} ({}s @ {}s, {}s)",
            path.display(),
            buffer.0,
            src_sec,
            dst_sec,
            dur_sec
        );
        Ok(())
    }

    fn request_read_stereo(
        &mut self,
        path: &Path,
        left: BufferHandle,
        right: BufferHandle,
        src_sec: f32,
        dst_sec: f32,
        dur_sec: f32,
    ) -> Result<()> {
        log::debug!(
            "read stereo {} -> buffers {}/{} ({}s @ {}s, {}s)",
            path.display(),
            left.0,
            right.0,
            src_sec,
            dst_sec,
            dur_sec
        );
        Ok(())
    }

    fn request_write_mono(
        &mut self,
        path: &Path,
        buffer: BufferHandle,
        src_sec: f32,
        dur_sec: f32,
    ) -> Result<()> {
        log::debug!(
            "write mono buffer {} -> {} ({}s, {}s)",
            buffer.0,
            path.display(),
            src_sec,
            dur_sec
        );
        Ok(())
    }

    fn request_write_stereo(
        &mut self,
        path: &Path,
        left: BufferHandle,
        right: BufferHandle,
        src_sec: f32,
        dur_sec: f32,
    ) -> Result<()> {
        log::debug!(
            "write stereo buffers {}/{} -> {} ({}s, {}s)",
            left.0,
            right.0,
            path.display(),
            src_sec,
            dur_sec
        );
        Ok(())
    }

    fn request_clear(&mut self, buffer: BufferHandle, start_sec: f32, dur_sec: f32) -> Result<()> {
        log::debug!("clear buffer {} ({}s, {}s)", buffer.0, start_sec, dur_sec);
        Ok(())
    }
}
