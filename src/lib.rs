//! `reels` — an eight-voice tape-loop engine.
//!
//! Each voice is an emulated tape loop that can play back and record into a
//! large shared sample buffer while a control context (UI, automation) drives
//! it over a lock-free command channel. The real-time path lives in
//! [`engine`]; everything the control thread owns lives in [`control`] and
//! [`params`].

pub mod audio_io;
pub mod bufsvc;
pub mod control;
pub mod engine;
pub mod params;
pub mod recorder;
pub mod settings;
pub mod snapshot;
pub mod tape;
pub mod util;
pub mod vu;

/// Number of tape-loop voices. Fixed at startup.
pub const NUM_VOICES: usize = 8;

/// Number of shared sample buffers. Voices 0-3 live in buffer 0, 4-7 in
/// buffer 1.
pub const NUM_BUFFERS: usize = 2;

/// Length of each shared sample buffer in seconds. Each voice owns a quarter
/// of its buffer as a loop region.
pub const BUFFER_SECONDS: f32 = 240.0;

/// Largest block the engine will ever be asked to render in one call.
pub const MAX_BLOCK_FRAMES: usize = 2048;

/// Which shared buffer a voice records into by default.
pub fn default_buffer_index(voice: usize) -> usize {
    if voice < NUM_VOICES / 2 {
        0
    } else {
        1
    }
}

/// Offset in seconds of a voice's loop region inside its buffer.
pub fn loop_region_offset(voice: usize) -> f32 {
    let region = BUFFER_SECONDS / (NUM_VOICES / NUM_BUFFERS) as f32;
    region * (voice % (NUM_VOICES / NUM_BUFFERS)) as f32
}

/// Span in seconds of one voice's loop region.
pub fn loop_region_span() -> f32 {
    BUFFER_SECONDS / (NUM_VOICES / NUM_BUFFERS) as f32
}
