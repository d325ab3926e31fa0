// src/recorder.rs

//! Session recording: the stereo mix plus each voice's stereo contribution,
//! streamed to disk while the engine keeps running.
//!
//! The audio thread pushes interleaved frames into per-stream ring buffers;
//! a writer thread drains them into WAV files. Voices that stayed silent for
//! the whole session have their files deleted on stop; the mix file is
//! always kept.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};

/// Ring capacity in seconds per stream. Generous: the writer drains every
/// 100 ms.
const RING_SECONDS: usize = 10;
const WRITER_SLEEP: Duration = Duration::from_millis(100);
const DRAIN_CHUNK: usize = 4096;

/// Peak magnitude below which a whole stream counts as silent.
const SILENCE_THRESHOLD: f32 = 0.0001;

/// Audio-thread end of one recorded stream.
pub struct StreamCapture {
    producer: HeapProducer<f32>,
    has_audio: Arc<AtomicBool>,
}

impl StreamCapture {
    /// Push one block of stereo frames. Frames are pushed atomically: when
    /// the ring is nearly full the rest of the block is dropped rather than
    /// splitting a frame.
    pub fn capture(&mut self, left: &[f32], right: &[f32], frames: usize) {
        for i in 0..frames {
            if self.producer.free_len() < 2 {
                return;
            }
            let (l, r) = (left[i], right[i]);
            if l.abs() > SILENCE_THRESHOLD || r.abs() > SILENCE_THRESHOLD {
                self.has_audio.store(true, Ordering::Relaxed);
            }
            let _ = self.producer.push(l);
            let _ = self.producer.push(r);
        }
    }
}

/// Everything the engine needs to feed a running session, moved to the audio
/// thread in one command payload.
pub struct SessionCapture {
    pub mix: StreamCapture,
    pub voices: Vec<StreamCapture>,
}

struct StreamWriter {
    consumer: HeapConsumer<f32>,
    writer: Option<WavWriter<std::io::BufWriter<fs::File>>>,
    path: PathBuf,
}

impl StreamWriter {
    fn drain(&mut self, scratch: &mut [f32]) {
        loop {
            let n = self.consumer.pop_slice(scratch);
            if n == 0 {
                return;
            }
            let Some(writer) = self.writer.as_mut() else {
                continue; // already failed, keep the ring from backing up
            };
            for &sample in &scratch[..n] {
                let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                if let Err(err) = writer.write_sample(value) {
                    log::error!("session write failed for {}: {}", self.path.display(), err);
                    self.writer = None;
                    break;
                }
            }
        }
    }

    fn finish(mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(err) = writer.finalize() {
                log::error!(
                    "failed to finalize {}: {}",
                    self.path.display(),
                    err
                );
            }
        }
    }
}

/// Control-side handle for a session. Created stopped; `start` hands back the
/// capture endpoints to forward to the engine.
pub struct SessionRecorder {
    handle: Option<JoinHandle<()>>,
    stop_flag: Arc<AtomicBool>,
    /// Written files with their silence flag; `None` marks the mix file,
    /// which is kept unconditionally.
    files: Vec<(PathBuf, Option<Arc<AtomicBool>>)>,
}

impl SessionRecorder {
    pub fn new() -> Self {
        Self {
            handle: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
            files: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Open the session files, spawn the writer thread and return the audio
    /// side of the streams. One file for the mix, one per voice. A stream
    /// whose file cannot be opened is logged and skipped; the remaining
    /// streams still record.
    pub fn start(
        &mut self,
        num_voices: usize,
        sample_rate: u32,
        base_dir: &Path,
    ) -> Result<SessionCapture> {
        if self.is_active() {
            return Err(anyhow!("a session is already recording"));
        }
        fs::create_dir_all(base_dir)
            .with_context(|| format!("creating session directory {}", base_dir.display()))?;

        let stamp = chrono::Local::now().format("%Y%m%d-%H%M");
        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let ring_frames = RING_SECONDS * sample_rate as usize * 2;

        self.stop_flag = Arc::new(AtomicBool::new(false));
        self.files.clear();
        let mut writers = Vec::with_capacity(num_voices + 1);
        let mut captures = Vec::with_capacity(num_voices + 1);

        for stream in 0..=num_voices {
            let name = if stream == 0 {
                format!("session_{}_loop_all.wav", stamp)
            } else {
                format!("session_{}_loop_{}.wav", stamp, stream - 1)
            };
            let path = base_dir.join(name);
            let writer = match WavWriter::create(&path, spec) {
                Ok(writer) => Some(writer),
                Err(err) => {
                    log::error!("could not create {}, skipping stream: {}", path.display(), err);
                    None
                }
            };

            let (producer, consumer) = HeapRb::<f32>::new(ring_frames).split();
            let has_audio = Arc::new(AtomicBool::new(false));
            if writer.is_some() {
                let flag = if stream == 0 {
                    None
                } else {
                    Some(has_audio.clone())
                };
                self.files.push((path.clone(), flag));
            }
            writers.push(StreamWriter {
                consumer,
                writer,
                path,
            });
            captures.push(StreamCapture {
                producer,
                has_audio,
            });
        }

        let stop_flag = self.stop_flag.clone();
        let handle = std::thread::Builder::new()
            .name("session-writer".into())
            .spawn(move || {
                let mut scratch = vec![0.0f32; DRAIN_CHUNK];
                loop {
                    let stopping = stop_flag.load(Ordering::Relaxed);
                    for stream in writers.iter_mut() {
                        stream.drain(&mut scratch);
                    }
                    if stopping {
                        break;
                    }
                    std::thread::sleep(WRITER_SLEEP);
                }
                // final drain after the producers are gone
                for stream in writers.iter_mut() {
                    stream.drain(&mut scratch);
                }
                for stream in writers {
                    stream.finish();
                }
            })
            .context("spawning session writer thread")?;
        self.handle = Some(handle);

        let mut voices = captures.split_off(1);
        let mix = captures
            .pop()
            .ok_or_else(|| anyhow!("no mix stream was created"))?;
        voices.shrink_to_fit();
        Ok(SessionCapture { mix, voices })
    }

    /// Stop the writer, finalize the files and delete voice files that never
    /// saw signal. The mix file always survives. The engine must have
    /// dropped its [`SessionCapture`] first so the final drain sees the
    /// complete streams.
    pub fn stop(&mut self) -> Result<Vec<PathBuf>> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| anyhow!("no session is recording"))?;
        self.stop_flag.store(true, Ordering::Relaxed);
        handle
            .join()
            .map_err(|_| anyhow!("session writer thread panicked"))?;

        let mut kept = Vec::new();
        for (path, has_audio) in self.files.drain(..) {
            let keep = has_audio
                .map(|flag| flag.load(Ordering::Relaxed))
                .unwrap_or(true);
            if keep {
                kept.push(path);
            } else if let Err(err) = fs::remove_file(&path) {
                log::warn!("could not remove silent file {}: {}", path.display(), err);
            } else {
                log::info!("removed silent session file {}", path.display());
            }
        }
        Ok(kept)
    }
}

impl Default for SessionRecorder {
    fn default() -> Self {
        Self::new()
    }
}
