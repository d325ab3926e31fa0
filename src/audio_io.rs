// src/audio_io.rs

//! cpal stream plumbing. The input callback mono-sums hardware frames into a
//! ring buffer; the output callback drains it, runs the loop engine for one
//! block and interleaves the stereo result.

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, FromSample, Sample, SampleFormat, Stream, StreamConfig};
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::engine::LoopEngine;
use crate::MAX_BLOCK_FRAMES;

/// Input ring headroom, in engine blocks.
const INPUT_RING_BLOCKS: usize = 8;

#[derive(Default)]
pub struct AudioIoConfig {
    pub input_device_name: Option<String>,
    pub output_device_name: Option<String>,
    pub sample_rate: Option<u32>,
    pub buffer_size: Option<u32>,
}

/// Open both streams, wire the engine into the output callback and start
/// them. Returns the streams (keep them alive) and the active sample rate.
pub fn init_and_run_streams(
    config: &AudioIoConfig,
    engine: LoopEngine,
    xrun_count: Arc<AtomicUsize>,
) -> Result<(Stream, Stream, u32)> {
    let host = cpal::default_host();
    let input_device = if let Some(name) = &config.input_device_name {
        host.input_devices()?
            .find(|d| d.name().ok().as_ref() == Some(name))
            .ok_or_else(|| anyhow!("input device not found: {}", name))?
    } else {
        host.default_input_device()
            .ok_or_else(|| anyhow!("no default input device"))?
    };
    let output_device = if let Some(name) = &config.output_device_name {
        host.output_devices()?
            .find(|d| d.name().ok().as_ref() == Some(name))
            .ok_or_else(|| anyhow!("output device not found: {}", name))?
    } else {
        host.default_output_device()
            .ok_or_else(|| anyhow!("no default output device"))?
    };
    log::info!("input device: {}", input_device.name()?);
    log::info!("output device: {}", output_device.name()?);

    let default_input_config = input_device.default_input_config()?;
    let default_output_config = output_device.default_output_config()?;
    let sample_format = default_output_config.sample_format();

    let mut input_config: StreamConfig = default_input_config.into();
    let mut output_config: StreamConfig = default_output_config.into();
    if let Some(sr) = config.sample_rate {
        input_config.sample_rate = cpal::SampleRate(sr);
        output_config.sample_rate = cpal::SampleRate(sr);
    }
    if let Some(bs) = config.buffer_size {
        input_config.buffer_size = BufferSize::Fixed(bs);
        output_config.buffer_size = BufferSize::Fixed(bs);
    }

    let ring = HeapRb::<f32>::new(MAX_BLOCK_FRAMES * INPUT_RING_BLOCKS);
    let (producer, consumer) = ring.split();

    let (input_stream, output_stream) = match sample_format {
        SampleFormat::F32 => run::<f32>(
            &input_device,
            &input_config,
            &output_device,
            &output_config,
            producer,
            consumer,
            engine,
            xrun_count,
        )?,
        SampleFormat::I16 => run::<i16>(
            &input_device,
            &input_config,
            &output_device,
            &output_config,
            producer,
            consumer,
            engine,
            xrun_count,
        )?,
        SampleFormat::U16 => run::<u16>(
            &input_device,
            &input_config,
            &output_device,
            &output_config,
            producer,
            consumer,
            engine,
            xrun_count,
        )?,
        format => return Err(anyhow!("unsupported sample format {}", format)),
    };

    let active_sr = output_config.sample_rate.0;
    log::info!("streams running at {} Hz", active_sr);
    Ok((input_stream, output_stream, active_sr))
}

#[allow(clippy::too_many_arguments)]
fn run<T>(
    input_device: &Device,
    input_config: &StreamConfig,
    output_device: &Device,
    output_config: &StreamConfig,
    producer: HeapProducer<f32>,
    consumer: HeapConsumer<f32>,
    engine: LoopEngine,
    xrun_count: Arc<AtomicUsize>,
) -> Result<(Stream, Stream)>
where
    T: Sample + cpal::SizedSample + FromSample<f32>,
    f32: FromSample<T>,
{
    let input_stream =
        build_input_stream::<T>(input_device, input_config, producer, xrun_count.clone())?;
    let output_stream =
        build_output_stream::<T>(output_device, output_config, consumer, engine, xrun_count)?;
    input_stream.play()?;
    output_stream.play()?;
    Ok((input_stream, output_stream))
}

fn build_input_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut producer: HeapProducer<f32>,
    xrun_count: Arc<AtomicUsize>,
) -> Result<Stream>
where
    T: Sample + cpal::SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let err_fn = move |err| {
        log::error!("input stream error: {}", err);
        xrun_count.fetch_add(1, Ordering::Relaxed);
    };

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            for frame in data.chunks(channels) {
                let mono =
                    frame.iter().map(|s| f32::from_sample(*s)).sum::<f32>() / channels as f32;
                // ring full: drop the sample, the output side fell behind
                let _ = producer.push(mono);
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

fn build_output_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: HeapConsumer<f32>,
    mut engine: LoopEngine,
    xrun_count: Arc<AtomicUsize>,
) -> Result<Stream>
where
    T: Sample + cpal::SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let err_fn = move |err| {
        log::error!("output stream error: {}", err);
        xrun_count.fetch_add(1, Ordering::Relaxed);
    };

    let mut input_block = vec![0.0f32; MAX_BLOCK_FRAMES];
    let mut left = vec![0.0f32; MAX_BLOCK_FRAMES];
    let mut right = vec![0.0f32; MAX_BLOCK_FRAMES];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let mut offset = 0;
            let total_frames = data.len() / channels;
            while offset < total_frames {
                let frames = (total_frames - offset).min(MAX_BLOCK_FRAMES);

                let read = consumer.pop_slice(&mut input_block[..frames]);
                input_block[read..frames].fill(0.0);

                engine.process_block(
                    &input_block[..frames],
                    &mut left[..frames],
                    &mut right[..frames],
                );

                for i in 0..frames {
                    let frame = &mut data[(offset + i) * channels..(offset + i + 1) * channels];
                    if channels >= 2 {
                        frame[0] = T::from_sample(left[i]);
                        frame[1] = T::from_sample(right[i]);
                        for sample in frame.iter_mut().skip(2) {
                            *sample = T::from_sample(0.0f32);
                        }
                    } else {
                        frame[0] = T::from_sample(0.5 * (left[i] + right[i]));
                    }
                }
                offset += frames;
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}
