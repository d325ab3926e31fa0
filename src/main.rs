// src/main.rs

//! Headless front end: starts the audio streams and drives the control
//! surface from a small line-based console.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::Result;

use reels::audio_io::{init_and_run_streams, AudioIoConfig};
use reels::bufsvc::NullBufferService;
use reels::control::ControlSurface;
use reels::engine::command::command_channel;
use reels::engine::LoopEngine;
use reels::params::{ParamId, CONTROL_TICK_HZ};
use reels::{settings, NUM_VOICES};

const COMMAND_CAPACITY: usize = 1024;

fn main() -> Result<()> {
    env_logger::init();
    let app_settings = settings::load_settings();

    let sample_rate = app_settings.sample_rate.unwrap_or(48_000);
    let (tx, rx) = command_channel(COMMAND_CAPACITY);
    let engine = LoopEngine::new(sample_rate as f32, rx);
    let shared = engine.shared_states();

    let xrun_count = Arc::new(AtomicUsize::new(0));
    let io_config = AudioIoConfig {
        input_device_name: app_settings.input_device.clone(),
        output_device_name: app_settings.output_device.clone(),
        sample_rate: Some(sample_rate),
        buffer_size: app_settings.buffer_size,
    };
    let (_input_stream, _output_stream, active_sr) =
        init_and_run_streams(&io_config, engine, xrun_count.clone())?;

    let session_dir = app_settings
        .session_dir
        .clone()
        .or_else(|| settings::get_config_dir().map(|d| d.join("Sessions")))
        .unwrap_or_else(|| PathBuf::from("."));

    let mut control = ControlSurface::new(
        Rc::new(RefCell::new(tx)),
        shared,
        active_sr,
        session_dir,
        Box::new(NullBufferService),
    );
    control.sync_engine();
    if let Some(snapshot) = &app_settings.last_snapshot {
        if let Err(err) = control.load_snapshot(snapshot) {
            log::warn!("could not load {}: {}", snapshot.display(), err);
        }
    }

    // stdin runs on its own thread so the control loop can keep ticking
    let (line_tx, line_rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if line_tx.send(line.trim().to_string()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    println!("reels: {} voices at {} Hz. type 'help' for commands.", NUM_VOICES, active_sr);
    let tick = Duration::from_secs_f32(1.0 / CONTROL_TICK_HZ);
    loop {
        match line_rx.recv_timeout(tick) {
            Ok(line) => {
                if !handle_line(&mut control, &line) {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
        control.update();
    }

    if control.session_active() {
        match control.stop_session() {
            Ok(kept) => {
                for path in kept {
                    println!("kept {}", path.display());
                }
            }
            Err(err) => log::error!("stopping session failed: {}", err),
        }
    }
    settings::save_settings(&app_settings);
    let xruns = xrun_count.load(Ordering::Relaxed);
    if xruns > 0 {
        log::warn!("{} stream error(s) during this run", xruns);
    }
    Ok(())
}

/// Returns false when the user asked to quit.
fn handle_line(control: &mut ControlSurface, line: &str) -> bool {
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else {
        return true;
    };
    let args: Vec<&str> = words.collect();

    match cmd {
        "quit" | "exit" => return false,
        "help" => print_help(),
        "play" | "rec" | "once" | "prime" => match parse_voice(args.first()) {
            Some(voice) => match cmd {
                "play" => control.toggle_play(voice),
                "rec" => control.toggle_record(voice),
                "once" => control.toggle_record_once(voice),
                _ => control.toggle_prime(voice),
            },
            None => println!("usage: {} <voice 1-{}>", cmd, NUM_VOICES),
        },
        "set" | "nudge" => {
            let parsed = (
                parse_voice(args.first()),
                args.get(1).and_then(|n| parse_param(n)),
                args.get(2).and_then(|v| v.parse::<f32>().ok()),
            );
            match parsed {
                (Some(voice), Some(id), Some(value)) => {
                    if cmd == "set" {
                        control.set_param(voice, id, value);
                    } else {
                        control.nudge(voice, id, value);
                    }
                }
                _ => println!("usage: {} <voice> <param> <value>", cmd),
            }
        }
        "lfo" => {
            match (parse_voice(args.first()), args.get(1).and_then(|n| parse_param(n))) {
                (Some(voice), Some(id)) => control.toggle_lfo(voice, id),
                _ => println!("usage: lfo <voice> <param>"),
            }
        }
        "lforange" => {
            let parsed = (
                parse_voice(args.first()),
                args.get(1).and_then(|n| parse_param(n)),
                args.get(2).and_then(|v| v.parse::<f32>().ok()),
            );
            match parsed {
                (Some(voice), Some(id), Some(steps)) => {
                    control.nudge_lfo_range(voice, id, steps)
                }
                _ => println!("usage: lforange <voice> <param> <steps>"),
            }
        }
        "session" => {
            let result = if control.session_active() {
                control.stop_session().map(|kept| {
                    for path in kept {
                        println!("kept {}", path.display());
                    }
                })
            } else {
                control.start_session()
            };
            if let Err(err) = result {
                println!("session: {}", err);
            }
        }
        "save" | "load" => match args.first() {
            Some(path) => {
                let result = if cmd == "save" {
                    control.save_snapshot(Path::new(path))
                } else {
                    control.load_snapshot(Path::new(path))
                };
                if let Err(err) = result {
                    println!("{}: {}", cmd, err);
                }
            }
            None => println!("usage: {} <path>", cmd),
        },
        "clearloop" => match parse_voice(args.first()) {
            Some(voice) => {
                if let Err(err) = control.clear_loop(voice) {
                    println!("clearloop: {}", err);
                }
            }
            None => println!("usage: clearloop <voice>"),
        },
        "vu" => {
            for voice in 0..NUM_VOICES {
                let state = if control.is_recording(voice) {
                    "rec"
                } else if control.is_primed(voice) {
                    "prm"
                } else if control.is_playing(voice) {
                    "play"
                } else {
                    "stop"
                };
                println!(
                    "loop {}: {:>4}  {:6.1} dB  @ {:.2}s",
                    voice + 1,
                    state,
                    control.vu(voice),
                    control.position(voice)
                );
            }
        }
        other => println!("unknown command '{}', try 'help'", other),
    }
    true
}

fn parse_voice(arg: Option<&&str>) -> Option<usize> {
    let n: usize = arg?.parse().ok()?;
    if (1..=NUM_VOICES).contains(&n) {
        Some(n - 1)
    } else {
        None
    }
}

fn parse_param(name: &str) -> Option<ParamId> {
    use ParamId::*;
    let id = match name {
        "level" => Level,
        "pan" => Pan,
        "lpf" => Lpf,
        "pregain" => Pregain,
        "bias" => Bias,
        "reverb" => ReverbSend,
        "decay" => ReverbDecay,
        "density" => ReverbDensity,
        "rate" => Rate,
        "direction" => Direction,
        "start" => Start,
        "duration" => Duration,
        "reclevel" => RecLevel,
        "prelevel" => PreLevel,
        "recslew" => RecSlew,
        "levelslew" => LevelSlew,
        "rateslew" => RateSlew,
        "panslew" => PanSlew,
        "fade" => FadeTime,
        "quantize" => Quantize,
        "primetol" => PrimeSensitivity,
        _ => {
            if let Some(n) = name.strip_prefix("fb") {
                let src: usize = n.parse().ok()?;
                if (1..=NUM_VOICES).contains(&src) {
                    return Some(Feedback(src - 1));
                }
            }
            return None;
        }
    };
    Some(id)
}

fn print_help() {
    println!("transport:  play|rec|once|prime <voice>");
    println!("params:     set|nudge <voice> <param> <value>");
    println!("            lfo <voice> <param>   lforange <voice> <param> <steps>");
    println!("            params: level pan lpf pregain bias reverb decay density rate");
    println!("                    direction start duration reclevel prelevel recslew");
    println!("                    levelslew rateslew panslew fade quantize primetol fb1-fb8");
    println!("session:    session (toggle recording to disk)");
    println!("snapshots:  save <path>   load <path>");
    println!("buffers:    clearloop <voice>");
    println!("meters:     vu");
    println!("            quit");
}
