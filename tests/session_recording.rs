// tests/session_recording.rs

//! Session recording through the whole stack: control surface starts a
//! session, the engine streams into it while rendering, and stop keeps the
//! mix plus the voice files that captured signal.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use reels::bufsvc::NullBufferService;
use reels::control::ControlSurface;
use reels::engine::command::command_channel;
use reels::engine::LoopEngine;

const SR: f32 = 8_000.0;
const BLOCK: usize = 256;

fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("reels-it-{}-{}", tag, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn run_blocks(engine: &mut LoopEngine, level: f32, blocks: usize) {
    let input = vec![level; BLOCK];
    let mut left = vec![0.0f32; BLOCK];
    let mut right = vec![0.0f32; BLOCK];
    for _ in 0..blocks {
        engine.process_block(&input, &mut left, &mut right);
    }
}

#[test]
fn session_keeps_audible_streams_and_drops_silent_voices() {
    let dir = temp_dir("session");
    let (tx, rx) = command_channel(1024);
    let mut engine = LoopEngine::new(SR, rx);
    let shared = engine.shared_states();
    let tx = Rc::new(RefCell::new(tx));
    let mut control = ControlSurface::new(
        tx.clone(),
        shared,
        SR as u32,
        dir.clone(),
        Box::new(NullBufferService),
    );

    // voice 0 records and plays back audible material; a short loop so the
    // playhead wraps into recorded tape well within the session
    control.set_param(0, reels::params::ParamId::Level, 0.0);
    control.set_param(0, reels::params::ParamId::Duration, 0.25);
    control.toggle_record(0);
    run_blocks(&mut engine, 0.4, 8);

    control.start_session().unwrap();
    run_blocks(&mut engine, 0.4, 32);

    let kept = control.stop_session().unwrap();
    assert!(
        kept.iter().any(|p| p.to_string_lossy().contains("loop_all")),
        "mix file missing from {:?}",
        kept
    );
    assert!(
        kept.iter().any(|p| p.to_string_lossy().contains("loop_0")),
        "voice 0 file missing from {:?}",
        kept
    );
    // the seven silent voices leave nothing behind
    assert_eq!(kept.len(), 2, "unexpected files kept: {:?}", kept);

    // mix capture is gap-free for every block the session saw
    let mix = kept
        .iter()
        .find(|p| p.to_string_lossy().contains("loop_all"))
        .unwrap();
    let reader = hound::WavReader::open(mix).unwrap();
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.duration(), 32 * BLOCK as u32);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn silent_session_keeps_only_the_mix() {
    let dir = temp_dir("silent");
    let (tx, rx) = command_channel(1024);
    let mut engine = LoopEngine::new(SR, rx);
    let shared = engine.shared_states();
    let tx = Rc::new(RefCell::new(tx));
    let mut control = ControlSurface::new(
        tx.clone(),
        shared,
        SR as u32,
        dir.clone(),
        Box::new(NullBufferService),
    );

    control.start_session().unwrap();
    run_blocks(&mut engine, 0.0, 16);
    let kept = control.stop_session().unwrap();
    assert_eq!(kept.len(), 1, "only the mix should survive: {:?}", kept);
    assert!(kept[0].to_string_lossy().contains("loop_all"));

    let _ = fs::remove_dir_all(&dir);
}
