// tests/loop_capture.rs

//! End-to-end primed-capture flow: arm a voice, trip the input trigger,
//! stop recording and check the loop window resolves to the captured
//! length, snapped to the beat grid.

use std::cell::RefCell;
use std::rc::Rc;

use reels::engine::command::command_channel;
use reels::engine::LoopEngine;
use reels::params::{ParamBank, ParamId};

const SR: f32 = 1_000.0;
const BLOCK: usize = 100;

fn run_blocks(engine: &mut LoopEngine, level: f32, blocks: usize) {
    let input = vec![level; BLOCK];
    let mut left = vec![0.0f32; BLOCK];
    let mut right = vec![0.0f32; BLOCK];
    for _ in 0..blocks {
        engine.process_block(&input, &mut left, &mut right);
    }
}

#[test]
fn primed_capture_resolves_to_a_quantized_loop() {
    let (tx, rx) = command_channel(1024);
    let mut engine = LoopEngine::new(SR, rx);
    let shared = engine.shared_states();
    let tx = Rc::new(RefCell::new(tx));
    let mut bank = ParamBank::new(tx.clone());

    bank.set_value(0, ParamId::Quantize, 120.0, true);
    bank.set_value(0, ParamId::Start, 0.0, false);

    tx.borrow_mut()
        .push(reels::engine::command::EngineCommand::TogglePrime { voice: 0 });
    run_blocks(&mut engine, 0.0, 1);
    assert!(shared[0].is_primed());
    assert!(!shared[0].is_playing());

    // trigger, then keep recording: 14 blocks of input = 1.4 s captured
    run_blocks(&mut engine, 0.5, 1);
    assert!(shared[0].is_recording());
    run_blocks(&mut engine, 0.5, 13);

    tx.borrow_mut()
        .push(reels::engine::command::EngineCommand::ToggleRecord { voice: 0 });
    run_blocks(&mut engine, 0.0, 1);
    assert!(!shared[0].is_recording());
    assert!(shared[0].is_playing(), "recording stop keeps playback running");

    // the control tick resolves the captured length into the duration param
    bank.update(&shared);
    let duration = bank.value(0, ParamId::Duration);
    // 1.4 s at 120 bpm rounds to 3 beats
    assert!(
        (duration - 1.5).abs() < 1e-4,
        "expected 1.5 s, got {}",
        duration
    );

    // the engine's loop window follows: the playhead must stay inside it
    run_blocks(&mut engine, 0.0, 40); // 4 s of playback
    let position = shared[0].position.load();
    assert!(
        position < 1.6,
        "playhead escaped the resolved window: {}",
        position
    );
}

#[test]
fn unquantized_capture_keeps_the_raw_length() {
    let (tx, rx) = command_channel(1024);
    let mut engine = LoopEngine::new(SR, rx);
    let shared = engine.shared_states();
    let tx = Rc::new(RefCell::new(tx));
    let mut bank = ParamBank::new(tx.clone());
    bank.set_value(0, ParamId::Start, 0.0, false);

    tx.borrow_mut()
        .push(reels::engine::command::EngineCommand::TogglePrime { voice: 0 });
    run_blocks(&mut engine, 0.0, 1);
    run_blocks(&mut engine, 0.5, 7); // trigger + 0.7 s recorded
    tx.borrow_mut()
        .push(reels::engine::command::EngineCommand::ToggleRecord { voice: 0 });
    run_blocks(&mut engine, 0.0, 1);

    bank.update(&shared);
    let duration = bank.value(0, ParamId::Duration);
    assert!(
        (duration - 0.7).abs() < 0.02,
        "expected about 0.7 s, got {}",
        duration
    );
}
