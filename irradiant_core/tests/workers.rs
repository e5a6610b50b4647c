//! Worker thread lifecycle and lock arbitration.
mod common;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use irradiant_core::{
    Axis, ConstantOutputHandle, JogAxes, JogCfg, JogInput, JogSample, JogWorker, MovementLock,
    OutputCfg, PositionMonitor, PrintError, try_move_by, try_move_to,
};
use irradiant_hardware::{SimulatedDaq, SimulatedStage};
use irradiant_traits::test_clock::TestClock;
use irradiant_traits::{Channel, MonotonicClock, Stage};

use common::*;

fn instant_axis() -> (Arc<SimulatedStage>, Axis) {
    let stage = Arc::new(SimulatedStage::new("Z").with_time_constant(Duration::ZERO));
    let axis = Axis::new(stage.clone(), limits(), settle_cfg());
    (stage, axis)
}

struct Scripted(VecDeque<JogSample>);

impl JogInput for Scripted {
    fn poll(&mut self) -> Option<JogSample> {
        self.0.pop_front()
    }
}

fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!("condition not reached");
}

#[test]
fn manual_move_reports_busy_instead_of_blocking() {
    let (stage, axis) = instant_axis();
    let lock = MovementLock::new();
    let held = lock.try_acquire().unwrap();
    let err = try_move_to(&lock, &axis, 1_000.0, false).unwrap_err();
    assert!(matches!(err.downcast_ref::<PrintError>(), Some(PrintError::Busy)));
    assert_eq!(stage.desired_position(), 0.0);
    drop(held);

    try_move_to(&lock, &axis, 1_000.0, false).unwrap();
    try_move_by(&lock, &axis, -250.0, true).unwrap();
    assert_eq!(stage.desired_position(), 750.0);
    assert!(!lock.is_held());
}

#[test]
fn jog_moves_when_free_and_skips_when_busy() {
    let (stage, axis) = instant_axis();
    let lock = MovementLock::new();
    let push = JogSample {
        z: 1.0,
        ..JogSample::default()
    };
    let cfg = JogCfg {
        poll: Duration::from_millis(1),
        ..JogCfg::default()
    };

    let held = lock.try_acquire().unwrap();
    let busy = JogWorker::spawn(
        Scripted(VecDeque::from(vec![push; 3])),
        JogAxes {
            z: Some(axis.clone()),
            ..JogAxes::default()
        },
        lock.clone(),
        cfg,
        MonotonicClock::new(),
    );
    wait_for(|| busy.skipped_ticks() == 3);
    assert_eq!(busy.moved_ticks(), 0);
    drop(busy);
    drop(held);
    assert_eq!(stage.desired_position(), 0.0);

    let free = JogWorker::spawn(
        Scripted(VecDeque::from(vec![push; 2])),
        JogAxes {
            z: Some(axis),
            ..JogAxes::default()
        },
        lock.clone(),
        cfg,
        MonotonicClock::new(),
    );
    wait_for(|| free.moved_ticks() == 2);
    drop(free);
    assert_eq!(stage.desired_position(), 100_000.0);
}

#[test]
fn position_monitor_caches_latest_reading() {
    let stage = Arc::new(
        SimulatedStage::new("Z")
            .with_time_constant(Duration::ZERO)
            .at(1_234.0),
    );
    let monitor = PositionMonitor::spawn(stage.clone(), Duration::from_millis(1), MonotonicClock::new());
    wait_for(|| monitor.latest() == Some(1_234.0));
    stage.command_move(-50.0).unwrap();
    wait_for(|| monitor.latest() == Some(-50.0));
    assert!(monitor.stalled_for_now() < 1_000);
    drop(monitor);
}

#[test]
fn constant_output_holds_then_zeroes() {
    let clock = TestClock::new();
    let daq = SimulatedDaq::with_clock(Arc::new(clock.clone()));
    let log = daq.log();
    let handle = ConstantOutputHandle::spawn(
        Arc::new(Mutex::new(daq)),
        Arc::new(MonotonicClock::new()),
        OutputCfg::default(),
        Channel::Aom,
        2.0,
    )
    .unwrap();
    wait_for(|| log.snapshot().levels[Channel::Aom.index()] == 2.0);
    handle.join().unwrap();
    let snap = log.snapshot();
    assert_eq!(snap.levels[Channel::Aom.index()], 0.0);
    assert_eq!(
        snap.static_writes,
        vec![(Channel::Aom, 2.0), (Channel::Aom, 0.0)]
    );
}

#[test]
fn constant_output_rejects_voltage_beyond_amplitude() {
    let daq = SimulatedDaq::new();
    let log = daq.log();
    let err = ConstantOutputHandle::spawn(
        Arc::new(Mutex::new(daq)),
        Arc::new(MonotonicClock::new()),
        OutputCfg::default(),
        Channel::XGalvo,
        5.0,
    )
    .err()
    .expect("should reject");
    assert!(matches!(
        err.downcast_ref::<PrintError>(),
        Some(PrintError::Validation(_))
    ));
    assert!(log.snapshot().static_writes.is_empty());
}
