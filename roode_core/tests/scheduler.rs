use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use roode_core::mocks::{Published, RecordingTransmitter, ScriptedFinder, ScriptedMotion};
use roode_core::{
    CalibrationCfg, Crossing, Direction, GateState, PowerCfg, PowerPolicy, PowerScheduler,
    PowerState, RoodeError, SensorCfg, StepOutcome, StopReason, SwitchState, TickOutcome,
    build_scheduler, run,
};
use roode_hardware::{SceneFrame, SimScene, SimulatedMotion, SimulatedRangeFinder};
use roode_traits::clock::test_clock::TestClock;
use roode_traits::{Channel, Role};
use rstest::rstest;

const AMBIENT: u16 = 1200;

type SimScheduler = PowerScheduler<SimulatedRangeFinder, SimulatedMotion, RecordingTransmitter>;

fn f(room: Option<u16>, corridor: Option<u16>, motion: bool) -> SceneFrame {
    SceneFrame {
        room_mm: room,
        corridor_mm: corridor,
        motion,
    }
}

fn power(policy: PowerPolicy) -> PowerCfg {
    PowerCfg {
        policy,
        settle_ms: 40,
        sample_rate_hz: 50,
        ..PowerCfg::default()
    }
}

fn sim(frames: Vec<SceneFrame>, power: PowerCfg) -> (SimScheduler, RecordingTransmitter, TestClock) {
    let scene = SimScene::with_frames(AMBIENT, frames);
    let tx = RecordingTransmitter::new();
    let clock = TestClock::new();
    let sched = build_scheduler(
        SimulatedRangeFinder::new(scene.clone(), Role::Room, 0x30),
        SimulatedRangeFinder::new(scene.clone(), Role::Corridor, 0x31),
        SimulatedMotion::new(scene),
        tx.clone(),
        SensorCfg::default(),
        SensorCfg::default(),
        CalibrationCfg::default(),
        power,
        Some(Arc::new(clock.clone())),
    )
    .unwrap();
    (sched, tx, clock)
}

type ScriptedScheduler = PowerScheduler<ScriptedFinder, ScriptedMotion, RecordingTransmitter>;

fn scripted_with(
    room: ScriptedFinder,
    corridor: ScriptedFinder,
    motion: Vec<bool>,
    power: PowerCfg,
    clock: TestClock,
) -> ScriptedScheduler {
    build_scheduler(
        room,
        corridor,
        ScriptedMotion::new(motion),
        RecordingTransmitter::new(),
        SensorCfg::default(),
        SensorCfg::default(),
        CalibrationCfg {
            enabled: false,
            ..CalibrationCfg::default()
        },
        power,
        Some(Arc::new(clock)),
    )
    .unwrap()
}

fn scripted(motion: Vec<bool>, power: PowerCfg) -> ScriptedScheduler {
    scripted_with(
        ScriptedFinder::new([]).with_fallback(AMBIENT),
        ScriptedFinder::new([]).with_fallback(AMBIENT),
        motion,
        power,
        TestClock::new(),
    )
}

#[rstest]
fn startup_calibrates_and_publishes_zero_state() {
    let (mut sched, tx, _clock) = sim(vec![], power(PowerPolicy::MotionGated));
    sched.startup().unwrap();
    assert_eq!(sched.thresholds(), (1080, 1080));
    assert_eq!(
        tx.published(),
        vec![
            Published::Presentation,
            Published::Labeled(Channel::RoomSwitch, 0, "Off".into()),
            Published::Value(Channel::PeopleCounter, 0),
        ]
    );
    assert_eq!(sched.power_state(), PowerState::Idle);
}

#[rstest]
fn motion_wakes_counts_and_settles() {
    let frames = vec![
        f(Some(AMBIENT), Some(500), true),
        f(Some(500), Some(500), true),
        f(Some(500), Some(AMBIENT), true),
        f(Some(AMBIENT), Some(AMBIENT), false),
    ];
    let (mut sched, tx, _clock) = sim(frames, power(PowerPolicy::MotionGated));
    sched.startup().unwrap();
    tx.clear();

    let outcomes: Vec<_> = (0..6).map(|_| sched.tick().unwrap()).collect();
    assert_eq!(
        outcomes,
        vec![
            TickOutcome::Woke(StepOutcome::Moved(GateState::CorridorOnly)),
            TickOutcome::Stepped(StepOutcome::Moved(GateState::Both)),
            TickOutcome::Stepped(StepOutcome::Crossed(Crossing {
                direction: Direction::Entering,
                count: 1,
                switch: Some(SwitchState::On),
            })),
            TickOutcome::Stepped(StepOutcome::Moved(GateState::Empty)),
            TickOutcome::Settled(StepOutcome::Unchanged),
            TickOutcome::Idle,
        ]
    );
    assert_eq!(sched.count(), 1);
    assert_eq!(sched.power_state(), PowerState::Idle);
    assert!(!sched.room().finder().is_continuous());
    assert_eq!(tx.values(Channel::PeopleCounter), vec![1]);
    assert_eq!(tx.values(Channel::RoomSwitch), vec![1]);
}

#[rstest]
fn mode_changes_are_issued_once_per_transition() {
    let mut sched = scripted(
        vec![true, true, true, false, false],
        PowerCfg {
            settle_ms: 0,
            ..power(PowerPolicy::MotionGated)
        },
    );
    sched.startup().unwrap();
    for _ in 0..5 {
        sched.tick().unwrap();
    }
    assert_eq!(sched.power_state(), PowerState::Idle);
    assert_eq!(sched.room().finder().mode_commands(), 2);
    assert_eq!(sched.corridor().finder().mode_commands(), 2);
}

#[rstest]
fn always_on_ignores_motion() {
    let mut sched = scripted(vec![], power(PowerPolicy::AlwaysOn));
    sched.startup().unwrap();
    assert!(matches!(sched.tick().unwrap(), TickOutcome::Woke(_)));
    for _ in 0..10 {
        assert!(matches!(sched.tick().unwrap(), TickOutcome::Stepped(_)));
    }
    assert_eq!(sched.power_state(), PowerState::Awake);
}

#[rstest]
fn sleep_policy_blocks_on_motion_interrupt() {
    let mut sched = scripted(vec![false, false, true], power(PowerPolicy::MotionSleep));
    sched.startup().unwrap();
    assert_eq!(sched.tick().unwrap(), TickOutcome::Idle);
    assert_eq!(sched.tick().unwrap(), TickOutcome::Idle);
    assert!(matches!(sched.tick().unwrap(), TickOutcome::Woke(_)));
    assert_eq!(sched.motion().waits(), 3);
    // Awake ticks poll the level instead of waiting.
    sched.tick().unwrap();
    assert_eq!(sched.motion().waits(), 3);
}

#[rstest]
fn timeout_is_recovered_by_recalibration() {
    let frames = vec![
        f(None, Some(AMBIENT), true),
        f(None, Some(AMBIENT), true),
        f(None, Some(AMBIENT), true),
        f(None, Some(AMBIENT), true),
        f(Some(AMBIENT), Some(AMBIENT), true),
    ];
    let (mut sched, tx, _clock) = sim(frames, power(PowerPolicy::MotionGated));
    sched.startup().unwrap();
    tx.clear();

    assert!(matches!(sched.tick().unwrap(), TickOutcome::Woke(StepOutcome::Unchanged)));
    assert_eq!(sched.tick().unwrap(), TickOutcome::Stepped(StepOutcome::Unchanged));
    assert_eq!(sched.tick().unwrap(), TickOutcome::Stepped(StepOutcome::Suspended));
    assert!(sched.room().timeout_occurred());

    assert_eq!(sched.tick().unwrap(), TickOutcome::Suspended { timed_out: 1 });
    assert_eq!(sched.tick().unwrap(), TickOutcome::Stepped(StepOutcome::Unchanged));
    assert!(!sched.room().timeout_occurred());
    assert_eq!(
        tx.published(),
        vec![
            Published::Labeled(Channel::ThresholdReport, 1, "1080,1080".into()),
            Published::Labeled(Channel::ThresholdReport, 0, "1080,1080".into()),
        ]
    );
}

#[rstest]
fn settles_while_a_sensor_stays_timed_out() {
    let mut sched = scripted_with(
        ScriptedFinder::new([]),
        ScriptedFinder::new([]).with_fallback(AMBIENT),
        vec![true],
        PowerCfg {
            settle_ms: 200,
            ..power(PowerPolicy::MotionGated)
        },
        TestClock::new(),
    );
    sched.startup().unwrap();

    let outcomes: Vec<_> = (0..200).map(|_| sched.tick().unwrap()).collect();
    assert!(outcomes.contains(&TickOutcome::Suspended { timed_out: 1 }));
    assert_eq!(outcomes.last(), Some(&TickOutcome::Idle));
    assert_eq!(sched.power_state(), PowerState::Idle);
    assert!(!sched.room().finder().is_continuous());
    assert!(!sched.corridor().finder().is_continuous());
    // The flag survives the settle and is handled on the next wake.
    assert!(sched.room().timeout_occurred());
}

#[rstest]
fn failed_recoveries_back_off() {
    let clock = TestClock::new();
    let mut sched = scripted_with(
        ScriptedFinder::new([]),
        ScriptedFinder::new([]).with_fallback(AMBIENT),
        vec![],
        power(PowerPolicy::AlwaysOn),
        clock.clone(),
    );
    sched.startup().unwrap();
    for _ in 0..3 {
        sched.tick().unwrap();
    }
    assert!(sched.room().timeout_occurred());

    let mut pauses = Vec::new();
    for _ in 0..12 {
        let before = clock.elapsed();
        assert_eq!(sched.tick().unwrap(), TickOutcome::Suspended { timed_out: 1 });
        pauses.push((clock.elapsed() - before).as_millis());
    }
    assert_eq!(
        pauses,
        vec![100, 200, 300, 400, 500, 600, 700, 800, 900, 1000, 1000, 1000]
    );
    // Three gate reads, then one 20-sample calibration per suspended tick.
    assert_eq!(sched.room().finder().reads(), 3 + 12 * 20);
}

#[rstest]
fn wake_recalibrates_a_timeout_carried_over_from_idle() {
    let mut sched = scripted_with(
        ScriptedFinder::new([None, None, None]).with_fallback(AMBIENT),
        ScriptedFinder::new([]).with_fallback(AMBIENT),
        vec![true, true, false, false, true],
        PowerCfg {
            settle_ms: 0,
            ..power(PowerPolicy::MotionGated)
        },
        TestClock::new(),
    );
    sched.startup().unwrap();

    sched.tick().unwrap();
    sched.tick().unwrap();
    assert_eq!(sched.tick().unwrap(), TickOutcome::Settled(StepOutcome::Suspended));
    assert!(sched.room().timeout_occurred());
    assert_eq!(sched.tick().unwrap(), TickOutcome::Idle);
    assert!(sched.room().timeout_occurred());

    let reads = sched.room().finder().reads();
    sched.transmitter().clear();
    assert_eq!(sched.tick().unwrap(), TickOutcome::Woke(StepOutcome::Unchanged));
    // Calibration samples come before the gate's own read.
    assert_eq!(sched.room().finder().reads(), reads + 20 + 1);
    assert!(!sched.room().timeout_occurred());
    assert_eq!(sched.thresholds(), (1080, 800));
    assert_eq!(
        sched.transmitter().published(),
        vec![Published::Labeled(Channel::ThresholdReport, 0, "1080,800".into())]
    );
}

#[rstest]
fn rejected_wake_stays_idle_and_retries() {
    let mut sched = scripted_with(
        ScriptedFinder::new([])
            .with_fallback(AMBIENT)
            .nacking_mode_commands([1]),
        ScriptedFinder::new([]).with_fallback(AMBIENT),
        vec![true, true, true],
        PowerCfg {
            settle_ms: 1_000,
            ..power(PowerPolicy::MotionGated)
        },
        TestClock::new(),
    );
    sched.startup().unwrap();

    let shutdown = AtomicBool::new(false);
    let summary = run(&mut sched, &shutdown, Some(3)).unwrap();
    assert_eq!(summary.ticks, 3);
    assert_eq!(summary.wakeups, 1);
    assert_eq!(summary.power_state, PowerState::Awake);
    assert_eq!(sched.room().finder().mode_commands(), 1);
    assert_eq!(sched.corridor().finder().mode_commands(), 1);
}

#[rstest]
fn rejected_idle_stays_awake_until_accepted() {
    let mut sched = scripted_with(
        ScriptedFinder::new([])
            .with_fallback(AMBIENT)
            .nacking_mode_commands([2]),
        ScriptedFinder::new([]).with_fallback(AMBIENT),
        vec![true],
        PowerCfg {
            settle_ms: 0,
            ..power(PowerPolicy::MotionGated)
        },
        TestClock::new(),
    );
    sched.startup().unwrap();

    assert_eq!(sched.tick().unwrap(), TickOutcome::Woke(StepOutcome::Unchanged));
    assert_eq!(sched.tick().unwrap(), TickOutcome::Stepped(StepOutcome::Unchanged));
    assert_eq!(sched.power_state(), PowerState::Awake);
    assert!(sched.room().finder().is_continuous());

    assert_eq!(sched.tick().unwrap(), TickOutcome::Settled(StepOutcome::Unchanged));
    assert_eq!(sched.power_state(), PowerState::Idle);
    assert_eq!(sched.room().finder().mode_commands(), 2);
    assert_eq!(sched.corridor().finder().mode_commands(), 2);
}

#[rstest]
fn init_failure_never_wakes() {
    let mut sched = build_scheduler(
        ScriptedFinder::new([]).failing_init(),
        ScriptedFinder::new([]).with_fallback(AMBIENT),
        ScriptedMotion::new([true, true, true]),
        RecordingTransmitter::new(),
        SensorCfg::default(),
        SensorCfg::default(),
        CalibrationCfg::default(),
        power(PowerPolicy::MotionGated),
        Some(Arc::new(TestClock::new())),
    )
    .unwrap();

    let err = sched.startup().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RoodeError>(),
        Some(RoodeError::SensorInit { role: Role::Room, .. })
    ));
    for _ in 0..3 {
        assert_eq!(sched.tick().unwrap(), TickOutcome::Faulted);
    }
    assert_eq!(sched.power_state(), PowerState::Idle);
    assert!(sched.fault().is_some());

    let shutdown = AtomicBool::new(false);
    let err = run(&mut sched, &shutdown, Some(10)).unwrap_err();
    assert!(err.downcast_ref::<RoodeError>().is_some());
}

#[rstest]
fn runner_honours_tick_budget_and_shutdown() {
    let frames = vec![
        f(Some(AMBIENT), Some(500), true),
        f(Some(500), Some(500), true),
        f(Some(500), Some(AMBIENT), true),
        f(Some(AMBIENT), Some(AMBIENT), false),
    ];
    let (mut sched, _tx, _clock) = sim(frames, power(PowerPolicy::MotionGated));
    sched.startup().unwrap();

    let shutdown = AtomicBool::new(false);
    let summary = run(&mut sched, &shutdown, Some(8)).unwrap();
    assert_eq!(summary.ticks, 8);
    assert_eq!(summary.crossings, 1);
    assert_eq!(summary.wakeups, 1);
    assert_eq!(summary.count, 1);
    assert_eq!(summary.stopped, StopReason::TickBudget);

    let shutdown = AtomicBool::new(true);
    let summary = run(&mut sched, &shutdown, None).unwrap();
    assert_eq!(summary.ticks, 0);
    assert_eq!(summary.stopped, StopReason::Shutdown);
}
