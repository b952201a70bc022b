//! Offload protocol tests
//!
//! Drive the host and core sides of the barrier, either by hand on one
//! thread (deterministic protocol checks) or through the simulated SoC.

use occamy_runtime::prelude::*;
use occamy_runtime::{Arrival, EpochState, MappedRegion, PowerState, SimRegisterFile};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const C0: ClusterId = ClusterId(0);

fn config() -> RuntimeConfig {
    RuntimeConfig::default()
        .with_launch_timeout(Duration::from_secs(5))
        .with_barrier_timeout(Duration::from_secs(5))
        .with_poll_interval(Duration::from_micros(50))
}

/// Host handle over a bare register file; cores are driven by the test.
fn manual_soc(config: RuntimeConfig) -> Soc {
    let regs = Arc::new(SimRegisterFile::for_topology(&SocTopology::OCCAMY));
    Soc::new(regs, SocTopology::OCCAMY, config).unwrap()
}

fn contexts(soc: &Soc, cluster: ClusterId) -> Vec<CoreContext> {
    soc.topology()
        .core_indices()
        .map(|core| soc.core_context(cluster, core).unwrap())
        .collect()
}

#[test]
fn wake_twice_stays_running() {
    let soc = manual_soc(config());
    soc.wake(C0).unwrap();
    soc.wake(C0).unwrap();
    assert_eq!(soc.power_state(C0).unwrap(), PowerState::Running);
}

#[test]
fn launch_without_wake_is_configuration_error() {
    let sim = SimulatedSoc::new(SocTopology::OCCAMY, config()).unwrap();
    let err = sim
        .soc()
        .launch_and_wait(ClusterId(1), LaunchParams::new(0, 0))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(matches!(err, RuntimeError::ClusterNotRunning { .. }));
}

#[test]
fn narrow_ports_must_be_released() {
    let soc = manual_soc(config());
    soc.wake_with_mask(C0, IsolationMask::from_bits_truncate(0b0100)).unwrap();
    let err = soc.launch(C0, LaunchParams::new(0, 0)).unwrap_err();
    assert!(matches!(err, RuntimeError::SignalPathIsolated { .. }));
}

#[test]
fn invalid_cluster_is_configuration_error() {
    let soc = manual_soc(config());
    for err in [
        soc.wake(ClusterId(42)).unwrap_err(),
        soc.launch(ClusterId(6), LaunchParams::new(0, 0)).unwrap_err(),
    ] {
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}

#[test]
fn second_return_is_protocol_error() {
    let soc = manual_soc(config().with_return_policy(ReturnPolicy::Halt));
    soc.wake(C0).unwrap();
    let launch = soc.launch(C0, LaunchParams::new(0, 0)).unwrap();
    let cores = contexts(&soc, C0);

    assert_eq!(cores[0].return_to_host(SyncScope::All).unwrap(), Arrival::Waiting);
    let err = cores[0].return_to_host(SyncScope::All).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);

    let mut last = 0;
    for ctx in &cores[1..] {
        if ctx.return_to_host(SyncScope::All).unwrap() == Arrival::Last {
            last += 1;
        }
    }
    assert_eq!(last, 1);

    let done = soc.wait(launch).unwrap();
    assert_eq!(done.status.arrived, 9);
    assert_eq!(done.status.signals, 1);
}

#[test]
fn post_wake_twice_is_protocol_error() {
    let soc = manual_soc(config());
    soc.wake(C0).unwrap();
    let _launch = soc.launch(C0, LaunchParams::new(0, 0)).unwrap();
    let ctx = soc.core_context(C0, CoreIndex(2)).unwrap();
    ctx.on_post_wake().unwrap();
    assert_eq!(ctx.on_post_wake().unwrap_err().kind(), ErrorKind::Protocol);
}

#[test]
fn scope_mismatch_is_protocol_error() {
    let soc = manual_soc(config().with_return_policy(ReturnPolicy::Halt));
    soc.wake(C0).unwrap();
    let _launch = soc.launch(C0, LaunchParams::new(0, 0)).unwrap();
    let cores = contexts(&soc, C0);
    cores[0].return_to_host(SyncScope::ComputeOnly).unwrap();
    let err = cores[1].return_to_host(SyncScope::All).unwrap_err();
    assert!(matches!(err, RuntimeError::ScopeMismatch { .. }));
}

#[test]
fn roles_are_stable_and_agree() {
    let soc = manual_soc(config());
    let first: Vec<bool> = contexts(&soc, C0).iter().map(CoreContext::is_compute_core).collect();
    for cluster in soc.topology().cluster_ids() {
        for _ in 0..5 {
            let again: Vec<bool> =
                contexts(&soc, cluster).iter().map(CoreContext::is_compute_core).collect();
            assert_eq!(again, first);
        }
    }
    assert_eq!(first.iter().filter(|c| **c).count(), 8);
    assert!(!first[8]);
}

#[test]
fn cycle_stamps_stay_in_their_domain() {
    let soc = manual_soc(config());
    let host = soc.read_cycles();
    let ctx = soc.core_context(C0, CoreIndex(0)).unwrap();
    let cluster = ctx.read_cycles().unwrap();
    assert_eq!(cluster.cycles_since(&host).unwrap_err().kind(), ErrorKind::Protocol);

    let mut prev = soc.read_cycles();
    for _ in 0..1000 {
        let now = soc.read_cycles();
        assert!(now.value >= prev.value);
        prev = now;
    }
}

/// Every compute core writes its slot after a delay that grows with its
/// rank; the slowest core finishes long after the others.
#[test]
fn slow_core_never_exposes_partial_buffer() {
    let sim = SimulatedSoc::new(SocTopology::OCCAMY, config()).unwrap();
    sim.load(
        C0,
        Arc::new(|ctx: &CoreContext| -> occamy_runtime::Result<()> {
            ctx.on_post_wake()?;
            if let Some(rank) = ctx.compute_rank() {
                let params = ctx.params()?;
                let delay = if rank == 7 { 40 } else { rank as u64 };
                std::thread::sleep(Duration::from_millis(delay));
                params.output()?.set(rank, params.scalar(0)? + rank as f64)?;
            }
            ctx.return_to_host(SyncScope::All)?;
            Ok(())
        }),
    )
    .unwrap();
    sim.soc().wake(C0).unwrap();

    for round in 1u32..=3 {
        let out = SharedBuffer::zeroed(8);
        let params = LaunchParams::new(0, 8)
            .with_scalar(f64::from(round) * 100.0)
            .with_output(out.clone());
        let done = sim.soc().launch_and_wait(C0, params).unwrap();
        assert_eq!(done.epoch.0, u64::from(round));

        let expected: Vec<f64> = (0..8).map(|i| f64::from(round) * 100.0 + f64::from(i)).collect();
        assert_eq!(out.to_vec(), expected);
    }
    assert!(sim.faults().is_empty(), "{:?}", sim.faults());
}

#[test]
fn compute_only_does_not_wait_for_dm_core() {
    let config = config().with_launch_timeout(Duration::from_millis(500));
    let sim = SimulatedSoc::new(SocTopology::OCCAMY, config).unwrap();
    sim.load(
        C0,
        Arc::new(|ctx: &CoreContext| -> occamy_runtime::Result<()> {
            ctx.on_post_wake()?;
            if ctx.is_dm_core() {
                std::thread::sleep(Duration::from_millis(1500));
            }
            ctx.return_to_host(SyncScope::ComputeOnly)?;
            Ok(())
        }),
    )
    .unwrap();
    sim.soc().wake(C0).unwrap();

    let done = sim.soc().launch_and_wait(C0, LaunchParams::new(0, 0)).unwrap();
    assert_eq!(done.status.expected, 8);
    assert_eq!(done.status.arrived, 8);
}

#[test]
fn missing_core_times_out_until_aborted() {
    let config = config()
        .with_launch_timeout(Duration::from_millis(100))
        .with_barrier_timeout(Duration::from_millis(400));
    let sim = SimulatedSoc::new(SocTopology::OCCAMY, config).unwrap();
    // core 3 never reports back
    sim.load(
        C0,
        Arc::new(|ctx: &CoreContext| -> occamy_runtime::Result<()> {
            ctx.on_post_wake()?;
            if ctx.core() != CoreIndex(3) {
                ctx.return_to_host(SyncScope::All)?;
            }
            Ok(())
        }),
    )
    .unwrap();
    let soc = sim.soc();
    soc.wake(C0).unwrap();

    let err = soc.launch_and_wait(C0, LaunchParams::new(0, 0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    match err {
        RuntimeError::Timeout {
            status: Some(status),
            ..
        } => {
            assert_eq!(status.state, EpochState::AwaitingArrivals);
            assert_eq!(status.expected, 9);
            assert!(status.arrived <= 8);
        }
        other => panic!("unexpected {other:?}"),
    }

    // no recovery is guessed: the cluster stays busy
    let err = soc.launch(C0, LaunchParams::new(0, 0)).unwrap_err();
    assert!(matches!(err, RuntimeError::EpochInFlight { .. }));

    assert_eq!(soc.abort_epoch(C0).unwrap().map(|e| e.0), Some(1));

    sim.load(
        C0,
        Arc::new(|ctx: &CoreContext| -> occamy_runtime::Result<()> {
            ctx.on_post_wake()?;
            ctx.return_to_host(SyncScope::All)?;
            Ok(())
        }),
    )
    .unwrap();
    let launch = soc.launch(C0, LaunchParams::new(0, 0)).unwrap();
    assert_eq!(launch.epoch().0, 2);
    let done = soc.wait(launch).unwrap();
    assert_eq!(done.status.arrived, 9);

    // cores left waiting in the aborted barrier reported it
    assert!(sim
        .take_faults()
        .iter()
        .all(|f| f.epoch.0 == 1 && f.message.contains("aborted")));
}

#[test]
fn halt_policy_completes_without_blocking_cores() {
    let config = config().with_return_policy(ReturnPolicy::Halt);
    let sim = SimulatedSoc::new(SocTopology::OCCAMY, config).unwrap();
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&arrivals);
    sim.load(
        C0,
        Arc::new(move |ctx: &CoreContext| -> occamy_runtime::Result<()> {
            ctx.on_post_wake()?;
            let arrival = ctx.return_to_host(SyncScope::All)?;
            seen.lock().unwrap().push(arrival);
            Ok(())
        }),
    )
    .unwrap();
    sim.soc().wake(C0).unwrap();
    sim.soc().launch_and_wait(C0, LaunchParams::new(0, 0)).unwrap();

    // the last arrival may still be recording when the host wakes up
    std::thread::sleep(Duration::from_millis(50));
    let arrivals = arrivals.lock().unwrap();
    assert_eq!(arrivals.iter().filter(|a| **a == Arrival::Last).count(), 1);
    assert_eq!(arrivals.len(), 9);
    assert!(sim.faults().is_empty(), "{:?}", sim.faults());
}

#[test]
fn back_to_back_epochs_under_wait_policy_raise_no_faults() {
    // busy host polling reopens the cluster while released cores are
    // still leaving the previous barrier
    let config = config()
        .with_return_policy(ReturnPolicy::Wait)
        .with_poll_interval(Duration::ZERO);
    for scope in [SyncScope::All, SyncScope::ComputeOnly] {
        let sim = SimulatedSoc::new(SocTopology::OCCAMY, config.clone()).unwrap();
        sim.load(
            C0,
            Arc::new(move |ctx: &CoreContext| -> occamy_runtime::Result<()> {
                ctx.on_post_wake()?;
                ctx.return_to_host(scope)?;
                Ok(())
            }),
        )
        .unwrap();
        sim.soc().wake(C0).unwrap();

        for round in 1..=300u64 {
            let done = sim.soc().launch_and_wait(C0, LaunchParams::new(0, 0)).unwrap();
            assert_eq!(done.epoch.0, round);
            assert_eq!(done.status.signals, 1);
        }
        // let stragglers of the last epoch finish
        std::thread::sleep(Duration::from_millis(50));
        assert!(sim.faults().is_empty(), "{scope:?}: {:?}", sim.faults());
    }
}

#[test]
#[ignore] // Requires a UIO node exposing the control window
fn mapped_window_reports_power_state() {
    let region = MappedRegion::map("/dev/uio0", 0, occamy_soc::memmap::CTRL_WINDOW_SIZE)
        .expect("map /dev/uio0");
    let soc = Soc::new(Arc::new(region), SocTopology::OCCAMY, RuntimeConfig::from_env()).unwrap();
    for cluster in soc.topology().cluster_ids() {
        println!("{cluster}: {:?}", soc.power_state(cluster).unwrap());
    }
}
