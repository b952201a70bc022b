//! AXPY offload round-trips on the simulated SoC

use occamy_kernels::{
    offload_axpy, offload_entry, run_offload, run_standalone, AxpyData, KernelError,
    KernelTable, WorkSplit, AXPY_ID,
};
use occamy_runtime::prelude::*;
use std::time::Duration;

fn sim_with(split: WorkSplit, scope: SyncScope) -> SimulatedSoc {
    let config = RuntimeConfig::default()
        .with_launch_timeout(Duration::from_secs(5))
        .with_poll_interval(Duration::from_micros(50));
    let sim = SimulatedSoc::new(SocTopology::OCCAMY, config).unwrap();
    for cluster in [ClusterId(0), ClusterId(3)] {
        sim.load(cluster, offload_entry(KernelTable::builtin(), split, scope))
            .unwrap();
        sim.soc().wake(cluster).unwrap();
    }
    sim
}

#[test]
fn reference_problem_round_trip() {
    let sim = sim_with(WorkSplit::PerCore, SyncScope::All);
    let run = offload_axpy(sim.soc(), ClusterId(0), &AxpyData::reference()).unwrap();

    assert_eq!(run.z, vec![12.0, 24.0, 36.0, 48.0]);
    assert_eq!(run.completion.epoch.0, 1);
    // four elements over eight compute cores: every compute core reports
    assert_eq!(run.completion.core_cycles.len(), 8);
    assert!(run.completion.max_core_cycles().is_some());
    assert!(sim.faults().is_empty(), "{:?}", sim.faults());
}

#[test]
fn every_split_gives_the_same_answer() {
    let data = AxpyData::generate(257, 7);
    for split in [WorkSplit::PerCore, WorkSplit::Single, WorkSplit::Replicated] {
        let sim = sim_with(split, SyncScope::ComputeOnly);
        let run = offload_axpy(sim.soc(), ClusterId(3), &data).unwrap();
        assert_eq!(run.z, data.expected(), "{split:?}");
        assert_eq!(run.completion.status.expected, 8);
        assert!(sim.faults().is_empty(), "{split:?}: {:?}", sim.faults());
    }
}

#[test]
fn consecutive_offloads_on_one_cluster() {
    let sim = sim_with(WorkSplit::PerCore, SyncScope::All);
    for seed in 0..5 {
        let data = AxpyData::generate(64, seed);
        let run = offload_axpy(sim.soc(), ClusterId(0), &data).unwrap();
        assert_eq!(run.z, data.expected());
        assert_eq!(run.completion.epoch.0, seed + 1);
    }
    assert!(sim.faults().is_empty(), "{:?}", sim.faults());
}

#[test]
fn repeated_offloads_with_busy_polling_raise_no_faults() {
    let config = RuntimeConfig::default()
        .with_return_policy(ReturnPolicy::Wait)
        .with_poll_interval(Duration::ZERO);
    let sim = SimulatedSoc::new(SocTopology::OCCAMY, config).unwrap();
    let cluster = ClusterId(0);
    sim.load(
        cluster,
        offload_entry(KernelTable::builtin(), WorkSplit::PerCore, SyncScope::ComputeOnly),
    )
    .unwrap();
    sim.soc().wake(cluster).unwrap();

    let data = AxpyData::generate(64, 11);
    for _ in 0..200 {
        let run = offload_axpy(sim.soc(), cluster, &data).unwrap();
        assert_eq!(run.z, data.expected());
    }
    std::thread::sleep(Duration::from_millis(50));
    assert!(sim.faults().is_empty(), "{:?}", sim.faults());
}

#[test]
fn offload_matches_standalone() {
    let sim = sim_with(WorkSplit::PerCore, SyncScope::All);
    let data = AxpyData::generate(100, 3);
    let offloaded = offload_axpy(sim.soc(), ClusterId(0), &data).unwrap();
    let host = run_standalone(sim.soc(), ClusterId(1), &data).unwrap();
    assert_eq!(offloaded.z, host.z);
    assert!(sim.faults().is_empty(), "{:?}", sim.faults());
}

#[test]
fn unknown_kernel_is_refused_before_launch() {
    let sim = sim_with(WorkSplit::PerCore, SyncScope::All);
    let err = run_offload(
        sim.soc(),
        ClusterId(0),
        &KernelTable::builtin(),
        LaunchParams::new(99, 4),
    )
    .unwrap_err();
    assert!(matches!(err, KernelError::UnknownKernel { id: 99 }));

    // the cluster is still free
    let run = offload_axpy(sim.soc(), ClusterId(0), &AxpyData::reference()).unwrap();
    assert_eq!(run.completion.epoch.0, 1);
    assert!(sim.faults().is_empty(), "{:?}", sim.faults());
}

#[test]
fn failing_kernel_still_completes_the_barrier() {
    let sim = sim_with(WorkSplit::PerCore, SyncScope::All);
    // skip host-side validation: no output buffer
    let params = LaunchParams::new(AXPY_ID, 4).with_scalar(1.0);
    let done = sim.soc().launch_and_wait(ClusterId(0), params).unwrap();
    assert_eq!(done.status.arrived, 9);

    // cores report the failure after releasing the barrier
    std::thread::sleep(Duration::from_millis(50));
    let faults = sim.faults();
    assert!(!faults.is_empty());
    assert!(faults.iter().all(|f| f.message.contains("Missing launch argument")));
}
