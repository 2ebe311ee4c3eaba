use std::time::Duration;

use proptest::prelude::*;

use shade_engine::backend::{HeadlessBackend, HeadlessConfig, LatencyModel};
use shade_engine::cmd::{RecordingState, RecordingUnit};
use shade_engine::submit::SubmissionEngine;
use shade_engine::sync::{Fence, FenceValue, Timeline};

fn random_gpu(max_micros: u64, seed: u64) -> HeadlessBackend {
    HeadlessBackend::new(HeadlessConfig {
        latency: LatencyModel::Random {
            max: Duration::from_micros(max_micros),
            seed,
        },
        ..Default::default()
    })
}

#[test]
fn unsignaled_values_cannot_be_awaited() {
    let gpu = HeadlessBackend::new(HeadlessConfig::default());
    let fence = Fence::new();
    assert!(fence.wait_until_signaled(&gpu, FenceValue::new(1)).is_err());
    fence.wait_until_signaled(&gpu, FenceValue::ZERO).unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 24,
        .. ProptestConfig::default()
    })]

    #[test]
    fn signals_increase_and_waits_observe_completion(signals in 1usize..24, seed in any::<u64>()) {
        let mut gpu = random_gpu(300, seed);
        let mut fence = Fence::new();
        let mut unit = RecordingUnit::new("work");

        let mut prev = FenceValue::ZERO;
        for _ in 0..signals {
            unit.reset(gpu.completed_value()).unwrap();
            unit.close().unwrap();
            gpu_execute(&mut gpu, &unit);
            let v = fence.signal(&mut gpu).unwrap();
            unit.mark_submitted(v).unwrap();

            prop_assert!(v > prev);
            prev = v;

            fence.wait_until_signaled(&gpu, v).unwrap();
            prop_assert!(gpu.completed_value() >= v);
        }
        prop_assert_eq!(fence.next_value().get(), signals as u64 + 1);
    }

    #[test]
    fn units_are_never_reset_before_their_wait(
        frames in 1usize..20,
        in_flight in 1usize..4,
        seed in any::<u64>(),
    ) {
        let mut gpu = random_gpu(500, seed);
        let mut engine = SubmissionEngine::new(in_flight).unwrap();

        for _ in 0..frames {
            // Without waiting, a unit still on the GPU must refuse to reset.
            if let Some(marker) = engine.pending_marker() {
                let completed = gpu.completed_value();
                let early = engine.begin_frame(completed);
                prop_assert_eq!(early.is_ok(), completed >= marker);
                if early.is_ok() {
                    engine.submit(&mut gpu).unwrap();
                    continue;
                }
            }

            engine.wait_for_unit(&gpu).unwrap();
            if let Some(marker) = engine.pending_marker() {
                prop_assert!(gpu.completed_value() >= marker);
            }
            engine.begin_frame(gpu.completed_value()).unwrap();
            prop_assert_eq!(engine.current_unit().state(), RecordingState::Recording);
            engine.submit(&mut gpu).unwrap();
        }

        let last = engine.flush(&mut gpu).unwrap();
        prop_assert!(gpu.completed_value() >= last);
    }
}

fn gpu_execute(gpu: &mut HeadlessBackend, unit: &RecordingUnit) {
    use shade_engine::backend::GpuBackend;
    gpu.execute(unit.list()).unwrap();
}
