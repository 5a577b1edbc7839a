//! Fault injection through full simulation runs.

mod common;

use common::{id, run_recorded};
use test_case::test_case;
use vbus_sim::{
    FaultInjector, FaultRule, MessageConfig, PayloadGenerator, Scenario, SimRng, VirtualNode,
    ms_to_ns,
};
use vbus_types::{ArbitrationId, Frame, NodeId};

fn steady(fault: Option<FaultRule>) -> Scenario {
    let scenario = Scenario::new("steady")
        .with_seed(21)
        .with_duration_ns(ms_to_ns(1_000))
        .with_node(
            VirtualNode::new(1, "a").with_message(
                MessageConfig::new(id(0x100), ms_to_ns(10)).with_payload(PayloadGenerator::Constant {
                    data: vec![0x11, 0x22, 0x33, 0x44],
                }),
            ),
        )
        .with_node(
            VirtualNode::new(2, "b").with_message(
                MessageConfig::new(id(0x200), ms_to_ns(10)).with_payload(PayloadGenerator::Constant {
                    data: vec![0x55],
                }),
            ),
        );
    match fault {
        Some(rule) => scenario.with_fault(rule),
        None => scenario,
    }
}

#[test]
fn test_certain_drop_publishes_nothing() {
    let (summary, frames) = run_recorded(steady(Some(FaultRule::drop(1.0))));
    assert!(frames.is_empty());
    assert_eq!(summary.faults.frames_dropped, 202);
}

#[test]
fn test_zero_probability_rules_leave_traffic_untouched() {
    let (_, clean) = run_recorded(steady(None));
    for rule in [
        FaultRule::drop(0.0),
        FaultRule::delay(0.0, 5, 1),
        FaultRule::jitter(0.0, 5),
        FaultRule::burst(0.0, 3, 1),
        FaultRule::flood(0.0, 1, 10),
        FaultRule::corrupt(0.0),
    ] {
        let (summary, frames) = run_recorded(steady(Some(rule)));
        assert_eq!(frames, clean);
        assert_eq!(summary.faults.frames_passed(), summary.faults.frames_processed);
    }
}

#[test]
fn test_target_filter_limits_faults_to_listed_ids() {
    let rule = FaultRule::drop(1.0).targeting([id(0x200)]);
    let (_, frames) = run_recorded(steady(Some(rule)));
    assert_eq!(frames.len(), 101);
    assert!(frames.iter().all(|f| f.arbitration_id() == id(0x100)));
}

#[test_case(0.1; "ten percent")]
#[test_case(0.5; "half")]
#[test_case(0.9; "ninety percent")]
fn test_drop_rate_tracks_probability(p: f64) {
    let scenario = steady(Some(FaultRule::drop(p))).with_duration_ns(ms_to_ns(20_000));
    let (summary, _) = run_recorded(scenario);
    let processed = summary.faults.frames_processed as f64;
    let observed = summary.faults.frames_dropped as f64 / processed;
    // 4002 draws: five standard deviations is under 0.04 for any p.
    assert!((observed - p).abs() < 0.04, "observed {observed} for p={p}");
}

#[test]
fn test_corruption_changes_payload_not_length() {
    let (clean_summary, clean) = run_recorded(steady(None));
    let (summary, corrupted) = run_recorded(steady(Some(FaultRule::corrupt(1.0))));
    assert_eq!(clean_summary.frames_published, summary.frames_published);
    for (a, b) in clean.iter().zip(corrupted.iter()) {
        assert_eq!(a.dlc(), b.dlc());
        assert_eq!(a.timestamp_ns(), b.timestamp_ns());
        assert_ne!(a.data(), b.data());
    }
}

#[test]
fn test_delay_and_jitter_keep_order_and_count() {
    for rule in [
        FaultRule::delay(0.3, ms_to_ns(15), ms_to_ns(5)),
        FaultRule::jitter(0.3, ms_to_ns(25)),
    ] {
        let (summary, frames) = run_recorded(steady(Some(rule)));
        assert!(frames.windows(2).all(|w| w[0].key() <= w[1].key()));
        // Delayed frames scheduled past the duration are never published.
        assert!(summary.frames_published <= 202);
        assert!(summary.faults.frames_delayed > 0);
    }
}

#[test]
fn test_burst_amplifies_traffic() {
    let (summary, frames) = run_recorded(steady(Some(FaultRule::burst(1.0, 2, ms_to_ns(1)))));
    assert_eq!(summary.faults.amplifications, 202);
    // Copies of the emissions at t = 1000ms fall beyond the duration.
    assert_eq!(frames.len(), 202 * 3 - 4);
}

#[test]
fn test_rule_order_decides_between_matches() {
    let frame = Frame::new(ArbitrationId::standard(0x1), vec![1], 0, NodeId::new(1)).unwrap();
    let drop_first = FaultInjector::new(vec![FaultRule::drop(1.0), FaultRule::corrupt(1.0)]);
    let corrupt_first = FaultInjector::new(vec![FaultRule::corrupt(1.0), FaultRule::drop(1.0)]);

    let mut rng = SimRng::new(0);
    assert_eq!(drop_first.apply(&frame, &mut rng).label(), "drop");
    assert_eq!(corrupt_first.apply(&frame, &mut rng).label(), "replace");
}
