//! Timing analysis over hand-built streams and full runs.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::id;
use vbus_sim::{
    Expectation, FaultRule, FnObserver, FrameRecorder, MessageConfig, PayloadGenerator, Scenario,
    Simulation, TimingAnalyzer, VirtualNode, ms_to_ns, sec_to_ns,
};
use vbus_types::{EventKind, Frame, NodeId, Severity, Signal, SignalValue};

fn frame_at(raw: u16, t: u64) -> Frame {
    Frame::new(id(raw), vec![0u8; 2], t, NodeId::new(1)).unwrap()
}

#[test]
fn test_single_late_arrival_is_one_missed_deadline() {
    let mut analyzer = TimingAnalyzer::default();
    analyzer.set_expectation(Expectation::new(id(0x10), 100).with_tolerance(20.0));

    for t in [0, 100, 260] {
        analyzer.observe(&frame_at(0x10, t));
    }

    let misses: Vec<_> = analyzer
        .events()
        .iter()
        .filter(|e| e.kind() == EventKind::MissedDeadline)
        .collect();
    assert_eq!(misses.len(), 1);
    assert_eq!(misses[0].timestamp_ns(), 260);
    assert_eq!(misses[0].severity(), Severity::Warning);
    assert_eq!(misses[0].arbitration_id(), Some(id(0x10)));
    assert_eq!(analyzer.tracker(id(0x10)).map(|t| t.miss_count), Some(1));
}

#[test]
fn test_dropped_frames_show_up_as_missed_deadlines() {
    let scenario = Scenario::new("drops")
        .with_seed(5)
        .with_duration_ns(sec_to_ns(10))
        .with_node(VirtualNode::new(1, "a").with_message(MessageConfig::new(id(0x10), ms_to_ns(100))))
        .with_fault(FaultRule::drop(0.25))
        .with_expectation(Expectation::new(id(0x10), ms_to_ns(100)));

    let analyzer = Rc::new(RefCell::new(scenario.build_analyzer()));
    let recorder = Rc::new(RefCell::new(FrameRecorder::new()));
    let mut sim = Simulation::new(scenario).unwrap();
    sim.bus_mut().attach(Rc::clone(&recorder));
    sim.bus_mut().attach(Rc::clone(&analyzer));
    sim.run().unwrap();

    let frames = recorder.borrow().frames().to_vec();
    let gaps: Vec<u64> = frames
        .windows(2)
        .map(|w| w[1].timestamp_ns() - w[0].timestamp_ns())
        .filter(|&delta| delta > ms_to_ns(120))
        .collect();
    assert!(!gaps.is_empty());

    let analyzer = analyzer.borrow();
    let misses: Vec<_> = analyzer
        .events()
        .iter()
        .filter(|e| e.kind() == EventKind::MissedDeadline)
        .collect();
    assert_eq!(misses.len(), gaps.len());
    for (event, gap) in misses.iter().zip(&gaps) {
        let expected = if *gap > ms_to_ns(240) {
            Severity::Critical
        } else {
            Severity::Warning
        };
        assert_eq!(event.severity(), expected);
    }
}

#[test]
fn test_saturation_is_reported_once_per_window() {
    let scenario = Scenario::new("flooded")
        .with_duration_ns(sec_to_ns(3))
        .with_node(VirtualNode::new(1, "chatty").with_message(MessageConfig::new(id(0x1), 100_000)));

    let analyzer = Rc::new(RefCell::new(scenario.build_analyzer()));
    let mut sim = Simulation::new(scenario).unwrap();
    sim.bus_mut().attach(Rc::clone(&analyzer));
    sim.run().unwrap();

    let analyzer = analyzer.borrow();
    let times: Vec<u64> = analyzer
        .events()
        .iter()
        .filter(|e| e.kind() == EventKind::BusSaturation)
        .map(vbus_types::Event::timestamp_ns)
        .collect();
    assert_eq!(times, vec![ms_to_ns(500), ms_to_ns(1_500), ms_to_ns(2_500)]);
    assert!(
        analyzer
            .events()
            .iter()
            .all(|e| e.severity() == Severity::Critical)
    );
}

#[test]
fn test_counter_jumps_match_dropped_emissions() {
    let scenario = Scenario::new("counter")
        .with_seed(17)
        .with_duration_ns(sec_to_ns(2))
        .with_node(
            VirtualNode::new(1, "ecu").with_message(
                MessageConfig::new(id(0x50), ms_to_ns(10))
                    .with_payload(PayloadGenerator::Counter { len: 1 }),
            ),
        )
        .with_fault(FaultRule::drop(0.1));

    let analyzer = Rc::new(RefCell::new(scenario.build_analyzer()));
    let recorder = Rc::new(RefCell::new(FrameRecorder::new()));
    let mut sim = Simulation::new(scenario).unwrap();
    sim.bus_mut().attach(Rc::clone(&recorder));

    // Stand-in normalizer: byte 0 is the rolling counter.
    let normalizer_target = Rc::clone(&analyzer);
    sim.bus_mut()
        .attach(FnObserver::new("normalizer", move |frame: &Frame| {
            let signal = Signal::new(
                frame.timestamp_ns(),
                "counter",
                SignalValue::Int(i64::from(frame.data()[0])),
            )
            .with_source(frame.arbitration_id());
            normalizer_target.borrow_mut().observe_signal(&signal);
            Ok(())
        }));
    let summary = sim.run().unwrap();
    assert!(summary.faults.frames_dropped > 0);

    let frames = recorder.borrow().frames().to_vec();
    let expected = frames
        .windows(2)
        .filter(|w| w[1].data()[0] != w[0].data()[0].wrapping_add(1))
        .count();
    let jumps = analyzer
        .borrow()
        .events()
        .iter()
        .filter(|e| e.kind() == EventKind::CounterJump)
        .count();
    assert!(expected > 0);
    assert_eq!(jumps, expected);
}

#[test]
fn test_summary_counts_events_by_kind() {
    let mut analyzer = TimingAnalyzer::default();
    analyzer.set_expectation(Expectation::new(id(0x10), ms_to_ns(10)));
    for t in [0, 10, 20, 60] {
        analyzer.observe(&frame_at(0x10, ms_to_ns(t)));
    }
    analyzer.observe(&frame_at(0x20, 0));

    let summary = analyzer.summary();
    assert_eq!(summary.total_events, 2);
    assert_eq!(summary.by_kind.get(&EventKind::MissedDeadline), Some(&1));
    assert_eq!(summary.by_kind.get(&EventKind::JitterAnomaly), Some(&1));
    assert_eq!(summary.by_severity.get(&Severity::Critical), Some(&1));
    assert_eq!(summary.monitored_ids, vec![id(0x10)]);
    assert_eq!(summary.observed_ids, vec![id(0x10), id(0x20)]);
}
