//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use vbus_sim::{
    FaultRule, FrameRecorder, MessageConfig, PayloadGenerator, Scenario, SimSummary, Simulation,
    VirtualNode, ms_to_ns,
};
use vbus_types::{ArbitrationId, Frame};

pub fn id(raw: u16) -> ArbitrationId {
    ArbitrationId::standard(raw)
}

/// Three nodes with mixed generators, jitter and faults.
pub fn busy_scenario(seed: u64) -> Scenario {
    Scenario::new("busy")
        .with_seed(seed)
        .with_duration_ns(ms_to_ns(2_000))
        .with_node(
            VirtualNode::new(1, "engine")
                .with_message(
                    MessageConfig::new(id(0x100), ms_to_ns(10))
                        .with_jitter(ms_to_ns(2))
                        .with_payload(PayloadGenerator::Counter { len: 8 }),
                )
                .with_message(
                    MessageConfig::new(id(0x101), ms_to_ns(50)).with_payload(
                        PayloadGenerator::Random { len: 6 },
                    ),
                ),
        )
        .with_node(
            VirtualNode::new(2, "climate").with_message(
                MessageConfig::new(id(0x124), ms_to_ns(100))
                    .with_offset(ms_to_ns(3))
                    .with_payload(PayloadGenerator::Temperature {
                        len: 8,
                        start_deci_c: 250,
                        step_deci_c: 1,
                        min_deci_c: 180,
                        max_deci_c: 320,
                    }),
            ),
        )
        .with_node(
            VirtualNode::new(3, "power").with_message(
                MessageConfig::new(id(0x125), ms_to_ns(20))
                    .with_jitter(ms_to_ns(1))
                    .with_payload(PayloadGenerator::Voltage {
                        len: 8,
                        base_mv: 12_000,
                        ripple_mv: 30,
                    }),
            ),
        )
        .with_fault(FaultRule::drop(0.05).targeting([id(0x100)]))
        .with_fault(FaultRule::delay(0.05, ms_to_ns(3), ms_to_ns(1)))
        .with_fault(FaultRule::corrupt(0.02))
        .with_fault(FaultRule::burst(0.01, 2, ms_to_ns(1)))
}

/// Runs `scenario` with a recorder attached.
pub fn run_recorded(scenario: Scenario) -> (SimSummary, Vec<Frame>) {
    let mut sim = Simulation::new(scenario).expect("valid scenario");
    let recorder = Rc::new(RefCell::new(FrameRecorder::new()));
    sim.bus_mut().attach(Rc::clone(&recorder));
    let summary = sim.run().expect("run succeeds");
    let frames = recorder.borrow().frames().to_vec();
    (summary, frames)
}
