//! Coordinator telemetry instruments and recording helpers.

use opentelemetry::global;
use opentelemetry::metrics::Counter;
use opentelemetry::KeyValue;
use std::sync::OnceLock;

struct CoordinatorInstruments {
    transitions: Counter<u64>,
    rejections: Counter<u64>,
    donor_selections: Counter<u64>,
}

fn instruments() -> &'static CoordinatorInstruments {
    static INSTRUMENTS: OnceLock<CoordinatorInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("galera_topology.coordinator");
        CoordinatorInstruments {
            transitions: meter
                .u64_counter("galera_topology.coordinator.transitions")
                .with_description("Node lifecycle transitions applied")
                .init(),
            rejections: meter
                .u64_counter("galera_topology.coordinator.rejections")
                .with_description("Transition attempts rejected by a precondition")
                .init(),
            donor_selections: meter
                .u64_counter("galera_topology.coordinator.donor_selections")
                .with_description("Donors assigned to joiners by policy")
                .init(),
        }
    })
}

pub(crate) fn record_transition(from: &'static str, to: &'static str) {
    instruments().transitions.add(
        1,
        &[
            KeyValue::new("from", from),
            KeyValue::new("to", to),
        ],
    );
}

pub(crate) fn record_rejection(operation: &'static str, retryable: bool) {
    instruments().rejections.add(
        1,
        &[
            KeyValue::new("operation", operation),
            KeyValue::new("retryable", retryable),
        ],
    );
}

pub(crate) fn record_donor_selection(policy: &'static str) {
    instruments()
        .donor_selections
        .add(1, &[KeyValue::new("policy", policy)]);
}
