//! Prometheus metrics for the admission gate.
//!
//! Registered into a `prometheus_client` [`Registry`] owned by the binary and
//! exported on the admin port's `/metrics` endpoint in OpenMetrics text format.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `coupe_gate_decisions_total` | counter | `function`, `outcome` |
//! | `coupe_gate_broker_duration_ms` | histogram | `function` |
//! | `coupe_gate_connections_rejected_total` | counter | |

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

// ─────────────────────────────────────────────────────────────────────────────
// Label Sets
// ─────────────────────────────────────────────────────────────────────────────

/// Labels for admission decision counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DecisionLabels {
    /// Function the gate protects
    pub function: String,
    /// One of "approved", "rejected", "unreachable", "internal_error"
    pub outcome: String,
}

/// Labels for broker latency histograms.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FunctionLabels {
    /// Function the gate protects
    pub function: String,
}

/// Broker round-trip buckets in milliseconds.
const BROKER_DURATION_BUCKETS: &[f64] = &[
    1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

/// Admission gate metrics.
pub struct GateMetrics {
    /// Admission decisions by outcome
    pub decisions_total: Family<DecisionLabels, Counter>,
    /// Session-start call latency
    pub broker_duration_ms: Family<FunctionLabels, Histogram>,
    /// Connections refused at the listener because the limit was reached
    pub connections_rejected_total: Counter,
}

impl GateMetrics {
    /// Create the metric set and register it.
    pub fn new(registry: &mut Registry) -> Self {
        let decisions_total = Family::<DecisionLabels, Counter>::default();
        registry.register(
            "coupe_gate_decisions_total",
            "Admission decisions by outcome",
            decisions_total.clone(),
        );

        let broker_duration_ms = Family::<FunctionLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(BROKER_DURATION_BUCKETS.iter().copied())
        });
        registry.register(
            "coupe_gate_broker_duration_ms",
            "Session broker call latency in milliseconds",
            broker_duration_ms.clone(),
        );

        let connections_rejected_total = Counter::default();
        registry.register(
            "coupe_gate_connections_rejected_total",
            "Connections rejected at the connection limit",
            connections_rejected_total.clone(),
        );

        Self {
            decisions_total,
            broker_duration_ms,
            connections_rejected_total,
        }
    }

    /// Count one admission decision.
    pub fn record_decision(&self, function: &str, outcome: &str) {
        self.decisions_total
            .get_or_create(&DecisionLabels {
                function: function.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
    }

    /// Observe one broker round trip.
    pub fn record_broker_duration(&self, function: &str, duration_ms: f64) {
        self.broker_duration_ms
            .get_or_create(&FunctionLabels {
                function: function.to_string(),
            })
            .observe(duration_ms);
    }

    /// Count a connection refused at the listener.
    pub fn record_connection_rejected(&self) {
        self.connections_rejected_total.inc();
    }
}
