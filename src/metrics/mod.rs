//! Metrics for the orchestration core.
//!
//! Statistics are pushed through a [`MetricsSink`], one call per value:
//!
//! ```text
//! ┌──────────────────────┐   collect(desc, kind, value, labels)   ┌─────────────────┐
//! │ DistributionReport   │ ─────────────────────────────────────▶ │  MetricsSink    │
//! │ Counter              │                                        │ (registry, ...) │
//! └──────────────────────┘                                        └─────────────────┘
//! ```
//!
//! [`MetricsRegistry`] is an in-memory sink that keeps the last value of
//! every series and renders them in Prometheus text format.
//!
//! # Example
//!
//! ```rust,ignore
//! use shardctl::metrics::{DistributionCollector, MetricsRegistry};
//!
//! let registry = MetricsRegistry::new();
//! let collector = DistributionCollector::new(cache);
//! collector.collect(&registry).await?;
//! println!("{}", registry.to_prometheus());
//! ```

mod counters;
pub mod distribution;
mod gauges;

pub use counters::Counter;
pub use distribution::{
    CollectionConfig, DistributionCollector, DistributionReport, ServerShards, ShardCondition,
    ShardCountKind, ShardHealth, ShardPlacement,
};
pub use gauges::LabeledFloatGauge;

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Static description of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub label_names: &'static [&'static str],
}

impl MetricDescriptor {
    /// Create a descriptor.
    pub const fn new(
        name: &'static str,
        help: &'static str,
        label_names: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            help,
            label_names,
        }
    }
}

/// How a value should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Gauge,
    Counter,
}

impl ValueKind {
    fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Gauge => "gauge",
            ValueKind::Counter => "counter",
        }
    }
}

/// Receiver of emitted statistics.
pub trait MetricsSink: Send + Sync {
    /// Record one value. `labels` line up with `descriptor.label_names`.
    fn collect(&self, descriptor: &MetricDescriptor, kind: ValueKind, value: f64, labels: &[&str]);
}

#[derive(Debug)]
struct Family {
    kind: ValueKind,
    gauge: LabeledFloatGauge,
}

/// In-memory sink keeping the last value of every series.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    families: RwLock<BTreeMap<&'static str, Family>>,
}

impl MetricsRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of one series.
    pub fn get(&self, name: &str, labels: &[&str]) -> Option<f64> {
        self.families.read().get(name)?.gauge.get(labels)
    }

    /// Kind recorded for a family.
    pub fn kind(&self, name: &str) -> Option<ValueKind> {
        self.families.read().get(name).map(|f| f.kind)
    }

    /// All series of a family, sorted by label values.
    pub fn series(&self, name: &str) -> Vec<(Vec<String>, f64)> {
        self.families
            .read()
            .get(name)
            .map(|f| f.gauge.get_all())
            .unwrap_or_default()
    }

    /// Number of series across all families.
    pub fn len(&self) -> usize {
        self.families.read().values().map(|f| f.gauge.len()).sum()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every series, keeping nothing from earlier collections.
    pub fn clear(&self) {
        self.families.write().clear();
    }

    /// Format all series in Prometheus exposition format.
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();
        for family in self.families.read().values() {
            let name = family.gauge.name();
            let _ = writeln!(output, "# HELP {} {}", name, family.gauge.help());
            let _ = writeln!(output, "# TYPE {} {}", name, family.kind.as_str());
            for (labels, value) in family.gauge.get_all() {
                let pairs: Vec<String> = family
                    .gauge
                    .label_names()
                    .iter()
                    .zip(labels.iter())
                    .map(|(k, v)| format!("{}=\"{}\"", k, escape(v)))
                    .collect();
                if pairs.is_empty() {
                    let _ = writeln!(output, "{} {}", name, value);
                } else {
                    let _ = writeln!(output, "{}{{{}}} {}", name, pairs.join(","), value);
                }
            }
        }
        output
    }
}

impl MetricsSink for MetricsRegistry {
    fn collect(&self, descriptor: &MetricDescriptor, kind: ValueKind, value: f64, labels: &[&str]) {
        {
            let families = self.families.read();
            if let Some(family) = families.get(descriptor.name) {
                family.gauge.set(labels, value);
                return;
            }
        }

        let mut families = self.families.write();
        families
            .entry(descriptor.name)
            .or_insert_with(|| Family {
                kind,
                gauge: LabeledFloatGauge::new(descriptor.name, descriptor.help, descriptor.label_names),
            })
            .gauge
            .set(labels, value);
    }
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
