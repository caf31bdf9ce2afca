//! Labeled gauges for floating-point values.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A float gauge with a variable set of label values.
///
/// Values are stored as `f64` bits in atomics, so updating an existing series
/// only takes the read lock.
#[derive(Debug)]
pub struct LabeledFloatGauge {
    name: &'static str,
    help: &'static str,
    label_names: &'static [&'static str],
    gauges: RwLock<HashMap<Vec<String>, AtomicU64>>,
}

impl LabeledFloatGauge {
    /// Create a new labeled gauge.
    pub fn new(name: &'static str, help: &'static str, label_names: &'static [&'static str]) -> Self {
        Self {
            name,
            help,
            label_names,
            gauges: RwLock::new(HashMap::new()),
        }
    }

    /// Get the gauge name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Get the gauge help text.
    pub fn help(&self) -> &'static str {
        self.help
    }

    /// Get the label names.
    pub fn label_names(&self) -> &'static [&'static str] {
        self.label_names
    }

    /// Set the series with the given labels.
    pub fn set(&self, labels: &[&str], value: f64) {
        let key = series_key(labels);
        {
            let gauges = self.gauges.read();
            if let Some(gauge) = gauges.get(&key) {
                gauge.store(value.to_bits(), Ordering::Relaxed);
                return;
            }
        }

        self.gauges
            .write()
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .store(value.to_bits(), Ordering::Relaxed);
    }

    /// Add to the series with the given labels.
    pub fn add(&self, labels: &[&str], n: f64) {
        let update = |gauge: &AtomicU64| {
            let _ = gauge.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + n).to_bits())
            });
        };

        let key = series_key(labels);
        {
            let gauges = self.gauges.read();
            if let Some(gauge) = gauges.get(&key) {
                update(gauge);
                return;
            }
        }

        let mut gauges = self.gauges.write();
        update(gauges.entry(key).or_insert_with(|| AtomicU64::new(0)));
    }

    /// Value of one series.
    pub fn get(&self, labels: &[&str]) -> Option<f64> {
        self.gauges
            .read()
            .get(&series_key(labels))
            .map(|g| f64::from_bits(g.load(Ordering::Relaxed)))
    }

    /// All series sorted by label values.
    pub fn get_all(&self) -> Vec<(Vec<String>, f64)> {
        let mut all: Vec<_> = self
            .gauges
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), f64::from_bits(v.load(Ordering::Relaxed))))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Remove one series.
    pub fn remove(&self, labels: &[&str]) -> Option<f64> {
        self.gauges
            .write()
            .remove(&series_key(labels))
            .map(|g| f64::from_bits(g.into_inner()))
    }

    /// Number of series.
    pub fn len(&self) -> usize {
        self.gauges.read().len()
    }

    /// Whether there are no series.
    pub fn is_empty(&self) -> bool {
        self.gauges.read().is_empty()
    }

    /// Drop every series.
    pub fn clear(&self) {
        self.gauges.write().clear();
    }
}

fn series_key(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|s| s.to_string()).collect()
}
