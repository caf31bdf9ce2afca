//! Counter metrics for monotonically increasing values.

use super::{MetricDescriptor, MetricsSink, ValueKind};
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter bound to a descriptor.
#[derive(Debug)]
pub struct Counter {
    descriptor: MetricDescriptor,
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    pub const fn new(descriptor: MetricDescriptor) -> Self {
        Self {
            descriptor,
            value: AtomicU64::new(0),
        }
    }

    /// Descriptor the counter reports under.
    pub fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    /// Increment the counter by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the counter by a specific amount.
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Get the current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Push the current value to a sink.
    pub fn collect(&self, sink: &dyn MetricsSink, labels: &[&str]) {
        sink.collect(&self.descriptor, ValueKind::Counter, self.get() as f64, labels);
    }
}
