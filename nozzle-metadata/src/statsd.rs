use nozzle_statsd::{CounterMetric, GaugeMetric, TimerMetric};

/// Counter metrics for the metadata cache.
pub enum MetadataCounters {
    /// Incremented for every lookup of an identifier that is not cached yet.
    ///
    /// Concurrent lookups waiting for the same in-flight resolution are counted once each.
    LookupMiss,

    /// Incremented every time a control plane record cannot be resolved.
    ///
    /// Tagged by `record`, the kind of record that failed.
    ResolveFailed,
}

impl CounterMetric for MetadataCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::LookupMiss => "metadata.lookup.miss",
            Self::ResolveFailed => "metadata.resolve.failed",
        }
    }
}

/// Timer metrics for the metadata cache.
pub enum MetadataTimers {
    /// Time in milliseconds spent listing and indexing all records at startup.
    BulkLoad,
}

impl TimerMetric for MetadataTimers {
    fn name(&self) -> &'static str {
        match *self {
            Self::BulkLoad => "metadata.bulk_load",
        }
    }
}

/// Gauge metrics for the metadata cache.
pub enum MetadataGauges {
    /// The number of identifiers bound in the cache.
    CacheSize,
}

impl GaugeMetric for MetadataGauges {
    fn name(&self) -> &'static str {
        match *self {
            Self::CacheSize => "metadata.cache.size",
        }
    }
}
