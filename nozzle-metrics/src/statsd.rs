use nozzle_statsd::{CounterMetric, HistogramMetric};

/// Counter metrics for payload formatting.
pub enum FormatterCounters {
    /// Incremented for every payload returned by the formatter.
    Payloads,

    /// Incremented every time a batch is split in two because its payload was too large.
    Split,

    /// Incremented for every payload that exceeds the size limit but cannot be split further.
    ///
    /// These payloads are still returned and may be rejected by the backend.
    PayloadOversize,
}

impl CounterMetric for FormatterCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::Payloads => "formatter.payloads",
            Self::Split => "formatter.split",
            Self::PayloadOversize => "formatter.payload.oversize",
        }
    }
}

/// Histogram metrics for payload formatting.
pub enum FormatterHistograms {
    /// The size of every returned payload in bytes.
    PayloadSize,
}

impl HistogramMetric for FormatterHistograms {
    fn name(&self) -> &'static str {
        match *self {
            Self::PayloadSize => "formatter.payload.size",
        }
    }
}
