//! Metric batches and their conversion into backend payloads.
//!
//! An aggregator collects firehose events into a [`MetricBatch`], keyed by series name, event
//! type and the emitting application. On every flush, the [`Formatter`] turns the batch into one
//! or more JSON payloads for the metrics backend:
//!
//! ```json
//! {"series":[{"metric":"cloudfoundry.nozzle.requests","points":[[1700000000,1.0]],"type":"gauge","tags":["env:prod"],"host":"router/0"}]}
//! ```
//!
//! Series of request latency events are tagged with the organization, space and application
//! name from the [`AppMetadataCache`](nozzle_metadata::AppMetadataCache). Payloads exceeding the
//! configured size are split by halving the points of every series until they fit.
#![warn(missing_docs)]

mod formatter;
mod protocol;
mod statsd;

pub use self::formatter::*;
pub use self::protocol::*;
