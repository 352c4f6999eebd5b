use std::collections::BTreeMap;
use std::fmt;

use nozzle_metadata::AppId;
use serde::{Deserialize, Serialize};

/// The kind of firehose envelope a series was derived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Start and stop of an HTTP request, carrying its latency.
    HttpStartStop,
    /// A log line emitted by an application or platform component.
    LogMessage,
    /// A named value emitted by a platform component.
    ValueMetric,
    /// A monotonic counter emitted by a platform component.
    CounterEvent,
    /// An error reported by a platform component.
    Error,
    /// Resource usage of an application container.
    ContainerMetric,
}

impl EventType {
    /// Returns `true` for request latency events, whose series are attributed to an application.
    pub fn is_latency(&self) -> bool {
        matches!(self, Self::HttpStartStop)
    }

    /// Returns the name of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HttpStartStop => "http_start_stop",
            Self::LogMessage => "log_message",
            Self::ValueMetric => "value_metric",
            Self::CounterEvent => "counter_event",
            Self::Error => "error",
            Self::ContainerMetric => "container_metric",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity of a series.
///
/// Two values are aggregated into the same series if, and only if, all fields of their keys
/// match.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricKey {
    /// Name of the series, without the configured prefix.
    pub name: String,
    /// Kind of the envelope the series was derived from.
    pub event_type: EventType,
    /// The emitting application. The all-zero identifier marks platform traffic.
    pub app_id: AppId,
}

/// A single measurement of a series.
///
/// Serialized as the two-element array `[timestamp, value]`.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(from = "(i64, f64)", into = "(i64, f64)")]
pub struct Point {
    /// UNIX timestamp in seconds.
    pub timestamp: i64,
    /// The measured value.
    pub value: f64,
}

impl Point {
    /// Creates a new point.
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

impl From<(i64, f64)> for Point {
    fn from((timestamp, value): (i64, f64)) -> Self {
        Self { timestamp, value }
    }
}

impl From<Point> for (i64, f64) {
    fn from(point: Point) -> Self {
        (point.timestamp, point.value)
    }
}

/// The aggregated data of a series.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricValue {
    /// Measurements in ascending time order.
    pub points: Vec<Point>,
    /// Tags in `key:value` form.
    pub tags: Vec<String>,
    /// Name of the host that emitted the series.
    pub host: String,
}

/// All series collected within one flush interval.
///
/// Keys are ordered, so series are emitted in a stable order.
pub type MetricBatch = BTreeMap<MetricKey, MetricValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_wire_format() {
        let point = Point::new(1700000000, 2.5);
        let json = serde_json::to_string(&point).unwrap();
        assert_eq!(json, "[1700000000,2.5]");
        assert_eq!(serde_json::from_str::<Point>(&json).unwrap(), point);
    }

    #[test]
    fn test_event_type_names() {
        let event_type: EventType = serde_json::from_str(r#""http_start_stop""#).unwrap();
        assert_eq!(event_type, EventType::HttpStartStop);
        assert_eq!(event_type.to_string(), "http_start_stop");
        assert!(event_type.is_latency());

        for event_type in [
            EventType::LogMessage,
            EventType::ValueMetric,
            EventType::CounterEvent,
            EventType::Error,
            EventType::ContainerMetric,
        ] {
            assert!(!event_type.is_latency());
            let json = serde_json::to_string(&event_type).unwrap();
            assert_eq!(json, format!("\"{event_type}\""));
        }
    }

    #[test]
    fn test_keys_differ_by_every_field() {
        let key = MetricKey {
            name: "latency".to_owned(),
            event_type: EventType::HttpStartStop,
            app_id: AppId::new(1, 2),
        };

        let mut batch = MetricBatch::new();
        batch.insert(key.clone(), MetricValue::default());
        batch.insert(
            MetricKey {
                name: "requests".to_owned(),
                ..key.clone()
            },
            MetricValue::default(),
        );
        batch.insert(
            MetricKey {
                event_type: EventType::ValueMetric,
                ..key.clone()
            },
            MetricValue::default(),
        );
        batch.insert(
            MetricKey {
                app_id: AppId::NIL,
                ..key.clone()
            },
            MetricValue::default(),
        );
        batch.insert(key, MetricValue::default());

        assert_eq!(batch.len(), 4);
    }
}
