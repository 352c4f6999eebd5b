use std::borrow::Cow;

use nozzle_config::MetricsConfig;
use nozzle_metadata::AppMetadataCache;
use nozzle_statsd::metric;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::statsd::{FormatterCounters, FormatterHistograms};
use crate::{MetricBatch, MetricKey, MetricValue, Point};

/// The series type reported to the backend for every series.
const SERIES_TYPE: &str = "gauge";

/// An error returned by [`Formatter::format`].
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// A payload could not be serialized.
    #[error("failed to serialize metrics payload")]
    Serialize(#[from] serde_json::Error),
}

/// Converts a [`MetricBatch`] into size-bounded JSON payloads for the metrics backend.
///
/// Every series is written as an entry of the payload's `series` list. Series derived from
/// request latency events are tagged with the organization, space and application name of the
/// emitting application.
///
/// If a payload exceeds the configured size, the batch is split in two by halving the points of
/// every series, and both halves are formatted recursively. Series with a single point remain
/// in the first half. A payload in which no series has more than one point is returned even if
/// it exceeds the size.
#[derive(Clone, Debug)]
pub struct Formatter {
    prefix: String,
    max_post_bytes: u32,
}

impl Formatter {
    /// Creates a formatter with the given series name prefix and payload size limit.
    pub fn new(prefix: impl Into<String>, max_post_bytes: u32) -> Self {
        Self {
            prefix: prefix.into(),
            max_post_bytes,
        }
    }

    /// Creates a formatter from the metrics section of the configuration.
    pub fn from_config(config: &MetricsConfig) -> Self {
        Self::new(config.prefix.clone(), config.max_post_bytes)
    }

    /// Returns the prefix prepended to every series name.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the size limit of a single payload in bytes.
    pub fn max_post_bytes(&self) -> u32 {
        self.max_post_bytes
    }

    /// Formats a batch into an ordered list of payloads.
    ///
    /// Returns an empty list for an empty batch. The batch itself is not modified. Application
    /// metadata is resolved once per series, before any splitting.
    pub fn format(
        &self,
        cache: &AppMetadataCache,
        batch: &MetricBatch,
    ) -> Result<Vec<Vec<u8>>, FormatError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let series = batch
            .iter()
            .map(|(key, value)| self.enrich(cache, key, value))
            .collect::<Vec<_>>();

        let views = series.iter().map(Series::view).collect::<Vec<_>>();
        let max_points = views.iter().map(|view| view.points.len()).max().unwrap_or(0);
        let max_depth = max_points.next_power_of_two().trailing_zeros() as usize;

        let mut payloads = Vec::new();
        self.format_views(&views, 0, max_depth, &mut payloads)?;
        Ok(payloads)
    }

    fn enrich<'a>(
        &self,
        cache: &AppMetadataCache,
        key: &MetricKey,
        value: &'a MetricValue,
    ) -> Series<'a> {
        let mut tags = value
            .tags
            .iter()
            .map(|tag| Cow::Borrowed(tag.as_str()))
            .collect::<Vec<_>>();

        if key.event_type.is_latency() {
            let metadata = cache.lookup(&key.app_id.to_string());
            push_tag(&mut tags, "OrgName", metadata.org_name());
            push_tag(&mut tags, "SpaceName", metadata.space_name());
            push_tag(&mut tags, "AppName", metadata.app_name());
        }

        Series {
            metric: format!("{}{}", self.prefix, key.name),
            points: &value.points,
            tags,
            host: &value.host,
        }
    }

    fn format_views(
        &self,
        views: &[SeriesView<'_>],
        depth: usize,
        max_depth: usize,
        payloads: &mut Vec<Vec<u8>>,
    ) -> Result<(), FormatError> {
        debug_assert!(
            depth <= max_depth,
            "split depth {depth} exceeds bound {max_depth}"
        );

        let payload = serde_json::to_vec(&Payload { series: views })?;
        let size = payload.len();

        if size > self.max_post_bytes as usize {
            if can_split(views) {
                let (first, second) = split_points(views);
                nozzle_log::trace!(size, depth, "splitting oversized payload");
                metric!(counter(FormatterCounters::Split) += 1);

                self.format_views(&first, depth + 1, max_depth, payloads)?;
                self.format_views(&second, depth + 1, max_depth, payloads)?;
                return Ok(());
            }

            nozzle_log::debug!(
                size,
                max_post_bytes = self.max_post_bytes,
                "payload exceeds size limit and cannot be split"
            );
            metric!(counter(FormatterCounters::PayloadOversize) += 1);
        }

        metric!(histogram(FormatterHistograms::PayloadSize) = size as u64);
        metric!(counter(FormatterCounters::Payloads) += 1);
        payloads.push(payload);
        Ok(())
    }
}

fn push_tag(tags: &mut Vec<Cow<'_, str>>, key: &str, value: &str) {
    if !value.is_empty() {
        tags.push(Cow::Owned(format!("{key}:{value}")));
    }
}

/// Returns `true` if any series holds more than one point.
fn can_split(views: &[SeriesView<'_>]) -> bool {
    views.iter().any(|view| view.points.len() > 1)
}

/// Splits the points of every series in half.
///
/// Series with a single point go entirely into the first half.
fn split_points<'a>(views: &[SeriesView<'a>]) -> (Vec<SeriesView<'a>>, Vec<SeriesView<'a>>) {
    let mut first = Vec::with_capacity(views.len());
    let mut second = Vec::with_capacity(views.len());

    for view in views {
        let at = view.points.len() / 2;
        if at == 0 {
            first.push(*view);
            continue;
        }

        let (head, tail) = view.points.split_at(at);
        first.push(view.with_points(head));
        second.push(view.with_points(tail));
    }

    (first, second)
}

/// A series with its final name and tags.
struct Series<'a> {
    metric: String,
    points: &'a [Point],
    tags: Vec<Cow<'a, str>>,
    host: &'a str,
}

impl Series<'_> {
    fn view(&self) -> SeriesView<'_> {
        SeriesView {
            metric: &self.metric,
            points: self.points,
            tags: &self.tags,
            host: self.host,
        }
    }
}

/// A view into a [`Series`] holding a contiguous subset of its points.
#[derive(Clone, Copy, Debug)]
struct SeriesView<'a> {
    metric: &'a str,
    points: &'a [Point],
    tags: &'a [Cow<'a, str>],
    host: &'a str,
}

impl<'a> SeriesView<'a> {
    fn with_points(&self, points: &'a [Point]) -> Self {
        Self { points, ..*self }
    }
}

impl Serialize for SeriesView<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Series", 5)?;
        state.serialize_field("metric", self.metric)?;
        state.serialize_field("points", self.points)?;
        state.serialize_field("type", SERIES_TYPE)?;
        state.serialize_field("tags", self.tags)?;
        state.serialize_field("host", self.host)?;
        state.end()
    }
}

#[derive(Serialize)]
struct Payload<'a> {
    series: &'a [SeriesView<'a>],
}
