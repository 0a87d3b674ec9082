//! Prometheus text exposition.
//!
//! Output layout, per metric family:
//!
//! ```text
//! # HELP http_requests_total Total requests
//! # TYPE http_requests_total counter
//! http_requests_total{method="GET"} 3
//!
//! ```
//!
//! Histograms emit one `_bucket` line per bound plus `+Inf`, followed by
//! `_sum` and `_count`. Families are separated by a blank line.

pub mod builder;

use std::borrow::Cow;

pub use builder::StringBuilder;

use crate::arena::{Arena, Shared};
use crate::collector::Collector;
use crate::error::{Error, Result};
use crate::map::ConcurrentMap;
use crate::metric::{HistogramSample, Metric, MetricSample, MetricType, SampleSlot};

/// Escape a HELP string: `\` and newline.
pub fn escape_help(help: &str) -> Cow<'_, str> {
    if !help.contains(['\\', '\n']) {
        return Cow::Borrowed(help);
    }
    let mut out = String::with_capacity(help.len() + 4);
    for c in help.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Escape a label value: `\`, `"` and newline.
pub fn escape_label_value(value: &str) -> Cow<'_, str> {
    if !value.contains(['\\', '"', '\n']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 4);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Render a sample value the way it appears in the exposition.
pub fn format_value(value: f64) -> String {
    let mut sb = StringBuilder::new();
    sb.add_value(value);
    sb.into_string()
}

/// Canonical `name[_suffix]{k1="v1",...}` text for a label set.
///
/// Without labels the braces are still emitted: `name{}`.
pub fn l_value<K, V>(name: &str, suffix: Option<&str>, keys: &[K], values: &[V]) -> Result<String>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    check_arity(keys.len(), values.len())?;
    let mut sb = StringBuilder::new();
    write_l_value(&mut sb, name, suffix, keys, values, None);
    Ok(sb.into_string())
}

fn check_arity(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::ArityMismatch { expected, actual })
    }
}

fn write_l_value<K, V>(
    sb: &mut StringBuilder,
    name: &str,
    suffix: Option<&str>,
    keys: &[K],
    values: &[V],
    le: Option<&str>,
) where
    K: AsRef<str>,
    V: AsRef<str>,
{
    sb.add_str(name);
    if let Some(suffix) = suffix {
        sb.add_char('_');
        sb.add_str(suffix);
    }
    let pairs = keys
        .iter()
        .map(|key| key.as_ref())
        .zip(values.iter().map(|value| value.as_ref()))
        .chain(le.map(|le| ("le", le)));
    sb.add_char('{');
    for (i, (key, value)) in pairs.enumerate() {
        if i > 0 {
            sb.add_char(',');
        }
        sb.add_str(key);
        sb.add_str("=\"");
        sb.add_str(&escape_label_value(value));
        sb.add_char('"');
    }
    sb.add_char('}');
}

/// Renders metrics into a reusable text buffer.
#[derive(Debug, Default)]
pub struct MetricFormatter {
    sb: StringBuilder,
}

impl MetricFormatter {
    /// Create a formatter with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything rendered so far.
    pub fn clear(&mut self) {
        self.sb.clear();
    }

    /// The text rendered so far.
    pub fn dump(&self) -> &str {
        self.sb.as_str()
    }

    /// Append a `# HELP` line. Empty help omits the trailing text.
    pub fn load_help(&mut self, name: &str, help: &str) {
        self.sb.add_str("# HELP ");
        self.sb.add_str(name);
        if !help.is_empty() {
            self.sb.add_char(' ');
            self.sb.add_str(&escape_help(help));
        }
        self.sb.add_char('\n');
    }

    /// Append a `# TYPE` line.
    pub fn load_type(&mut self, name: &str, kind: MetricType) {
        self.sb.add_str("# TYPE ");
        self.sb.add_str(name);
        self.sb.add_char(' ');
        self.sb.add_str(kind.as_str());
        self.sb.add_char('\n');
    }

    /// Append an l-value without a trailing value or newline.
    pub fn load_l_value<K, V>(
        &mut self,
        name: &str,
        suffix: Option<&str>,
        keys: &[K],
        values: &[V],
    ) -> Result<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        check_arity(keys.len(), values.len())?;
        write_l_value(&mut self.sb, name, suffix, keys, values, None);
        Ok(())
    }

    /// Append one `l_value value` line.
    pub fn load_sample<A: Arena>(&mut self, sample: &MetricSample<A>) {
        self.sb.add_str(sample.l_value());
        self.sb.add_char(' ');
        self.sb.add_value(sample.value());
        self.sb.add_char('\n');
    }

    /// Append the bucket, sum and count lines of one histogram label set.
    ///
    /// The lines come from a single snapshot, so they are mutually
    /// consistent even while other workers keep observing.
    pub fn load_histogram_sample<A: Arena>(
        &mut self,
        metric: &Metric<A>,
        sample: &HistogramSample<A>,
    ) {
        let keys = metric.label_keys();
        let labels = sample.labels();
        let snapshot = sample.snapshot();

        let bounds = snapshot
            .bounds
            .iter()
            .copied()
            .chain(std::iter::once(f64::INFINITY));
        for (bound, count) in bounds.zip(&snapshot.counts) {
            let le = format_value(bound);
            write_l_value(
                &mut self.sb,
                metric.name(),
                Some("bucket"),
                keys,
                labels,
                Some(le.as_str()),
            );
            self.sb.add_char(' ');
            self.sb.add_str(&count.to_string());
            self.sb.add_char('\n');
        }

        write_l_value(&mut self.sb, metric.name(), Some("sum"), keys, labels, None);
        self.sb.add_char(' ');
        self.sb.add_value(snapshot.sum);
        self.sb.add_char('\n');

        write_l_value(&mut self.sb, metric.name(), Some("count"), keys, labels, None);
        self.sb.add_char(' ');
        self.sb.add_str(&snapshot.count.to_string());
        self.sb.add_char('\n');
    }

    /// Append a whole family: HELP, TYPE, every sample, then a blank line.
    pub fn load_metric<A: Arena>(&mut self, metric: &Metric<A>) {
        self.load_help(metric.name(), metric.help());
        self.load_type(metric.name(), metric.kind());
        for slot in metric.samples() {
            match slot {
                SampleSlot::Scalar(sample) => self.load_sample(&sample),
                SampleSlot::Histogram(sample) => self.load_histogram_sample(metric, &sample),
            }
        }
        self.sb.add_char('\n');
    }

    /// Append every metric of every collector, in registration order.
    pub fn load_metrics<A: Arena>(
        &mut self,
        collectors: &ConcurrentMap<Shared<Collector<A>, A>, A>,
    ) {
        for collector in collectors.values() {
            for metric in collector.collect() {
                self.load_metric(&metric);
            }
        }
    }
}
