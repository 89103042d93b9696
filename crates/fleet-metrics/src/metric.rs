//! Metric samples and static metric descriptors.

use std::fmt;

/// Prometheus metric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of a metric family: name, help, type, and the
/// ordered list of variable label names.
#[derive(Debug)]
pub struct Desc {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub labels: &'static [&'static str],
}

impl Desc {
    pub const fn gauge(name: &'static str, help: &'static str, labels: &'static [&'static str]) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Gauge,
            labels,
        }
    }

    pub const fn counter(name: &'static str, help: &'static str, labels: &'static [&'static str]) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Counter,
            labels,
        }
    }

    /// Build a sample. `values` pairs positionally with `labels`.
    pub fn sample(&self, value: f64, values: &[&str]) -> Metric {
        debug_assert_eq!(
            self.labels.len(),
            values.len(),
            "label count mismatch for {}",
            self.name
        );
        Metric {
            name: self.name.to_string(),
            help: self.help.to_string(),
            kind: self.kind,
            labels: self
                .labels
                .iter()
                .zip(values)
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            value,
        }
    }
}

/// A single metric sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    /// Label pairs in render order.
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl Metric {
    pub fn gauge(name: impl Into<String>, help: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            kind: MetricKind::Gauge,
            labels: Vec::new(),
            value,
        }
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((name.into(), value.into()));
        self
    }

    /// Look up a label value by name.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const D_STATUS: Desc = Desc::gauge("test_status", "Status of the thing", &["status"]);

    #[test]
    fn desc_sample_pairs_labels() {
        let m = D_STATUS.sample(1.0, &["available"]);
        assert_eq!(m.name, "test_status");
        assert_eq!(m.kind, MetricKind::Gauge);
        assert_eq!(m.label("status"), Some("available"));
        assert_eq!(m.value, 1.0);
    }

    #[test]
    fn metric_builder_appends_labels() {
        let m = Metric::gauge("redis_up", "Whether the server answered", 1.0)
            .with_label("a", "1")
            .with_label("b", "2");
        let expected: Vec<(String, String)> = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ];
        assert_eq!(m.labels, expected);
        assert_eq!(m.label("c"), None);
    }
}
