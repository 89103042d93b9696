//! Prometheus text exposition format.
//!
//! Renders gathered samples into the Prometheus text exposition format
//! for scraping by a Prometheus server or compatible agent.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::metric::Metric;

/// Content type of the rendered exposition.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render samples into Prometheus text format.
///
/// Samples are grouped by metric name with one HELP/TYPE header per
/// family (taken from the first sample seen). Families are emitted in
/// name order and samples within a family in label order, so output is
/// stable across scrapes.
pub fn render_prometheus(metrics: &[Metric]) -> String {
    let mut families: BTreeMap<&str, Vec<&Metric>> = BTreeMap::new();
    for m in metrics {
        families.entry(m.name.as_str()).or_default().push(m);
    }

    let mut out = String::new();
    for (name, mut samples) in families {
        let head = samples[0];
        let _ = writeln!(out, "# HELP {name} {}", escape_help(&head.help));
        let _ = writeln!(out, "# TYPE {name} {}", head.kind);

        samples.sort_by(|a, b| a.labels.cmp(&b.labels));
        for s in samples {
            out.push_str(name);
            if !s.labels.is_empty() {
                out.push('{');
                for (i, (k, v)) in s.labels.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "{k}=\"{}\"", escape_label_value(v));
                }
                out.push('}');
            }
            let _ = writeln!(out, " {}", format_value(s.value));
        }
    }
    out
}

fn escape_help(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{Desc, MetricKind};

    const D_STATUS: Desc = Desc::gauge("aws_rds_status", "Status of the RDS instance", &["status"]);
    const D_LOGS: Desc = Desc::counter("aws_rds_log_messages_total", "Number of messages", &["level"]);

    #[test]
    fn render_empty() {
        assert_eq!(render_prometheus(&[]), "");
    }

    #[test]
    fn render_single_family() {
        let output = render_prometheus(&[D_STATUS.sample(1.0, &["available"])]);
        assert_eq!(
            output,
            "# HELP aws_rds_status Status of the RDS instance\n\
             # TYPE aws_rds_status gauge\n\
             aws_rds_status{status=\"available\"} 1\n"
        );
    }

    #[test]
    fn render_groups_families_with_one_header() {
        let metrics = vec![
            D_LOGS.sample(3.0, &["error"]),
            D_STATUS.sample(1.0, &["available"]),
            D_LOGS.sample(10.0, &["info"]),
        ];
        let output = render_prometheus(&metrics);

        assert_eq!(output.matches("# TYPE aws_rds_log_messages_total counter").count(), 1);
        assert!(output.contains("aws_rds_log_messages_total{level=\"error\"} 3\n"));
        assert!(output.contains("aws_rds_log_messages_total{level=\"info\"} 10\n"));

        // Families are sorted by name.
        let logs_at = output.find("aws_rds_log_messages_total").unwrap();
        let status_at = output.find("aws_rds_status").unwrap();
        assert!(logs_at < status_at);
    }

    #[test]
    fn render_escapes_label_values() {
        let m = Metric {
            name: "aws_rds_log_messages_total".to_string(),
            help: "Number of messages".to_string(),
            kind: MetricKind::Counter,
            labels: vec![("sample".to_string(), "say \"hi\"\\now\nbye".to_string())],
            value: 1.0,
        };
        let output = render_prometheus(&[m]);
        assert!(output.contains(r#"sample="say \"hi\"\\now\nbye""#));
    }

    #[test]
    fn render_unlabelled_and_special_values() {
        let metrics = vec![
            Metric::gauge("a_gauge", "A", 0.5),
            Metric::gauge("b_gauge", "B", f64::INFINITY),
            Metric::gauge("c_gauge", "C", f64::NAN),
        ];
        let output = render_prometheus(&metrics);
        assert!(output.contains("a_gauge 0.5\n"));
        assert!(output.contains("b_gauge +Inf\n"));
        assert!(output.contains("c_gauge NaN\n"));
    }

    #[test]
    fn render_format_is_prometheus_compatible() {
        let output = render_prometheus(&[
            D_STATUS.sample(1.0, &["available"]),
            D_LOGS.sample(2.0, &["warning"]),
        ]);
        for line in output.lines() {
            if line.starts_with('#') {
                continue;
            }
            let (series, value) = line.rsplit_once(' ').unwrap();
            assert!(series.contains('{') && series.ends_with('}'), "line: {line}");
            assert!(value.parse::<f64>().is_ok(), "line: {line}");
        }
    }
}
