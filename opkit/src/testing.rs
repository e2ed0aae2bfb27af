//! Helpers for controller integration tests.
//!
//! - [`first_found_binary_dir`]: locate versioned test binaries (for example a
//!   local API server bundle) under an assets directory.
//! - [`MetricSnapshot`]: flatten a Prometheus registry into a map so tests
//!   can assert on expected metric values.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use prometheus::proto::{MetricFamily, MetricType};
use prometheus::Registry;

/// First sub-directory of `base` in lexicographic order.
///
/// Returns `None` if `base` does not exist or has no sub-directories.
pub fn first_found_binary_dir(base: impl AsRef<Path>) -> io::Result<Option<PathBuf>> {
    let base = base.as_ref();
    let entries = match fs::read_dir(base) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs.into_iter().next())
}

/// Flat view of the metric series in a Prometheus registry.
///
/// Keys are written the way text exposition shows them, e.g.
/// `opkit_reconcile_total{result="error"}`. Histograms and summaries expand
/// into their `_bucket`, `_count` and `_sum` series.
#[derive(Debug, Clone, Default)]
pub struct MetricSnapshot {
    series: BTreeMap<String, f64>,
}

impl MetricSnapshot {
    /// Snapshot everything currently registered in `registry`.
    pub fn gather(registry: &Registry) -> Self {
        Self::from_families(&registry.gather())
    }

    pub fn from_families(families: &[MetricFamily]) -> Self {
        let mut series = BTreeMap::new();
        for family in families {
            let name = family.get_name();
            for metric in family.get_metric() {
                let labels: Vec<(&str, String)> = metric
                    .get_label()
                    .iter()
                    .map(|l| (l.get_name(), l.get_value().to_string()))
                    .collect();

                match family.get_field_type() {
                    MetricType::COUNTER => {
                        let value = metric.get_counter().get_value();
                        series.insert(series_key(name, &labels), value);
                    }
                    MetricType::GAUGE => {
                        let value = metric.get_gauge().get_value();
                        series.insert(series_key(name, &labels), value);
                    }
                    MetricType::UNTYPED => {
                        let value = metric.get_untyped().get_value();
                        series.insert(series_key(name, &labels), value);
                    }
                    MetricType::HISTOGRAM => {
                        let histogram = metric.get_histogram();
                        for bucket in histogram.get_bucket() {
                            let mut with_le = labels.clone();
                            with_le.push(("le", format_bound(bucket.get_upper_bound())));
                            series.insert(
                                series_key(&format!("{}_bucket", name), &with_le),
                                bucket.get_cumulative_count() as f64,
                            );
                        }
                        let mut with_le = labels.clone();
                        with_le.push(("le", "+Inf".to_string()));
                        series.insert(
                            series_key(&format!("{}_bucket", name), &with_le),
                            histogram.get_sample_count() as f64,
                        );
                        series.insert(
                            series_key(&format!("{}_count", name), &labels),
                            histogram.get_sample_count() as f64,
                        );
                        series.insert(
                            series_key(&format!("{}_sum", name), &labels),
                            histogram.get_sample_sum(),
                        );
                    }
                    MetricType::SUMMARY => {
                        let summary = metric.get_summary();
                        series.insert(
                            series_key(&format!("{}_count", name), &labels),
                            summary.get_sample_count() as f64,
                        );
                        series.insert(
                            series_key(&format!("{}_sum", name), &labels),
                            summary.get_sample_sum(),
                        );
                    }
                }
            }
        }
        Self { series }
    }

    pub fn get(&self, series: &str) -> Option<f64> {
        self.series.get(series).copied()
    }

    /// Add or replace one series; used to build expected snapshots.
    pub fn with(mut self, series: impl Into<String>, value: f64) -> Self {
        self.series.insert(series.into(), value);
        self
    }

    /// Keep only the series whose metric name starts with `prefix`.
    pub fn filter_prefix(&self, prefix: &str) -> Self {
        let series = self
            .series
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), *value))
            .collect();
        Self { series }
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Series whose value differs between `self` (expected) and `actual`,
    /// as `(series, expected, actual)`. Missing series are reported as `None`.
    /// Values are compared bit for bit, so a `NaN` series matches itself.
    pub fn diff(&self, actual: &MetricSnapshot) -> Vec<(String, Option<f64>, Option<f64>)> {
        let mut keys: Vec<&String> = self.series.keys().chain(actual.series.keys()).collect();
        keys.sort();
        keys.dedup();

        keys.into_iter()
            .filter_map(|key| {
                let expected = self.get(key);
                let got = actual.get(key);
                let same = expected.map(f64::to_bits) == got.map(f64::to_bits);
                (!same).then(|| (key.clone(), expected, got))
            })
            .collect()
    }

    /// Fail with a readable message listing every mismatching series.
    pub fn assert_matches(&self, actual: &MetricSnapshot) -> Result<()> {
        let diff = self.diff(actual);
        if diff.is_empty() {
            return Ok(());
        }
        let lines: Vec<String> = diff
            .iter()
            .map(|(series, expected, got)| {
                format!("  {}: expected {:?}, got {:?}", series, expected, got)
            })
            .collect();
        bail!("metric snapshot mismatch:\n{}", lines.join("\n"))
    }
}

impl PartialEq for MetricSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.diff(other).is_empty()
    }
}

fn series_key(name: &str, labels: &[(&str, String)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let labels: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v))
        .collect();
    format!("{}{{{}}}", name, labels.join(","))
}

fn format_bound(bound: f64) -> String {
    if bound == f64::INFINITY {
        "+Inf".to_string()
    } else {
        bound.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{CounterVec, Gauge, HistogramOpts, HistogramVec, Opts};
    use tempfile::TempDir;

    fn registry() -> (Registry, CounterVec, Gauge, HistogramVec) {
        let registry = Registry::new();
        let passes = CounterVec::new(
            Opts::new("reconcile_total", "Total reconcile passes"),
            &["result"],
        )
        .unwrap();
        registry.register(Box::new(passes.clone())).unwrap();
        let depth = Gauge::new("workqueue_depth", "Pending passes").unwrap();
        registry.register(Box::new(depth.clone())).unwrap();
        let duration = HistogramVec::new(
            HistogramOpts::new("reconcile_duration_seconds", "Pass duration")
                .buckets(vec![0.1, 1.0]),
            &["result"],
        )
        .unwrap();
        registry.register(Box::new(duration.clone())).unwrap();
        (registry, passes, depth, duration)
    }

    #[test]
    fn test_gather_counters_and_gauges() {
        let (registry, passes, depth, _) = registry();
        passes.with_label_values(&["success"]).inc_by(12.0);
        passes.with_label_values(&["error"]).inc_by(3.0);
        depth.set(2.0);

        let snapshot = MetricSnapshot::gather(&registry);
        assert_eq!(snapshot.get(r#"reconcile_total{result="error"}"#), Some(3.0));
        assert_eq!(snapshot.get(r#"reconcile_total{result="success"}"#), Some(12.0));
        assert_eq!(snapshot.get("workqueue_depth"), Some(2.0));
    }

    #[test]
    fn test_gather_histogram_series() {
        let (registry, _, _, duration) = registry();
        duration.with_label_values(&["success"]).observe(0.0625);
        duration.with_label_values(&["success"]).observe(0.5);

        let snapshot = MetricSnapshot::gather(&registry).filter_prefix("reconcile_duration");
        assert_eq!(
            snapshot.get(r#"reconcile_duration_seconds_bucket{result="success",le="0.1"}"#),
            Some(1.0)
        );
        assert_eq!(
            snapshot.get(r#"reconcile_duration_seconds_bucket{result="success",le="+Inf"}"#),
            Some(2.0)
        );
        assert_eq!(
            snapshot.get(r#"reconcile_duration_seconds_count{result="success"}"#),
            Some(2.0)
        );
        assert_eq!(
            snapshot.get(r#"reconcile_duration_seconds_sum{result="success"}"#),
            Some(0.5625)
        );
    }

    #[test]
    fn test_diff_and_assert() {
        let (registry, passes, _, _) = registry();
        passes.with_label_values(&["success"]).inc_by(3.0);
        passes.with_label_values(&["requeue"]).inc();
        let actual = MetricSnapshot::gather(&registry).filter_prefix("reconcile_total");

        let expected = MetricSnapshot::default()
            .with(r#"reconcile_total{result="success"}"#, 2.0)
            .with(r#"reconcile_total{result="error"}"#, 1.0);

        assert_eq!(
            expected.diff(&actual),
            vec![
                (r#"reconcile_total{result="error"}"#.to_string(), Some(1.0), None),
                (r#"reconcile_total{result="requeue"}"#.to_string(), None, Some(1.0)),
                (r#"reconcile_total{result="success"}"#.to_string(), Some(2.0), Some(3.0)),
            ]
        );
        assert!(actual.assert_matches(&actual.clone()).is_ok());
        let err = expected.assert_matches(&actual).unwrap_err();
        assert!(err.to_string().contains("expected Some(2.0), got Some(3.0)"));
    }

    #[test]
    fn test_nan_series_matches_itself() {
        let snapshot = MetricSnapshot::default().with("ratio", f64::NAN);
        assert!(snapshot.diff(&snapshot.clone()).is_empty());
        assert!(snapshot.assert_matches(&snapshot.clone()).is_ok());
        assert_eq!(snapshot, snapshot.clone());
    }

    #[test]
    fn test_first_found_binary_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(first_found_binary_dir(dir.path()).unwrap(), None);
        assert_eq!(
            first_found_binary_dir(dir.path().join("missing")).unwrap(),
            None
        );

        fs::write(dir.path().join("README"), "not a dir").unwrap();
        fs::create_dir(dir.path().join("1.31.0-linux-amd64")).unwrap();
        fs::create_dir(dir.path().join("1.29.3-linux-amd64")).unwrap();

        assert_eq!(
            first_found_binary_dir(dir.path()).unwrap(),
            Some(dir.path().join("1.29.3-linux-amd64"))
        );
    }
}
