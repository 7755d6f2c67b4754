//! Exit code and output size reporting

/// Label value used when no exit code was observed
pub const NO_EXIT_LABEL: &str = "none";

/// Receives per-invocation measurements after classification.
///
/// One-way: the probe never reads anything back.
pub trait MetricsSink: Send + Sync {
    /// Count one invocation for `name` with the given exit code
    fn record_exit(&self, name: &str, exit: Option<u32>);

    /// Record the combined output length of the last invocation
    fn record_output_len(&self, name: &str, exit: Option<u32>, len: usize);
}

/// Label value for an exit code
pub fn exit_label(exit: Option<u32>) -> String {
    exit.map_or_else(|| NO_EXIT_LABEL.to_string(), |code| code.to_string())
}

/// Sink backed by the `metrics` facade.
///
/// Emits `{kind}_exit_code` (counter) and `{kind}_output_len` (gauge), both
/// labelled with `name` and `exit`. Whatever recorder the process installed
/// decides the wire format.
#[derive(Debug, Clone)]
pub struct MetricsFacade {
    kind: String,
}

impl MetricsFacade {
    /// Sink for probes of `kind`
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }

    /// Name of the exit code counter
    pub fn exit_code_metric(&self) -> String {
        format!("{}_exit_code", self.kind)
    }

    /// Name of the output length gauge
    pub fn output_len_metric(&self) -> String {
        format!("{}_output_len", self.kind)
    }
}

impl MetricsSink for MetricsFacade {
    fn record_exit(&self, name: &str, exit: Option<u32>) {
        metrics::counter!(
            self.exit_code_metric(),
            "name" => name.to_string(),
            "exit" => exit_label(exit)
        )
        .increment(1);
    }

    fn record_output_len(&self, name: &str, exit: Option<u32>, len: usize) {
        metrics::gauge!(
            self.output_len_metric(),
            "name" => name.to_string(),
            "exit" => exit_label(exit)
        )
        .set(len as f64);
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_exit(&self, _name: &str, _exit: Option<u32>) {}

    fn record_output_len(&self, _name: &str, _exit: Option<u32>, _len: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use metrics_util::MetricKind;

    #[test]
    fn test_exit_label() {
        assert_eq!(exit_label(Some(0)), "0");
        assert_eq!(exit_label(Some(255)), "255");
        assert_eq!(exit_label(None), NO_EXIT_LABEL);
    }

    #[test]
    fn test_metric_names() {
        let sink = MetricsFacade::new("ssh");
        assert_eq!(sink.exit_code_metric(), "ssh_exit_code");
        assert_eq!(sink.output_len_metric(), "ssh_output_len");
    }

    type Captured = Vec<(MetricKind, String, Vec<(String, String)>, DebugValue)>;

    fn capture(f: impl FnOnce()) -> Captured {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        ::metrics::with_local_recorder(&recorder, f);

        let mut captured: Captured = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, value)| {
                let labels = key
                    .key()
                    .labels()
                    .map(|l| (l.key().to_string(), l.value().to_string()))
                    .collect();
                (key.kind(), key.key().name().to_string(), labels, value)
            })
            .collect();
        captured.sort_by(|a, b| a.1.cmp(&b.1));
        captured
    }

    fn labels(name: &str, exit: &str) -> Vec<(String, String)> {
        vec![
            ("name".to_string(), name.to_string()),
            ("exit".to_string(), exit.to_string()),
        ]
    }

    #[test]
    fn test_facade_records_exit_and_output_len() {
        let sink = MetricsFacade::new("ssh");
        let captured = capture(|| {
            sink.record_exit("web", Some(3));
            sink.record_exit("web", Some(3));
            sink.record_output_len("web", Some(3), 42);
        });

        assert_eq!(captured.len(), 2);

        let (kind, name, got, value) = &captured[0];
        assert_eq!(*kind, MetricKind::Counter);
        assert_eq!(name, "ssh_exit_code");
        assert_eq!(*got, labels("web", "3"));
        assert_eq!(*value, DebugValue::Counter(2));

        let (kind, name, got, value) = &captured[1];
        assert_eq!(*kind, MetricKind::Gauge);
        assert_eq!(name, "ssh_output_len");
        assert_eq!(*got, labels("web", "3"));
        match value {
            DebugValue::Gauge(len) => assert_eq!(len.into_inner(), 42.0),
            other => panic!("unexpected value: {:?}", other),
        }
    }

    #[test]
    fn test_facade_labels_missing_exit() {
        let sink = MetricsFacade::new("ssh");
        let captured = capture(|| {
            sink.record_exit("db", None);
            sink.record_output_len("db", None, 0);
        });

        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].1, "ssh_exit_code");
        assert_eq!(captured[0].2, labels("db", NO_EXIT_LABEL));
        assert_eq!(captured[1].1, "ssh_output_len");
        assert_eq!(captured[1].2, labels("db", NO_EXIT_LABEL));
    }

    #[test]
    fn test_noop_records_nothing() {
        let captured = capture(|| {
            NoopMetrics.record_exit("web", Some(0));
            NoopMetrics.record_output_len("web", Some(0), 7);
        });
        assert!(captured.is_empty());
    }
}
