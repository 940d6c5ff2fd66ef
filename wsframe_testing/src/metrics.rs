//! Metric capture with `metrics_util::debugging::DebuggingRecorder`.

use metrics::{SharedString, Unit};
use metrics_util::{
    CompositeKey,
    debugging::{DebugValue, DebuggingRecorder, Snapshot},
};

type Entry = (CompositeKey, Option<Unit>, Option<SharedString>, DebugValue);

/// Run `f` with a thread-local debugging recorder and return what it
/// recorded.
///
/// Only metrics emitted on the calling thread are seen.
pub fn capture_metrics<F: FnOnce()>(f: F) -> Snapshot {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    metrics::with_local_recorder(&recorder, f);
    snapshotter.snapshot()
}

fn find<'a>(
    entries: &'a [Entry],
    name: &str,
    label: Option<(&str, &str)>,
) -> Option<&'a DebugValue> {
    entries.iter().find_map(|(key, _, _, value)| {
        let key = key.key();
        let labelled = label.is_none_or(|(k, v)| key.labels().any(|l| l.key() == k && l.value() == v));
        (key.name() == name && labelled).then_some(value)
    })
}

/// Value of counter `name`, optionally filtered by one label.
#[must_use]
pub fn counter_value(snapshot: Snapshot, name: &str, label: Option<(&str, &str)>) -> Option<u64> {
    let entries = snapshot.into_vec();
    match find(&entries, name, label) {
        Some(DebugValue::Counter(c)) => Some(*c),
        _ => None,
    }
}

/// Value of gauge `name`.
#[must_use]
pub fn gauge_value(snapshot: Snapshot, name: &str) -> Option<f64> {
    let entries = snapshot.into_vec();
    match find(&entries, name, None) {
        Some(DebugValue::Gauge(g)) => Some(g.into_inner()),
        _ => None,
    }
}
