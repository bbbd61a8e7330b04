//! Stage (b): split a batch into the accepted set and already-seen
//! duplicates, against the dedupe registry spanning both the accepted
//! and quarantined tables.

use std::collections::HashSet;

use super::validate::QuarantinedInput;
use ew_protocol::telemetry::TelemetryPointInput;

pub struct Deduped {
    pub accepted: Vec<TelemetryPointInput>,
    pub quarantined: Vec<QuarantinedInput>,
    pub duplicates: usize,
}

pub fn partition(
    accepted: Vec<TelemetryPointInput>,
    quarantined: Vec<QuarantinedInput>,
    already_seen: &[String],
) -> Deduped {
    let seen: HashSet<&str> = already_seen.iter().map(String::as_str).collect();
    let mut duplicates = 0;

    let accepted = accepted
        .into_iter()
        .filter(|p| {
            if seen.contains(p.message_id.as_str()) {
                duplicates += 1;
                false
            } else {
                true
            }
        })
        .collect();

    let quarantined = quarantined
        .into_iter()
        .filter(|q| {
            if seen.contains(q.point.message_id.as_str()) {
                duplicates += 1;
                false
            } else {
                true
            }
        })
        .collect();

    Deduped { accepted, quarantined, duplicates }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn point(id: &str) -> TelemetryPointInput {
        TelemetryPointInput { message_id: id.to_string(), ts: Utc::now(), metrics: BTreeMap::new() }
    }

    #[test]
    fn duplicates_are_filtered_and_counted() {
        let accepted = vec![point("a"), point("b")];
        let deduped = partition(accepted, vec![], &["a".to_string()]);
        assert_eq!(deduped.accepted.len(), 1);
        assert_eq!(deduped.accepted[0].message_id, "b");
        assert_eq!(deduped.duplicates, 1);
    }

    #[test]
    fn no_duplicates_passes_everything_through() {
        let accepted = vec![point("a"), point("b")];
        let deduped = partition(accepted, vec![], &[]);
        assert_eq!(deduped.accepted.len(), 2);
        assert_eq!(deduped.duplicates, 0);
    }
}
