use std::collections::HashSet;

use chrono::{DateTime, FixedOffset};

use crate::model::Event;

/// A per-subscription event filter. All present criteria are conjunctive;
/// an empty filter accepts everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Exact trace id match.
    pub trace_id: Option<String>,
    /// Span kinds to accept. Applies only to spans; trace envelopes are
    /// passed through so viewers keep their workflow context.
    pub kinds: Option<HashSet<String>>,
    /// Minimum span start time. Applies only to spans that carry a
    /// `started_at`; spans without one pass through.
    pub since: Option<DateTime<FixedOffset>>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(trace_id) = &self.trace_id {
            if event.trace_id() != trace_id {
                return false;
            }
        }

        if let Some(kinds) = &self.kinds {
            if event.is_span() {
                match event.kind() {
                    Some(kind) if kinds.contains(kind) => {}
                    _ => return false,
                }
            }
        }

        if let Some(since) = &self.since {
            if event.is_span() {
                if let Some(started_at) = event.started_at() {
                    match DateTime::parse_from_rfc3339(started_at) {
                        Ok(started) if started >= *since => {}
                        _ => return false,
                    }
                }
            }
        }

        true
    }
}
