//! Release-window clamp.
//!
//! Nothing before the server's public launch is publishable: events that
//! ended before the release instant are dropped, and events straddling it
//! start at the release instant.

use chrono::{DateTime, Utc};

use crate::model::CandidateEvent;

/// Apply the release window to one candidate.
///
/// Returns `None` when `event.end < release_instant`.
#[must_use]
pub fn clamp(event: CandidateEvent, release_instant: DateTime<Utc>) -> Option<CandidateEvent> {
    if event.end() < release_instant {
        return None;
    }
    if event.start() < release_instant {
        return Some(event.with_start(release_instant));
    }
    Some(event)
}
