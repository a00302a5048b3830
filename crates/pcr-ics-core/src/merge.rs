//! Merge/versioning engine.
//!
//! Reconciles a freshly derived candidate set against the previously
//! published calendar, keyed by [`Identity`](crate::identity::Identity).
//!
//! # Versioning rules
//!
//! - An identity seen for the first time is published with
//!   `created_at = last_modified_at = run_timestamp` and revision 0.
//! - An identity already published keeps its `created_at`. If its content
//!   `(name, start, end)` is unchanged the whole record is carried forward
//!   as-is; otherwise `last_modified_at` moves to the run timestamp and the
//!   revision goes up by exactly one.
//! - Candidates named [`SKIP_SENTINEL`](crate::model::SKIP_SENTINEL) are
//!   discarded.
//! - Identities that no candidate produced in this run are dropped.
//!
//! Several candidates resolving to the same identity in one run are each
//! compared against the *previous* artifact and the last one wins. Comparing
//! against the earlier duplicate instead would bump the revision on every
//! run and break idempotence.
//!
//! The engine performs no I/O and cannot fail: inverted intervals are
//! rejected when a [`CandidateEvent`] is constructed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::model::{CalendarArtifact, CandidateEvent, EventContent, PublishedEvent};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Per-run merge statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Identities published for the first time.
    pub created: usize,
    /// Identities whose content changed (revision bumped).
    pub updated: usize,
    /// Identities carried forward unchanged.
    pub unchanged: usize,
    /// Candidates discarded by the skip sentinel.
    pub skipped: usize,
    /// Candidates that overwrote an earlier candidate with the same identity.
    pub duplicates: usize,
    /// Previously published identities absent from this run.
    pub dropped_stale: usize,
}

/// The merged artifact plus what happened to get there.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub artifact: CalendarArtifact,
    pub report: MergeReport,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Merge `candidates` into `previous`.
///
/// Calendar metadata and the data-version marker are carried over from
/// `previous` unchanged. Candidates are expected to have passed the
/// release-window clamp already.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use pcr_ics_core::merge::merge;
/// use pcr_ics_core::model::{CalendarArtifact, CandidateEvent};
///
/// let now = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
/// let start = Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap();
/// let end = Utc.with_ymd_and_hms(2021, 1, 3, 0, 0, 0).unwrap();
/// let candidate = CandidateEvent::new("Boss", start, end, "svc/clan_battle_period/1001").unwrap();
///
/// let outcome = merge(&CalendarArtifact::empty(), [candidate], now);
/// assert_eq!(outcome.report.created, 1);
/// ```
#[must_use]
pub fn merge<I>(
    previous: &CalendarArtifact,
    candidates: I,
    run_timestamp: DateTime<Utc>,
) -> MergeOutcome
where
    I: IntoIterator<Item = CandidateEvent>,
{
    let mut artifact = previous.without_events();
    let mut report = MergeReport::default();

    for candidate in candidates {
        if candidate.is_skip() {
            report.skipped += 1;
            continue;
        }

        let identity = candidate.identity();
        let content = candidate.into_content();
        let published = match previous.get(&identity) {
            Some(prior) => reconcile(prior, content, run_timestamp),
            None => PublishedEvent::first_publication(identity, content, run_timestamp),
        };

        if artifact.insert(published).is_some() {
            report.duplicates += 1;
        }
    }

    for event in artifact.events() {
        match previous.get(&event.identity) {
            None => {
                report.created += 1;
                debug!(uid = %event.identity, name = event.name(), "new event");
            }
            Some(prior) if prior.revision == event.revision => report.unchanged += 1,
            Some(prior) => {
                report.updated += 1;
                debug!(
                    uid = %event.identity,
                    name = event.name(),
                    from = prior.revision,
                    to = event.revision,
                    "event modified"
                );
            }
        }
    }

    report.dropped_stale = previous
        .identities()
        .filter(|identity| !artifact.contains(identity))
        .inspect(|identity| debug!(uid = %identity, "dropping stale event"))
        .count();

    MergeOutcome { artifact, report }
}

/// Reconcile fresh `content` with the prior published record of the same
/// identity.
#[must_use]
pub fn reconcile(
    prior: &PublishedEvent,
    content: EventContent,
    run_timestamp: DateTime<Utc>,
) -> PublishedEvent {
    if prior.content == content {
        return prior.clone();
    }

    PublishedEvent {
        identity: prior.identity,
        content,
        created_at: prior.created_at,
        last_modified_at: run_timestamp.max(prior.created_at),
        revision: prior.revision.saturating_add(1),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
