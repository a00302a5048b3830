//! Candidate and published calendar events.

use chrono::{DateTime, Utc};

use crate::identity::{self, Identity};

/// Adapter name that marks a row as "not a real event".
pub const SKIP_SENTINEL: &str = "skip";

/// The observable content of an event. Change detection compares exactly
/// these three fields and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventContent {
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Rejected candidate whose interval is inverted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event '{name}' ends before it starts ({start} > {end})")]
pub struct InvertedInterval {
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// An event derived from the current snapshot, not yet reconciled with the
/// previously published calendar.
///
/// Construction enforces `start <= end` and stores the name with line
/// breaks normalized to `\n`, the only form a published calendar keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEvent {
    content: EventContent,
    identity_key: String,
}

impl CandidateEvent {
    /// # Errors
    ///
    /// Returns [`InvertedInterval`] when `start > end`.
    pub fn new(
        name: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        identity_key: impl Into<String>,
    ) -> Result<Self, InvertedInterval> {
        let name = normalize_line_breaks(name.into());
        if start > end {
            return Err(InvertedInterval { name, start, end });
        }
        Ok(Self {
            content: EventContent { name, start, end },
            identity_key: identity_key.into(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.content.name
    }

    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.content.start
    }

    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.content.end
    }

    #[must_use]
    pub fn identity_key(&self) -> &str {
        &self.identity_key
    }

    #[must_use]
    pub const fn content(&self) -> &EventContent {
        &self.content
    }

    #[must_use]
    pub fn identity(&self) -> Identity {
        identity::resolve(&self.identity_key)
    }

    /// True when the adapter flagged this row for discarding.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        self.content.name == SKIP_SENTINEL
    }

    /// Move the start forward to `start`. Callers guarantee `start <= end`.
    pub(crate) fn with_start(mut self, start: DateTime<Utc>) -> Self {
        debug_assert!(start <= self.content.end);
        self.content.start = start;
        self
    }

    #[must_use]
    pub fn into_content(self) -> EventContent {
        self.content
    }
}

/// `\r\n` and lone `\r` become `\n`.
fn normalize_line_breaks(name: String) -> String {
    if name.contains('\r') {
        name.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        name
    }
}

/// The durable, versioned record of an event in a calendar artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEvent {
    pub identity: Identity,
    pub content: EventContent,
    /// Set at first publication and never changed afterwards.
    pub created_at: DateTime<Utc>,
    /// Advanced only when `content` changes.
    pub last_modified_at: DateTime<Utc>,
    /// 0 at first publication, +1 per content change.
    pub revision: u32,
}

impl PublishedEvent {
    /// A record for an identity appearing for the first time.
    #[must_use]
    pub const fn first_publication(
        identity: Identity,
        content: EventContent,
        run_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            identity,
            content,
            created_at: run_timestamp,
            last_modified_at: run_timestamp,
            revision: 0,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.content.name
    }

    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.content.start
    }

    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.content.end
    }
}
