//! The calendar artifact: merged events plus calendar-level metadata.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::identity::Identity;
use crate::model::event::PublishedEvent;

/// Calendar property holding the upstream data version an artifact was
/// generated from.
pub const DATA_VERSION_KEY: &str = "X-PCR-ICS-DB-VERSION";

/// One calendar-level `(name, value)` property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataLine {
    pub name: String,
    pub value: String,
}

impl MetadataLine {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Presentation order: `(start, end, name)` ascending, identity as the final
/// tiebreaker so the order is total.
#[must_use]
pub fn presentation_cmp(a: &PublishedEvent, b: &PublishedEvent) -> Ordering {
    a.start()
        .cmp(&b.start())
        .then_with(|| a.end().cmp(&b.end()))
        .then_with(|| a.name().cmp(b.name()))
        .then_with(|| a.identity.cmp(&b.identity))
}

/// Ordered, identity-unique collection of published events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarArtifact {
    events: BTreeMap<Identity, PublishedEvent>,
    metadata: Vec<MetadataLine>,
    /// Upstream snapshot version this artifact was generated from.
    pub data_version_marker: Option<String>,
}

impl CalendarArtifact {
    /// An artifact with no events and no metadata.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A brand-new calendar carrying the standard publishing metadata.
    #[must_use]
    pub fn fresh(name: &str, description: &str, timezone: &str) -> Self {
        let mut artifact = Self::empty();
        artifact.set_metadata("METHOD", "PUBLISH");
        artifact.set_metadata("X-WR-CALNAME", name);
        artifact.set_metadata("X-WR-CALDESC", description);
        artifact.set_metadata("X-WR-TIMEZONE", timezone);
        artifact.set_metadata("CALSCALE", "GREGORIAN");
        artifact
    }

    /// Insert or overwrite the event with the same identity, returning the
    /// replaced record.
    pub fn insert(&mut self, event: PublishedEvent) -> Option<PublishedEvent> {
        self.events.insert(event.identity, event)
    }

    #[must_use]
    pub fn get(&self, identity: &Identity) -> Option<&PublishedEvent> {
        self.events.get(identity)
    }

    #[must_use]
    pub fn contains(&self, identity: &Identity) -> bool {
        self.events.contains_key(identity)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.events.keys()
    }

    /// Events in presentation order.
    #[must_use]
    pub fn events(&self) -> Vec<&PublishedEvent> {
        let mut events: Vec<&PublishedEvent> = self.events.values().collect();
        events.sort_by(|a, b| presentation_cmp(a, b));
        events
    }

    /// Metadata sorted by property name. Lines sharing a name keep their
    /// relative order.
    #[must_use]
    pub fn metadata(&self) -> Vec<&MetadataLine> {
        let mut lines: Vec<&MetadataLine> = self.metadata.iter().collect();
        lines.sort_by(|a, b| a.name.cmp(&b.name));
        lines
    }

    #[must_use]
    pub fn metadata_value(&self, name: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|line| line.name == name)
            .map(|line| line.value.as_str())
    }

    /// Replace every line named `name` with a single line.
    pub fn set_metadata(&mut self, name: &str, value: &str) {
        self.metadata.retain(|line| line.name != name);
        self.metadata.push(MetadataLine::new(name, value));
    }

    /// Append a line, keeping any existing lines with the same name.
    pub fn push_metadata(&mut self, line: MetadataLine) {
        self.metadata.push(line);
    }

    /// Copy of this artifact's metadata and marker with no events.
    #[must_use]
    pub fn without_events(&self) -> Self {
        Self {
            events: BTreeMap::new(),
            metadata: self.metadata.clone(),
            data_version_marker: self.data_version_marker.clone(),
        }
    }
}
