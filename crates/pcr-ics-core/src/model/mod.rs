pub mod calendar;
pub mod event;

pub use calendar::{CalendarArtifact, DATA_VERSION_KEY, MetadataLine, presentation_cmp};
pub use event::{CandidateEvent, EventContent, InvertedInterval, PublishedEvent, SKIP_SENTINEL};
