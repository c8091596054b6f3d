//! Content change events and the URL collection seam.
//!
//! The original hook-per-event wiring is modeled as a closed set of typed
//! events. Deciding *which* URLs a change invalidates is a content-graph walk
//! owned by the embedding application; it implements [`UrlCollector`] and the
//! scheduler consumes whatever set it produces.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::urls::UrlSet;

/// A content change that may invalidate cached pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentEvent {
    /// A post or page became publicly visible.
    PostPublished { post_id: u64 },
    /// An already-published post or page was edited.
    PostUpdated { post_id: u64 },
    /// A post or page was permanently deleted.
    PostDeleted { post_id: u64 },
    /// A post or page was moved to the trash.
    PostTrashed { post_id: u64 },
    /// A trashed post or page was published again.
    PostRestored { post_id: u64 },
    /// A category or tag was renamed or re-slugged.
    TermChanged { term_id: u64 },
    /// A category or tag was deleted.
    TermDeleted { term_id: u64 },
    /// A comment on a post was approved, edited, unapproved, or deleted.
    CommentChanged { post_id: u64 },
}

impl ContentEvent {
    /// Short name for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            ContentEvent::PostPublished { .. } => "post_published",
            ContentEvent::PostUpdated { .. } => "post_updated",
            ContentEvent::PostDeleted { .. } => "post_deleted",
            ContentEvent::PostTrashed { .. } => "post_trashed",
            ContentEvent::PostRestored { .. } => "post_restored",
            ContentEvent::TermChanged { .. } => "term_changed",
            ContentEvent::TermDeleted { .. } => "term_deleted",
            ContentEvent::CommentChanged { .. } => "comment_changed",
        }
    }
}

/// Produces the deduplicated set of absolute URLs affected by an event.
///
/// Implemented by the embedding application against its content store. An
/// empty set is a valid answer and results in no dispatched work.
#[async_trait]
pub trait UrlCollector: Send + Sync {
    async fn collect(&self, event: &ContentEvent) -> Result<UrlSet>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tag() {
        let event = ContentEvent::TermChanged { term_id: 7 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"term_changed""#));
        let back: ContentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
