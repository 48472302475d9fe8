//! Seams to the outside world.
//!
//! The engine never walks or mutates a document itself. An `ItemSource`
//! hands it the visible items, a `Styler` applies the verdicts, and an
//! optional `Reporter` receives the pass summary.

use std::sync::Arc;

use async_trait::async_trait;
use pubflag_common::{Mode, PubflagError, Result};

use crate::dedup::ReferenceRecord;
use crate::models::ContentItem;
use crate::pipeline::PassReport;

/// Supplies the content items of one pass.
#[async_trait]
pub trait ItemSource: Send + Sync {
    async fn collect_items(&self) -> anyhow::Result<Vec<ContentItem>>;
}

/// Marks or hides flagged references.
pub trait Styler: Send + Sync {
    fn apply(&self, records: &[ReferenceRecord], mode: Mode) -> anyhow::Result<()>;
}

pub trait Reporter: Send + Sync {
    fn report(&self, report: &PassReport);
}

#[derive(Clone, Default)]
pub struct Collaborators {
    pub items: Option<Arc<dyn ItemSource>>,
    pub styler: Option<Arc<dyn Styler>>,
    pub reporter: Option<Arc<dyn Reporter>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item_source(mut self, source: Arc<dyn ItemSource>) -> Self {
        self.items = Some(source);
        self
    }

    pub fn with_styler(mut self, styler: Arc<dyn Styler>) -> Self {
        self.styler = Some(styler);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Item source and styler are required; a missing one is fatal.
    pub fn validate(&self) -> Result<()> {
        if self.items.is_none() {
            return Err(PubflagError::MissingCollaborator("item source"));
        }
        if self.styler.is_none() {
            return Err(PubflagError::MissingCollaborator("styler"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("items", &self.items.is_some())
            .field("styler", &self.styler.is_some())
            .field("reporter", &self.reporter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoItems;

    #[async_trait]
    impl ItemSource for NoItems {
        async fn collect_items(&self) -> anyhow::Result<Vec<ContentItem>> {
            Ok(vec![])
        }
    }

    struct NoStyle;

    impl Styler for NoStyle {
        fn apply(&self, _records: &[ReferenceRecord], _mode: Mode) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_missing_collaborators_are_named() {
        let err = Collaborators::new().validate().unwrap_err();
        assert!(matches!(err, PubflagError::MissingCollaborator("item source")));

        let err = Collaborators::new().with_item_source(Arc::new(NoItems)).validate().unwrap_err();
        assert!(matches!(err, PubflagError::MissingCollaborator("styler")));
    }

    #[test]
    fn test_reporter_is_optional() {
        let collaborators = Collaborators::new()
            .with_item_source(Arc::new(NoItems))
            .with_styler(Arc::new(NoStyle));
        assert!(collaborators.validate().is_ok());
    }
}
