//! pubflag-engine — citation classification and resolution.
//! Covers:
//! - Identifier extraction (DOI / PMID / PMCID) from links and text
//! - Persistent identifier cache and per-pass item cache
//! - Batched, rate-limited identifier resolution
//! - Rule-ordered content classification
//! - Reference deduplication
//! - Pass orchestration and debounced re-runs

pub mod cache;
pub mod classifier;
pub mod collaborators;
pub mod dedup;
pub mod identifiers;
pub mod matcher;
pub mod models;
pub mod pipeline;
pub mod resolver;
pub mod scheduler;
pub mod sources;

pub use cache::CacheManager;
pub use classifier::{Classifier, ClassifyContext, ItemSignals};
pub use collaborators::{Collaborators, ItemSource, Reporter, Styler};
pub use dedup::{Deduplicator, ReferenceRecord};
pub use identifiers::{IdKind, Identifier};
pub use matcher::TargetMatcher;
pub use models::{ClassificationResult, ContentItem, ItemKey, RuleSource};
pub use pipeline::{Engine, PassProgress, PassReport};
pub use resolver::{ExternalResolver, ResolverStats};
pub use scheduler::{PassOutcome, PassScheduler, PassTrigger};
pub use sources::idconv::NcbiIdConverter;
pub use sources::{IdConverter, IdRecord, IdRecordVersion};
