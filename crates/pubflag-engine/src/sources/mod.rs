//! Identifier-conversion service clients.

pub mod idconv;

use async_trait::async_trait;
use pubflag_common::Result;
use serde::{Deserialize, Serialize};

use crate::identifiers::{IdKind, Identifier};

/// Common interface for identifier lookup services.
///
/// One call converts one batch of identifiers of a single kind. Errors are
/// returned as-is; the resolver decides how to degrade.
#[async_trait]
pub trait IdConverter: Send + Sync {
    async fn convert(&self, kind: IdKind, ids: &[String]) -> Result<Vec<IdRecord>>;
}

/// One record returned by the lookup service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRecord {
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
    pub doi: Option<String>,
    pub journal: Option<String>,
    /// Legacy records nest identifiers under `versions`
    #[serde(default)]
    pub versions: Vec<IdRecordVersion>,
    pub status: Option<String>,
    pub errmsg: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRecordVersion {
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
    pub doi: Option<String>,
}

impl IdRecord {
    fn top_level(&self, kind: IdKind) -> Option<&str> {
        match kind {
            IdKind::Doi   => self.doi.as_deref(),
            IdKind::Pmid  => self.pmid.as_deref(),
            IdKind::Pmcid => self.pmcid.as_deref(),
        }
    }

    fn first_version(&self, kind: IdKind) -> Option<&str> {
        let version = self.versions.first()?;
        match kind {
            IdKind::Doi   => version.doi.as_deref(),
            IdKind::Pmid  => version.pmid.as_deref(),
            IdKind::Pmcid => version.pmcid.as_deref(),
        }
    }

    /// Identifier of `kind` carried by this record, top-level first, then `versions[0]`.
    pub fn identifier(&self, kind: IdKind) -> Option<Identifier> {
        self.top_level(kind)
            .and_then(|raw| Identifier::parse(kind, raw))
            .or_else(|| self.first_version(kind).and_then(|raw| Identifier::parse(kind, raw)))
    }

    /// True when this record answers the query for `id`.
    ///
    /// Both locations are checked; the record may carry the queried value in
    /// one place and a different one in the other.
    pub fn answers(&self, id: &Identifier) -> bool {
        let kind = id.kind();
        [self.top_level(kind), self.first_version(kind)]
            .into_iter()
            .flatten()
            .filter_map(|raw| Identifier::parse(kind, raw))
            .any(|candidate| &candidate == id)
    }

    /// The record's resolved DOI, if it has one.
    pub fn resolved_doi(&self) -> Option<Identifier> {
        self.identifier(IdKind::Doi)
    }

    /// NCBI marks unknown identifiers with `status = "error"`.
    pub fn is_error(&self) -> bool {
        self.status.as_deref() == Some("error")
    }
}
