//! NCBI PMC ID Converter client.
//!
//! Endpoint: https://www.ncbi.nlm.nih.gov/pmc/utils/idconv/v1.0/
//!   ids    — comma-joined identifiers (at most 200)
//!   idtype — doi | pmid | pmcid
//!   format — json
//!   tool / email — caller identification requested by NCBI

use async_trait::async_trait;
use pubflag_common::sandbox::SandboxClient as Client;
use pubflag_common::{PubflagError, ResolutionConfig, Result};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::identifiers::IdKind;
use super::{IdConverter, IdRecord, IdRecordVersion};

pub struct NcbiIdConverter {
    client: Client,
    endpoint: String,
    tool: String,
    email: Option<String>,
}

impl NcbiIdConverter {
    pub fn new(config: &ResolutionConfig) -> Result<Self> {
        let mut client = Client::new(config.request_timeout())?;
        client.allow_url_host(&config.endpoint)?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            tool: config.tool.clone(),
            email: config.email.clone(),
        })
    }

    fn params(&self, kind: IdKind, ids: &[String]) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("ids", ids.join(",")),
            ("idtype", kind.as_str().to_string()),
            ("format", "json".to_string()),
            ("tool", self.tool.clone()),
        ];
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }
        params
    }
}

#[async_trait]
impl IdConverter for NcbiIdConverter {
    #[instrument(skip(self, ids), fields(n = ids.len()))]
    async fn convert(&self, kind: IdKind, ids: &[String]) -> Result<Vec<IdRecord>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let resp = self.client
            .get(&self.endpoint)?
            .query(&self.params(kind, ids))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PubflagError::Lookup(format!("idconv returned HTTP {status}")));
        }

        let body = resp.text().await?;
        let json: Value = serde_json::from_str(&body)?;
        let records = parse_idconv_json(&json)?;
        debug!(kind = kind.as_str(), n = records.len(), "idconv returned records");
        Ok(records)
    }
}

/// Decode an idconv JSON body into records.
///
/// A body without a `records` array is a service-level error
/// (`{"status": "error", "message": ...}`).
pub fn parse_idconv_json(json: &Value) -> Result<Vec<IdRecord>> {
    let Some(records) = json["records"].as_array() else {
        let message = json["message"].as_str().unwrap_or("response has no records");
        return Err(PubflagError::Lookup(message.to_string()));
    };

    Ok(records.iter().map(record_from_json).collect())
}

fn record_from_json(r: &Value) -> IdRecord {
    let versions = r["versions"]
        .as_array()
        .map(|versions| {
            versions
                .iter()
                .map(|v| IdRecordVersion {
                    pmid: scalar(&v["pmid"]),
                    pmcid: scalar(&v["pmcid"]),
                    doi: scalar(&v["doi"]),
                })
                .collect()
        })
        .unwrap_or_default();

    IdRecord {
        pmid: scalar(&r["pmid"]),
        pmcid: scalar(&r["pmcid"]),
        doi: scalar(&r["doi"]),
        journal: scalar(&r["journal"]).or_else(|| scalar(&r["journal-title"])),
        versions,
        status: scalar(&r["status"]),
        errmsg: scalar(&r["errmsg"]),
    }
}

/// PMIDs arrive as strings or bare numbers depending on the record age.
fn scalar(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
