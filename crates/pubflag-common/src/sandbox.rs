use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;
use crate::error::PubflagError;

const USER_AGENT: &str = concat!("pubflag/", env!("CARGO_PKG_VERSION"));

/// An HTTP client that only talks to approved hosts.
///
/// The engine never fetches article pages; the only outbound traffic is the
/// identifier-conversion service, so the default allowlist is just NCBI.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a client with the default NCBI allowlist.
    pub fn new(timeout: Duration) -> Result<Self, PubflagError> {
        let mut allowlist = HashSet::new();
        let domains = vec![
            "www.ncbi.nlm.nih.gov", // PMC idconv
            "pmc.ncbi.nlm.nih.gov", // PMC (new host)
        ];

        for d in domains {
            allowlist.insert(d.to_string());
        }

        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Allows the host of `url`, used when the lookup endpoint is overridden.
    pub fn allow_url_host(&mut self, url: &str) -> Result<(), PubflagError> {
        let parsed = Url::parse(url)
            .map_err(|e| PubflagError::Config(format!("invalid endpoint {url}: {e}")))?;
        match parsed.host_str() {
            Some(host) => {
                self.allow_domain(host);
                Ok(())
            }
            None => Err(PubflagError::Config(format!("endpoint has no host: {url}"))),
        }
    }

    /// Validates if a URL is permitted under the current policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                return self
                    .allowlist
                    .iter()
                    .any(|allowed| host == allowed || host.ends_with(&format!(".{}", allowed)));
            }
        }
        false
    }

    /// GET request builder for an allowed URL.
    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, PubflagError> {
        if !self.is_allowed(url) {
            tracing::warn!(%url, "Blocked request outside the allowlist");
            return Err(PubflagError::Security(format!(
                "domain not in allowlist for URL {}",
                url
            )));
        }

        Ok(self.client.get(url))
    }
}
