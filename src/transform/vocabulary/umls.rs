//! UMLS Terminology Services search client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{Concept, TermQuery, TerminologyService};
use crate::config::EnrichmentCredential;
use crate::error::{LookupError, Result, TransformError};

/// `ui` returned when a search has no result
const NO_RESULT: &str = "NONE";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: SearchResults,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchHit {
    ui: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    root_source: Option<String>,
}

impl SearchResponse {
    fn into_concept(self) -> Option<Concept> {
        self.result
            .results
            .into_iter()
            .find(|hit| hit.ui != NO_RESULT)
            .map(|hit| Concept {
                cui: hit.ui,
                name: hit.name,
                source: hit.root_source.unwrap_or_default(),
            })
    }
}

/// Exact-match concept search against the UTS REST API
pub struct UmlsClient {
    client: reqwest::Client,
    endpoint: String,
    credential: EnrichmentCredential,
}

impl UmlsClient {
    pub fn new(endpoint: &str, credential: &EnrichmentCredential, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("clinic-silver/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| TransformError::Configuration(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credential: credential.clone(),
        })
    }

    fn search_params<'a>(&'a self, query: &'a TermQuery) -> Vec<(&'static str, &'a str)> {
        let mut params = vec![
            ("string", query.term.as_str()),
            ("apiKey", self.credential.secret()),
            ("searchType", "exact"),
        ];
        if let Some(system) = query.code_system {
            params.push(("inputType", "sourceUi"));
            params.push(("sabs", system));
        }
        params
    }
}

#[async_trait]
impl TerminologyService for UmlsClient {
    fn name(&self) -> &str {
        "umls"
    }

    async fn resolve(&self, query: &TermQuery) -> std::result::Result<Option<Concept>, LookupError> {
        let response = self
            .client
            .get(format!("{}/search/current", self.endpoint))
            .query(&self.search_params(query))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(LookupError::Unavailable(format!("UTS refused credential ({status})")));
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(LookupError::Unavailable(format!("UTS returned {status}")));
        }

        let body: SearchResponse = response.error_for_status()?.json().await?;
        Ok(body.into_concept())
    }
}
