//! Catalog lookup over the internal Amazon catalog proxy.

use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use async_trait::async_trait;

use crate::marketplace::Marketplace;
use crate::store::{TargetKind, TargetRef};

use super::{CatalogProvider, CatalogStatus, ProviderError};

/// Response shape of the catalog proxy's variation endpoint.
#[derive(Debug, Deserialize)]
struct VariationLookup {
    broken: bool,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

pub struct AmazonCatalogClient {
    client: Client,
    endpoint: String,
}

impl AmazonCatalogClient {
    /// `endpoint` is the proxy base URL, e.g. `https://catalog.internal/v1`.
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ProviderError::terminal(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    fn lookup_url(&self, target: &TargetRef, marketplace: Marketplace) -> String {
        let resource = match target.kind {
            TargetKind::VariantGroup => "groups",
            TargetKind::Asin => "asins",
        };
        format!(
            "{}/{}/{}/{}/variation",
            self.endpoint.trim_end_matches('/'),
            marketplace,
            resource,
            target.identifier
        )
    }

    fn classify_status(status: StatusCode) -> ProviderError {
        let message = format!("catalog lookup returned {status}");
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            ProviderError::transient(message).with_status(status.as_u16())
        } else if status == StatusCode::NOT_FOUND {
            ProviderError::terminal("target no longer exists in the catalog")
                .with_status(status.as_u16())
        } else if status.is_client_error() {
            // Malformed identifier, auth failure: retrying cannot help.
            ProviderError::terminal(message).with_status(status.as_u16())
        } else {
            ProviderError::transient(message).with_status(status.as_u16())
        }
    }

    fn classify_request_error(err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::transient("catalog lookup timed out")
        } else if err.is_connect() {
            ProviderError::transient(format!("connection failed: {err}"))
        } else {
            ProviderError::transient(format!("request failed: {err}"))
        }
    }
}

#[async_trait]
impl CatalogProvider for AmazonCatalogClient {
    async fn fetch_catalog_status(
        &self,
        target: &TargetRef,
        marketplace: Marketplace,
    ) -> Result<CatalogStatus, ProviderError> {
        let url = self.lookup_url(target, marketplace);
        let started = Instant::now();
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Self::classify_request_error)?;
        let latency_ms = started.elapsed().as_millis() as u64;
        let status = response.status();

        if !status.is_success() {
            return Err(Self::classify_status(status));
        }

        let lookup: VariationLookup = response.json().await.map_err(|e| {
            ProviderError::transient(format!("malformed catalog response: {e}"))
                .with_status(status.as_u16())
        })?;

        debug!(
            identifier = %target.identifier,
            %marketplace,
            broken = lookup.broken,
            latency_ms,
            "Catalog lookup finished."
        );

        Ok(CatalogStatus {
            identifier: target.identifier.clone(),
            marketplace,
            is_broken: lookup.broken,
            status_code: status.as_u16(),
            latency_ms,
            payload: lookup.detail,
        })
    }
}
