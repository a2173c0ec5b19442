//! Catalog lookup client: one attempt per call, no retry logic of its own.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::marketplace::Marketplace;
use crate::store::TargetRef;

pub mod amazon;

pub use amazon::AmazonCatalogClient;

/// Whether a failed lookup is worth retrying. This classification is the sole
/// input the retry executor uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FailureKind {
    Transient,
    Terminal,
}

#[derive(Error, Debug, Clone)]
#[error("provider error ({kind:?}): {message}")]
pub struct ProviderError {
    pub kind: FailureKind,
    pub message: String,
    /// HTTP status of the provider response, when one was received.
    pub status: Option<u16>,
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
            status: None,
        }
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Terminal,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

/// Outcome of one successful catalog lookup.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStatus {
    pub identifier: String,
    pub marketplace: Marketplace,
    /// True when the variation relationship is broken (group has lost its
    /// parent, or an ASIN is detached from its group).
    pub is_broken: bool,
    pub status_code: u16,
    pub latency_ms: u64,
    pub payload: Option<serde_json::Value>,
}

#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Looks up the variation state of one target in one marketplace.
    /// Exactly one request; a fixed timeout is enforced by the implementation.
    async fn fetch_catalog_status(
        &self,
        target: &TargetRef,
        marketplace: Marketplace,
    ) -> Result<CatalogStatus, ProviderError>;
}
