//! Startup reconciliation against the issuer's full permission set.
//!
//! Bulk sync fills the gap between an empty (or stale) local store and the
//! point where the event consumers take over. Every record goes through the
//! same version-gated write as an event, so running it against a store that
//! is already current changes nothing.

use common::prelude::IdentityPermissionList;

use crate::issuer_client::{IssuerClient, IssuerError};
use crate::permissions::{ApplyOutcome, PermissionStore, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub applied: usize,
    pub stale: usize,
}

#[derive(Debug, Clone)]
pub struct BulkSync {
    client: IssuerClient,
}

impl BulkSync {
    pub fn new(client: IssuerClient) -> Self {
        Self { client }
    }

    pub async fn run(&self, store: &PermissionStore) -> Result<SyncReport, SyncError> {
        let list = self.client.identity_permissions().await?;
        let report = apply_all(store, &list).await?;
        tracing::info!(
            issuer = %self.client.base_url(),
            applied = report.applied,
            stale = report.stale,
            "bulk permission sync complete"
        );
        Ok(report)
    }

    /// [`run`](Self::run), but a failure is only logged.
    pub async fn run_or_warn(&self, store: &PermissionStore) -> Option<SyncReport> {
        match self.run(store).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(
                    issuer = %self.client.base_url(),
                    error = %e,
                    "bulk permission sync failed, continuing with local state"
                );
                None
            }
        }
    }
}

pub async fn apply_all(
    store: &PermissionStore,
    list: &IdentityPermissionList,
) -> Result<SyncReport, StoreError> {
    let mut report = SyncReport::default();
    for permission in &list.permissions {
        match store.apply_update(permission).await? {
            ApplyOutcome::Applied => report.applied += 1,
            ApplyOutcome::Stale => report.stale += 1,
        }
    }
    Ok(report)
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to fetch permissions from issuer: {0}")]
    Issuer(#[from] IssuerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
