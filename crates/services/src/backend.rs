//! Wire contract with the portal backend's attempt endpoints.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use portal_core::model::{
    AttemptId, CompletionStatus, PackageId, percentage_from_backend,
};
use portal_core::reconcile::ConfirmedProgress;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::durability::BeaconTransport;
use crate::error::BackendError;

//
// ─── WIRE TYPES ────────────────────────────────────────────────────────────────
//

/// Response of `GET /scorm-packages/{id}/launch`.
///
/// Both fields are optional on the wire; the resolver decides whether the
/// grant is usable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchGrant {
    #[serde(default)]
    pub launch_url: Option<String>,
    #[serde(default)]
    pub scorm_attempt_id: Option<String>,
}

/// Body of `PATCH /attempts/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptPatch {
    pub completion_percentage: u8,
    pub status: CompletionStatus,
}

impl AttemptPatch {
    #[must_use]
    pub fn from_percentage(percentage: u8) -> Self {
        let percentage = percentage.min(100);
        Self {
            completion_percentage: percentage,
            status: CompletionStatus::from_percentage(percentage),
        }
    }
}

/// Payload of `PATCH /attempts/{id}/sync-progress`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedAttempt {
    #[serde(default)]
    pub attempt_id: Option<String>,
    #[serde(default)]
    pub scorm_package_id: Option<String>,
    #[serde(default)]
    pub completion_percentage: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

impl SyncedAttempt {
    /// Normalizes the response against the attempt the request targeted.
    ///
    /// A missing or blank `attemptId` means the attempt was not rotated.
    #[must_use]
    pub fn confirmed(&self, requested: &AttemptId) -> ConfirmedProgress {
        let percentage = percentage_from_backend(self.completion_percentage.unwrap_or(0.0));
        let attempt_id = self
            .attempt_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map_or_else(|| requested.clone(), AttemptId::new);
        ConfirmedProgress {
            attempt_id,
            percentage,
            status: CompletionStatus::from_backend(self.status.as_deref(), percentage),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

//
// ─── BACKEND ───────────────────────────────────────────────────────────────────
//

/// Remote calls the sync core depends on.
#[async_trait]
pub trait AttemptBackend: Send + Sync {
    /// Requests a launch for a content package.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the request fails.
    async fn launch(&self, package_id: &PackageId) -> Result<LaunchGrant, BackendError>;

    /// Writes progress to the attempt record.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the request fails.
    async fn update_attempt(
        &self,
        attempt_id: &AttemptId,
        patch: &AttemptPatch,
    ) -> Result<(), BackendError>;

    /// Asks the backend to re-pull authoritative progress from the runtime host.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the request fails.
    async fn sync_progress(&self, attempt_id: &AttemptId) -> Result<SyncedAttempt, BackendError>;
}

/// Bearer-authenticated JSON client for the portal backend.
#[derive(Clone)]
pub struct HttpAttemptBackend {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl HttpAttemptBackend {
    #[must_use]
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            access_token: config.access_token.clone(),
        }
    }

    /// Unload-time transport sharing this client's base URL and credentials.
    #[must_use]
    pub fn beacon(&self) -> HttpBeacon {
        HttpBeacon {
            backend: self.clone(),
            in_flight: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn ensure_success(response: Response) -> Result<Response, BackendError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(BackendError::HttpStatus(response.status()))
    }
}

#[async_trait]
impl AttemptBackend for HttpAttemptBackend {
    async fn launch(&self, package_id: &PackageId) -> Result<LaunchGrant, BackendError> {
        let response = self
            .request(
                Method::GET,
                &format!("/scorm-packages/{}/launch", package_id.as_str()),
            )
            .send()
            .await?;
        Ok(ensure_success(response)?.json().await?)
    }

    async fn update_attempt(
        &self,
        attempt_id: &AttemptId,
        patch: &AttemptPatch,
    ) -> Result<(), BackendError> {
        let response = self
            .request(Method::PATCH, &format!("/attempts/{}", attempt_id.as_str()))
            .json(patch)
            .send()
            .await?;
        ensure_success(response)?;
        Ok(())
    }

    async fn sync_progress(&self, attempt_id: &AttemptId) -> Result<SyncedAttempt, BackendError> {
        let response = self
            .request(
                Method::PATCH,
                &format!("/attempts/{}/sync-progress", attempt_id.as_str()),
            )
            .send()
            .await?;
        let body: DataEnvelope<SyncedAttempt> = ensure_success(response)?.json().await?;
        Ok(body.data)
    }
}

//
// ─── BEACON ────────────────────────────────────────────────────────────────────
//

/// Fire-and-forget `PATCH /attempts/{id}` on a detached tokio task.
///
/// The task is not owned by the player, so dropping the player does not
/// cancel it. `settle` lets a process wait briefly for outstanding writes
/// before exiting.
#[derive(Clone)]
pub struct HttpBeacon {
    backend: HttpAttemptBackend,
    in_flight: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl HttpBeacon {
    /// Waits up to `grace` for beacons still in flight.
    pub async fn settle(&self, grace: Duration) {
        let pending = match self.in_flight.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return,
        };
        let deadline = tokio::time::Instant::now() + grace;
        for task in pending {
            if tokio::time::timeout_at(deadline, task).await.is_err() {
                tracing::warn!("beacon still in flight after grace period");
                break;
            }
        }
    }
}

impl BeaconTransport for HttpBeacon {
    fn send(&self, attempt_id: &AttemptId, patch: AttemptPatch) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(attempt_id = %attempt_id, "no async runtime; unload write dropped");
            return;
        };
        let backend = self.backend.clone();
        let attempt_id = attempt_id.clone();
        let task = runtime.spawn(async move {
            if let Err(err) = backend.update_attempt(&attempt_id, &patch).await {
                tracing::warn!(attempt_id = %attempt_id, error = %err, "unload write failed");
            }
        });
        if let Ok(mut guard) = self.in_flight.lock() {
            guard.retain(|task| !task.is_finished());
            guard.push(task);
        }
    }
}
