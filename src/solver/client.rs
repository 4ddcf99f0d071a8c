//! HTTP adapter to the external alignment solver.
//!
//! The client performs no numerics. It validates requests locally where the
//! contract allows (coarse fit pair counts), ships JSON, and validates every
//! response before it becomes a domain value. All failures come back as
//! typed [`RegistrationError`]s; callers keep their prior state.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SolverConfig;
use crate::correspondence::CorrespondencePair;
use crate::error::RegistrationError;

use super::protocol::{
    point_to_wire, rotation_to_wire, ApplyRequest, AlignmentResult, CoarseFitRequest,
    CoarseFitResponse, CoarseFitResult, ModelEntry, RefineRequest, RefineResponse, SolverMetrics,
    SuggestRequest, SuggestResponse, Transform,
};

/// Per-call refine/suggest parameters forwarded to the solver.
#[derive(Debug, Clone)]
pub struct RefineParams {
    pub profile: String,
    pub device_profile: String,
    pub flow_tag: String,
}

impl RefineParams {
    pub fn from_config(config: &SolverConfig, flow_tag: impl Into<String>) -> Self {
        Self {
            profile: config.profile.clone(),
            device_profile: config.device_profile.clone(),
            flow_tag: flow_tag.into(),
        }
    }
}

pub struct AlignmentClient {
    http: reqwest::Client,
    base_url: String,
}

impl AlignmentClient {
    pub fn new(config: &SolverConfig) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_json<Resp: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Resp, RegistrationError> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| RegistrationError::Network(format!("{path}: {e}")))?;
        Self::decode(path, response).await
    }

    async fn post_json<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, RegistrationError> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| RegistrationError::Network(format!("{path}: {e}")))?;
        Self::decode(path, response).await
    }

    async fn decode<Resp: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<Resp, RegistrationError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistrationError::Network(format!(
                "{path}: solver answered {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }
        response
            .json::<Resp>()
            .await
            .map_err(|e| RegistrationError::MalformedResponse(format!("{path}: {e}")))
    }

    /// Models the solver can serve, all file kinds included.
    pub async fn list_models(&self) -> Result<Vec<ModelEntry>, RegistrationError> {
        self.get_json("models").await
    }

    /// Closed-form rigid fit over paired landmarks. Count rules are
    /// enforced here, before any network traffic: equal side lengths and
    /// at least three pairs.
    pub async fn coarse_fit(
        &self,
        source_points: &[nalgebra::Point3<f64>],
        target_points: &[nalgebra::Point3<f64>],
    ) -> Result<CoarseFitResult, RegistrationError> {
        if source_points.len() != target_points.len() {
            return Err(RegistrationError::Validation(format!(
                "side counts differ: {} source vs {} target",
                source_points.len(),
                target_points.len()
            )));
        }
        if source_points.len() < 3 {
            return Err(RegistrationError::Validation(format!(
                "coarse fit needs at least 3 pairs, have {}",
                source_points.len()
            )));
        }

        let request = CoarseFitRequest {
            source_points: source_points.iter().map(point_to_wire).collect(),
            target_points: target_points.iter().map(point_to_wire).collect(),
        };
        debug!(pairs = source_points.len(), "requesting coarse fit");
        let response: CoarseFitResponse = self.post_json("coarse-fit", &request).await?;
        response.validate()
    }

    /// [`coarse_fit`](Self::coarse_fit) over already-zipped pairs.
    pub async fn coarse_fit_pairs(
        &self,
        pairs: &[CorrespondencePair],
    ) -> Result<CoarseFitResult, RegistrationError> {
        let source: Vec<_> = pairs.iter().map(|p| p.source_point).collect();
        let target: Vec<_> = pairs.iter().map(|p| p.target_point).collect();
        self.coarse_fit(&source, &target).await
    }

    /// ICP refinement over full surfaces, seeded by `initial`.
    pub async fn refine_icp(
        &self,
        source_path: &str,
        target_path: &str,
        initial: &Transform,
        params: &RefineParams,
    ) -> Result<AlignmentResult, RegistrationError> {
        let request = RefineRequest {
            source_path: source_path.to_string(),
            target_path: target_path.to_string(),
            rotation: rotation_to_wire(&initial.rotation),
            translation: [initial.translation.x, initial.translation.y, initial.translation.z],
            profile: params.profile.clone(),
            device_profile: params.device_profile.clone(),
            flow_tag: params.flow_tag.clone(),
        };
        debug!(source = source_path, target = target_path, flow = %params.flow_tag, "requesting icp refine");
        let response: RefineResponse = self.post_json("icp-refine", &request).await?;
        response.validate()
    }

    /// Candidate correspondence pairs from the suggester.
    pub async fn suggest_points(
        &self,
        request: &SuggestRequest,
    ) -> Result<SuggestResponse, RegistrationError> {
        debug!(num_pairs = request.num_pairs, mode = %request.suggestion_mode, "requesting suggestions");
        self.post_json("suggest-points", request).await
    }

    /// Persist a committed transform. Idempotent for identical input, so a
    /// retried finish is safe.
    pub async fn apply_transform(
        &self,
        source_path: &str,
        target_path: &str,
        transform: &Transform,
        flow_tag: &str,
    ) -> Result<(), RegistrationError> {
        let request = ApplyRequest {
            source_path: source_path.to_string(),
            target_path: target_path.to_string(),
            rotation: rotation_to_wire(&transform.rotation),
            translation: [
                transform.translation.x,
                transform.translation.y,
                transform.translation.z,
            ],
            flow_tag: flow_tag.to_string(),
        };
        let _: serde_json::Value = self.post_json("apply", &request).await?;
        Ok(())
    }

    /// Aggregate pass rate / rmse for display. Best-effort: every failure
    /// is swallowed and logged, never surfaced to the operator.
    pub async fn fetch_metrics(&self) -> Option<SolverMetrics> {
        match self.get_json::<SolverMetrics>("metrics").await {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!(error = %e, "solver metrics unavailable");
                None
            }
        }
    }
}
