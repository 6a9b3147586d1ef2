use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    athenz::PolicyClient,
    error::Result,
    models::*,
    state::AppState,
};
use garm_authz::AccessCheckResult;

/// Largest accepted review body
const MAX_BODY_BYTES: usize = 1 << 20;

/// `POST /authn`: resolve a token to a cluster user
pub async fn authenticate(state: Arc<AppState>, request: Request) -> Result<Response> {
    let review: TokenReview = match read_json(request).await {
        Ok(review) => review,
        Err(response) => return Ok(response),
    };

    let status = match state.policy.authenticate(&review.spec.token).await {
        Ok(principal) => {
            match state
                .user_mapper
                .map_user(&principal.domain, &principal.service)
            {
                Ok(user) => TokenReviewStatus::authenticated(user),
                Err(e) => TokenReviewStatus::failed(e.to_string()),
            }
        }
        Err(e) => {
            warn!(error = %e, "Authentication failed");
            TokenReviewStatus::failed(e.to_string())
        }
    };

    Ok(Json(TokenReviewResponse {
        api_version: api_version_or(&review.api_version, AUTHENTICATION_API_VERSION),
        kind: "TokenReview".to_string(),
        status,
    })
    .into_response())
}

/// `POST /authz`: map the access review and ask the policy service
pub async fn authorize(state: Arc<AppState>, request: Request) -> Result<Response> {
    let review: SubjectAccessReview = match read_json(request).await {
        Ok(review) => review,
        Err(response) => return Ok(response),
    };

    let status = match state.resource_mapper.map_resource(&review.spec) {
        Err(e) if e.is_rejection() => {
            debug!(error = %e, "Access review rejected");
            SubjectAccessReviewStatus::denied(e.to_string())
        }
        Err(e) => SubjectAccessReviewStatus::error(e.to_string()),
        Ok(result) => {
            let credential = state.tokens.token()?;
            check_any(state.policy.as_ref(), &credential, &result).await
        }
    };

    Ok(Json(SubjectAccessReviewResponse {
        api_version: api_version_or(&review.api_version, AUTHORIZATION_API_VERSION),
        kind: "SubjectAccessReview".to_string(),
        status,
    })
    .into_response())
}

/// Run every check concurrently; the first grant wins
async fn check_any(
    policy: &dyn PolicyClient,
    credential: &str,
    result: &AccessCheckResult,
) -> SubjectAccessReviewStatus {
    let mut pending: FuturesUnordered<_> = result
        .checks
        .iter()
        .map(|check| async move {
            let granted = policy.check_access(credential, check, &result.identity).await;
            (check, granted)
        })
        .collect();

    let mut errors = Vec::new();
    while let Some((check, granted)) = pending.next().await {
        match granted {
            Ok(true) => {
                return SubjectAccessReviewStatus::allowed(format!(
                    "{} is granted {} on {}",
                    result.identity, check.action, check.resource
                ))
            }
            Ok(false) => {}
            Err(e) => errors.push(e.to_string()),
        }
    }

    if errors.is_empty() {
        SubjectAccessReviewStatus::denied(format!(
            "{} is not granted access by any of {} checks",
            result.identity,
            result.checks.len()
        ))
    } else {
        SubjectAccessReviewStatus::error(errors.join("; "))
    }
}

async fn read_json<T: DeserializeOwned>(request: Request) -> std::result::Result<T, Response> {
    let body = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()).into_response())?;
    serde_json::from_slice(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid review: {}", e)).into_response())
}
