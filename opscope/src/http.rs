//! Minimal HTTP configuration endpoint.
//!
//! `GET /config` returns the current effective top-level options as JSON.
//! `POST /config` accepts a full replacement document: it is validated
//! first and swapped in (raising the change notification) only when valid;
//! an invalid document leaves the prior configuration untouched and
//! returns a client error listing every validation failure.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::config::{ConfigDocument, ConfigEngine, ConfigSource, EffectiveConfig};
use crate::error::TelemetryError;

/// Error body returned for an invalid posted document.
#[derive(Debug, Serialize)]
pub struct ValidationErrorBody {
    /// Human-readable validation failures
    pub errors: Vec<String>,
}

/// Build the configuration router.
pub fn config_router(engine: Arc<ConfigEngine>) -> Router {
    Router::new()
        .route("/config", get(get_config).post(post_config))
        .with_state(engine)
}

async fn get_config(State(engine): State<Arc<ConfigEngine>>) -> Json<EffectiveConfig> {
    Json(engine.effective(None, None, None))
}

async fn post_config(
    State(engine): State<Arc<ConfigEngine>>,
    Json(doc): Json<ConfigDocument>,
) -> Result<StatusCode, (StatusCode, Json<ValidationErrorBody>)> {
    match engine.apply_document(&doc, ConfigSource::Runtime) {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(TelemetryError::Validation(errors)) => Err((
            StatusCode::BAD_REQUEST,
            Json(ValidationErrorBody {
                errors: errors.iter().map(ToString::to_string).collect(),
            }),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ValidationErrorBody {
                errors: vec![e.to_string()],
            }),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperationConfig;

    #[tokio::test]
    async fn test_get_returns_effective_options() {
        let engine = Arc::new(ConfigEngine::new());
        engine
            .set_global(
                OperationConfig::new().with_sampling_rate(0.5),
                ConfigSource::Code,
            )
            .unwrap();

        let Json(effective) = get_config(State(Arc::clone(&engine))).await;
        assert!((effective.sampling_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_post_valid_document_swaps_and_notifies() {
        let engine = Arc::new(ConfigEngine::new());
        let rx = engine.subscribe();
        let generation_before = *rx.borrow();

        let mut doc = ConfigDocument::default();
        doc.global = Some(OperationConfig::new().with_sampling_rate(0.25));

        let status = post_config(State(Arc::clone(&engine)), Json(doc))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(*rx.borrow() > generation_before);

        let effective = engine.effective(None, None, None);
        assert!((effective.sampling_rate - 0.25).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_post_invalid_document_leaves_prior_untouched() {
        let engine = Arc::new(ConfigEngine::new());
        let mut valid = ConfigDocument::default();
        valid.global = Some(OperationConfig::new().with_sampling_rate(0.5));
        post_config(State(Arc::clone(&engine)), Json(valid))
            .await
            .unwrap();

        let rx = engine.subscribe();
        let generation_before = *rx.borrow();

        let mut invalid = ConfigDocument::default();
        invalid.global = Some(OperationConfig::new().with_sampling_rate(1.5));

        let (status, Json(body)) = post_config(State(Arc::clone(&engine)), Json(invalid))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.errors.len(), 1);
        // No swap, no notification.
        assert_eq!(*rx.borrow(), generation_before);
        let effective = engine.effective(None, None, None);
        assert!((effective.sampling_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_router_builds() {
        let engine = Arc::new(ConfigEngine::new());
        let _router = config_router(engine);
    }
}
