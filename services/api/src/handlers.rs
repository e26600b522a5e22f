//! Axum Handlers for the REST API
//!
//! Session setup helpers: generating a case topic and listing the panel.
//! The discussion itself runs over the WebSocket in [`crate::ws`].

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    models::{CreateTopicPayload, ErrorResponse, RosterEntry, TopicResponse},
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Generate a group-interview case for a company and position.
#[utoipa::path(
    post,
    path = "/topics",
    request_body = CreateTopicPayload,
    responses(
        (status = 201, description = "Topic generated successfully", body = TopicResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_topic(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateTopicPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let company = payload.company.trim();
    let job_title = payload.job_title.trim();
    if company.is_empty() || job_title.is_empty() {
        return Err(ApiError::BadRequest(
            "company and job_title are required".to_string(),
        ));
    }

    let topic = state.case_service.generate_topic(company, job_title).await?;
    info!(%company, %job_title, "Generated topic");

    Ok((StatusCode::CREATED, Json(TopicResponse { topic })))
}

/// List the autonomous panel members.
#[utoipa::path(
    get,
    path = "/roster",
    responses(
        (status = 200, description = "Panel members", body = [RosterEntry])
    )
)]
pub async fn get_roster(State(state): State<Arc<AppState>>) -> Json<Vec<RosterEntry>> {
    Json(state.roster.members().iter().map(RosterEntry::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::collections::HashMap;

    fn mock_state() -> Arc<AppState> {
        Arc::new(AppState::from_config(Config::mock(), HashMap::new()).unwrap())
    }

    #[tokio::test]
    async fn test_create_topic_returns_created() {
        let payload = CreateTopicPayload {
            company: "星河科技".to_string(),
            job_title: "产品经理".to_string(),
        };
        let response = create_topic(State(mock_state()), Json(payload))
            .await
            .ok()
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_create_topic_rejects_blank_fields() {
        let payload = CreateTopicPayload {
            company: "  ".to_string(),
            job_title: "产品经理".to_string(),
        };
        let response = match create_topic(State(mock_state()), Json(payload)).await {
            Ok(_) => panic!("blank company should be rejected"),
            Err(err) => err.into_response(),
        };
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_roster_lists_panel() {
        let Json(roster) = get_roster(State(mock_state())).await;
        let ids: Vec<&str> = roster.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(ids, vec!["char1", "char2", "char3"]);
    }
}
