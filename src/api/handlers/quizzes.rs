//! Quiz content (read-only) and per-account quiz results.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::{auth::Principal, ApiError};
use crate::store::{DynStore, NewQuizResult, Quiz, QuizResult};

#[derive(Debug, Serialize, ToSchema)]
pub struct QuizListResponse {
    pub tests: Vec<Quiz>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuizResponse {
    pub test: Quiz,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SubmitResultRequest {
    pub test_slug: String,
    pub test_name: String,
    #[serde(default)]
    pub score: i32,
    pub result_text: String,
    #[serde(default = "empty_answers")]
    #[schema(value_type = Object)]
    pub answers: serde_json::Value,
}

fn empty_answers() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitResultResponse {
    pub message: String,
    pub result: QuizResult,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResultListResponse {
    pub test_results: Vec<QuizResult>,
}

#[utoipa::path(
    get,
    path = "/tests",
    responses(
        (status = 200, description = "Active quizzes", body = QuizListResponse),
    ),
    tag = "quizzes"
)]
pub async fn list_tests(Extension(store): Extension<DynStore>) -> Result<impl IntoResponse, ApiError> {
    let tests = store.list_active_quizzes().await?;
    Ok(Json(QuizListResponse { tests }))
}

#[utoipa::path(
    get,
    path = "/tests/{slug}",
    params(("slug" = String, Path, description = "Quiz slug")),
    responses(
        (status = 200, description = "Quiz definition", body = QuizResponse),
        (status = 404, description = "No active quiz with that slug", body = super::error::ErrorBody),
    ),
    tag = "quizzes"
)]
pub async fn get_test(
    Path(slug): Path<String>,
    Extension(store): Extension<DynStore>,
) -> Result<impl IntoResponse, ApiError> {
    let test = store
        .find_active_quiz(&slug)
        .await?
        .ok_or(ApiError::NotFound("Test"))?;
    Ok(Json(QuizResponse { test }))
}

#[utoipa::path(
    post,
    path = "/test-result",
    request_body = SubmitResultRequest,
    responses(
        (status = 201, description = "Result stored", body = SubmitResultResponse),
        (status = 400, description = "Missing fields", body = super::error::ErrorBody),
        (status = 401, description = "Missing or invalid token", body = super::error::ErrorBody),
        (status = 404, description = "Unknown quiz", body = super::error::ErrorBody),
    ),
    tag = "quizzes"
)]
#[instrument(skip_all, fields(account_id = %principal.account_id))]
pub async fn submit_result(
    principal: Principal,
    Extension(store): Extension<DynStore>,
    payload: Option<Json<SubmitResultRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_payload());
    };
    if request.test_slug.trim().is_empty()
        || request.test_name.trim().is_empty()
        || request.result_text.trim().is_empty()
    {
        return Err(ApiError::Validation(
            "test_slug, test_name and result_text are required".to_string(),
        ));
    }

    let quiz = store
        .find_active_quiz(request.test_slug.trim())
        .await?
        .ok_or(ApiError::NotFound("Test"))?;
    let result = store
        .insert_result(NewQuizResult {
            account_id: principal.account_id,
            test_id: quiz.id,
            test_name: request.test_name,
            score: request.score,
            result_text: request.result_text,
            answers: request.answers,
            category: quiz.category,
        })
        .await?;
    info!(result_id = %result.id, slug = %quiz.slug, "quiz result stored");

    Ok((
        StatusCode::CREATED,
        Json(SubmitResultResponse {
            message: "Test result saved".to_string(),
            result,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/user/test-results",
    responses(
        (status = 200, description = "Results for the current account, newest first", body = ResultListResponse),
        (status = 401, description = "Missing or invalid token", body = super::error::ErrorBody),
    ),
    tag = "quizzes"
)]
pub async fn list_results(
    principal: Principal,
    Extension(store): Extension<DynStore>,
) -> Result<impl IntoResponse, ApiError> {
    let test_results = store.list_results(principal.account_id).await?;
    Ok(Json(ResultListResponse { test_results }))
}
