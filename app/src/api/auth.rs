use axum::{Json, extract::State, extract::rejection::JsonRejection, http::StatusCode};
use domain::portfolio::Portfolio;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use validator::Validate;

use super::AppState;
use super::error::{ApiError, ErrorBody};

#[derive(Debug, Default, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Username and password are required."))]
    pub user_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Username and password are required."))]
    pub password: String,
}

pub fn router(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .with_state(state)
        .routes(routes!(register))
        .routes(routes!(login))
}

/// Register a new user
///
/// Creates the account and its starting portfolio, and returns the portfolio.
#[utoipa::path(
    post,
    path = "/register",
    request_body = CredentialsRequest,
    responses(
        (status = 201, description = "User registered", body = Portfolio),
        (status = 400, description = "Malformed body or missing username or password", body = ErrorBody),
        (status = 409, description = "Username already exists", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = super::AUTH_TAG
)]
async fn register(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Portfolio>), ApiError> {
    let Json(payload) = payload?;
    payload.validate()?;
    let portfolio = state
        .sim()
        .register(&payload.user_id, &payload.password)
        .await?;
    Ok((StatusCode::CREATED, Json(portfolio)))
}

/// Log in
///
/// Checks the password and returns the user's portfolio.
#[utoipa::path(
    post,
    path = "/login",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Logged in", body = Portfolio),
        (status = 400, description = "Malformed body or missing username or password", body = ErrorBody),
        (status = 401, description = "Invalid password", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    tag = super::AUTH_TAG
)]
async fn login(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<Portfolio>, ApiError> {
    let Json(payload) = payload?;
    payload.validate()?;
    let portfolio = state
        .sim()
        .login(&payload.user_id, &payload.password)
        .await?;
    Ok(Json(portfolio))
}
