use axum::{Json, extract::Path, extract::State, extract::rejection::JsonRejection};
use domain::portfolio::Portfolio;
use domain::settlement::TradeRequest;
use domain::valuation::PortfolioValuation;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use validator::Validate;

use super::AppState;
use super::error::{ApiError, ErrorBody};

/// A buy or sell instruction as sent by the client
#[derive(Debug, Default, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TradeBody {
    #[serde(default)]
    #[validate(length(min = 1, message = "Invalid trade request: ticker is required"))]
    pub ticker: String,
    #[serde(default)]
    #[validate(range(min = 1, message = "Invalid trade request: shares must be a positive integer"))]
    pub shares: i64,
    /// `buy` or `sell`
    #[serde(default)]
    pub trade_type: String,
}

pub fn router(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .with_state(state)
        .routes(routes!(get_portfolio))
        .routes(routes!(post_trade))
        .routes(routes!(get_valuation))
}

/// Get a user's portfolio
#[utoipa::path(
    get,
    path = "/portfolio/{user_id}",
    params(
        ("user_id" = String, Path, description = "Username")
    ),
    responses(
        (status = 200, description = "Portfolio found", body = Portfolio),
        (status = 404, description = "Portfolio not found", body = ErrorBody)
    ),
    tag = super::PORTFOLIO_TAG
)]
async fn get_portfolio(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Portfolio>, ApiError> {
    Ok(Json(state.sim().get_portfolio(&user_id).await?))
}

/// Execute a trade
///
/// Buys or sells at the current market price converted to the portfolio currency.
/// The trade is all-or-nothing: a rejected trade leaves the portfolio untouched.
#[utoipa::path(
    post,
    path = "/portfolio/{user_id}/trade",
    params(
        ("user_id" = String, Path, description = "Username")
    ),
    request_body = TradeBody,
    responses(
        (status = 200, description = "Trade settled", body = Portfolio),
        (status = 400, description = "Malformed or invalid request, not enough cash or not enough shares", body = ErrorBody),
        (status = 404, description = "Unknown ticker or portfolio", body = ErrorBody),
        (status = 422, description = "No exchange rate into the portfolio currency", body = ErrorBody)
    ),
    tag = super::PORTFOLIO_TAG
)]
async fn post_trade(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<TradeBody>, JsonRejection>,
) -> Result<Json<Portfolio>, ApiError> {
    let Json(payload) = payload?;
    payload.validate()?;
    let request = TradeRequest::parse(&payload.ticker, payload.shares, &payload.trade_type)?;
    Ok(Json(state.sim().trade(&user_id, &request).await?))
}

/// Value a portfolio at current prices
#[utoipa::path(
    get,
    path = "/portfolio/{user_id}/valuation",
    params(
        ("user_id" = String, Path, description = "Username")
    ),
    responses(
        (status = 200, description = "Current valuation", body = PortfolioValuation),
        (status = 404, description = "Portfolio not found", body = ErrorBody),
        (status = 422, description = "A holding cannot be converted to the portfolio currency", body = ErrorBody)
    ),
    tag = super::PORTFOLIO_TAG
)]
async fn get_valuation(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PortfolioValuation>, ApiError> {
    Ok(Json(state.sim().valuation(&user_id).await?))
}

#[cfg(test)]
mod tests;
