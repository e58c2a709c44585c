use axum::{
    Json,
    extract::{Path, Query, State},
};
use domain::market::{Instrument, PriceQuote};
use serde::Deserialize;
use utoipa::IntoParams;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use super::AppState;
use super::error::{ApiError, ErrorBody};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Case-insensitive match on ticker or company name. Empty lists everything.
    #[serde(default)]
    pub q: String,
}

pub fn router(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .with_state(state)
        .routes(routes!(search_stocks))
        .routes(routes!(get_quote))
}

/// Search the instrument catalogue
#[utoipa::path(
    get,
    path = "/stocks",
    params(SearchParams),
    responses(
        (status = 200, description = "Matching instruments", body = Vec<Instrument>)
    ),
    tag = super::STOCKS_TAG
)]
async fn search_stocks(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<Instrument>> {
    Json(state.sim().search_stocks(&params.q))
}

/// Get the current price of a stock, in its own currency
#[utoipa::path(
    get,
    path = "/stocks/{ticker}/quote",
    params(
        ("ticker" = String, Path, description = "Ticker symbol, case-insensitive")
    ),
    responses(
        (status = 200, description = "Current quote", body = PriceQuote),
        (status = 404, description = "Unknown ticker", body = ErrorBody)
    ),
    tag = super::STOCKS_TAG
)]
async fn get_quote(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<PriceQuote>, ApiError> {
    Ok(Json(state.sim().quote(&ticker)?))
}
