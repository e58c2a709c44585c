use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_swagger_ui::SwaggerUi;

use crate::services::SimHandle;

mod auth;
pub mod error;
mod portfolio;
mod stocks;

const AUTH_TAG: &str = "auth";
const PORTFOLIO_TAG: &str = "portfolio";
const STOCKS_TAG: &str = "stocks";

#[derive(OpenApi)]
#[openapi(
    info(title = "StockSim", description = "Paper trading against a simulated market"),
    paths(
        health,
    ),
    components(
        schemas(
            error::ErrorBody,
            auth::CredentialsRequest,
            portfolio::TradeBody
        )
    ),
    tags(
        (name = AUTH_TAG, description = "Registration and login"),
        (name = PORTFOLIO_TAG, description = "Portfolios, trading and valuation"),
        (name = STOCKS_TAG, description = "Instrument catalogue and quotes")
    )
)]
struct ApiDoc;

/// Get health of the API.
#[utoipa::path(
    method(get, head),
    path = "/api/health",
    responses(
        (status = OK, description = "Success", body = str, content_type = "text/plain")
    )
)]
async fn health() -> &'static str {
    "ok"
}

pub type AppState = SimHandle;

pub fn create_api(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(health))
        .nest(
            "/api",
            auth::router(state.clone())
                .merge(portfolio::router(state.clone()))
                .merge(stocks::router(state.clone())),
        )
        .split_for_parts();

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/apidoc/openapi.json", api))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
