use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::DbError;
use domain::core::PortfolioError;
use domain::market::PricingError;
use domain::settlement::TradeError;
use domain::user::AuthError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::ValidationErrors;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Body of every error response
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ErrorBody {
    pub message: String,
}

/// An error turned into a status code and a `{ "message": ... }` body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal(context: &str, error: &dyn std::error::Error) -> Self {
        tracing::error!("{context}: {error}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errors| errors.iter())
            .find_map(|error| error.message.as_ref().map(ToString::to_string))
            .unwrap_or_else(|| errors.to_string());
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            format!("Invalid request: {}", rejection.body_text()),
        )
    }
}

impl From<DbError> for ApiError {
    fn from(error: DbError) -> Self {
        Self::internal("Storage failure", &error)
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        let status = match &error {
            AuthError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::DuplicateIdentity => StatusCode::CONFLICT,
            AuthError::UnknownIdentity | AuthError::PortfolioNotFound => StatusCode::NOT_FOUND,
            AuthError::InvalidCredential => StatusCode::UNAUTHORIZED,
            AuthError::Hashing(_) | AuthError::DbError(_) => {
                return Self::internal("Authentication failure", &error);
            }
        };
        Self::new(status, error.to_string())
    }
}

impl From<TradeError> for ApiError {
    fn from(error: TradeError) -> Self {
        let status = match &error {
            TradeError::InvalidRequest(_)
            | TradeError::InsufficientFunds { .. }
            | TradeError::InsufficientShares { .. } => StatusCode::BAD_REQUEST,
            TradeError::UnknownTicker(_) | TradeError::PortfolioNotFound => StatusCode::NOT_FOUND,
            TradeError::UnsupportedCurrencyPair { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            TradeError::DbError(_) => return Self::internal("Trade failure", &error),
        };
        Self::new(status, error.to_string())
    }
}

impl From<PricingError> for ApiError {
    fn from(error: PricingError) -> Self {
        let status = match &error {
            PricingError::UnknownTicker(_) => StatusCode::NOT_FOUND,
            PricingError::UnsupportedCurrencyPair { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self::new(status, error.to_string())
    }
}

impl From<PortfolioError> for ApiError {
    fn from(error: PortfolioError) -> Self {
        match error {
            PortfolioError::NotFound => Self::new(StatusCode::NOT_FOUND, error.to_string()),
            PortfolioError::Pricing(pricing) => pricing.into(),
            PortfolioError::DbError(db) => db.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_errors_map_to_statuses() {
        let cases = [
            (
                TradeError::InvalidRequest("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                TradeError::InsufficientFunds {
                    required: 2.0,
                    available: 1.0,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                TradeError::UnknownTicker("NOPE".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (TradeError::PortfolioNotFound, StatusCode::NOT_FOUND),
            (
                TradeError::UnsupportedCurrencyPair {
                    from: "GBP".to_string(),
                    to: "EUR".to_string(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status, status);
        }
    }

    #[test]
    fn test_storage_errors_hide_details() {
        let error = ApiError::from(AuthError::DbError(DbError::TaskError(
            "disk on fire".to_string(),
        )));
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.message, INTERNAL_MESSAGE);
    }

    #[test]
    fn test_auth_errors_map_to_statuses() {
        assert_eq!(
            ApiError::from(AuthError::DuplicateIdentity).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(AuthError::InvalidCredential).status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::UnknownIdentity).status,
            StatusCode::NOT_FOUND
        );
    }
}
