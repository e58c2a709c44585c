use thiserror::Error;
use tracing::warn;

pub use market_data_adapter::{Instrument, MarketData, MockMarket, PriceQuote};

/// What to do when the market has no rate for a currency pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FxPolicy {
    /// Refuse to price the instrument
    #[default]
    Strict,
    /// Convert at 1.0 and log a warning
    FallbackToParity,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PricingError {
    #[error("Stock with ticker '{0}' not found")]
    UnknownTicker(String),
    #[error("No exchange rate from {from} to {to}")]
    UnsupportedCurrencyPair { from: String, to: String },
}

/// A quote converted into a portfolio's base currency
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedQuote {
    pub quote: PriceQuote,
    pub rate: f64,
    pub price_in_base: f64,
}

/// Quote `ticker` and convert the price into `base_currency`
/// # Errors
/// - `PricingError::UnknownTicker` if the market does not list the ticker
/// - `PricingError::UnsupportedCurrencyPair` if no rate exists and the policy is strict
pub fn quote_in<M: MarketData + ?Sized>(
    market: &M,
    ticker: &str,
    base_currency: &str,
    fx_policy: FxPolicy,
) -> Result<ConvertedQuote, PricingError> {
    let quote = market
        .quote(ticker)
        .ok_or_else(|| PricingError::UnknownTicker(ticker.to_string()))?;
    let rate = conversion_rate(market, &quote.currency, base_currency, fx_policy)?;

    Ok(ConvertedQuote {
        price_in_base: quote.price * rate,
        rate,
        quote,
    })
}

fn conversion_rate<M: MarketData + ?Sized>(
    market: &M,
    from: &str,
    to: &str,
    fx_policy: FxPolicy,
) -> Result<f64, PricingError> {
    match (market.rate(from, to), fx_policy) {
        (Some(rate), _) => Ok(rate),
        (None, FxPolicy::FallbackToParity) => {
            warn!("No exchange rate from {from} to {to}, converting at 1.0");
            Ok(1.0)
        }
        (None, FxPolicy::Strict) => Err(PricingError::UnsupportedCurrencyPair {
            from: from.to_string(),
            to: to.to_string(),
        }),
    }
}

/// Instruments whose ticker or name contains `term`, ignoring case
pub fn search<M: MarketData + ?Sized>(market: &M, term: &str) -> Vec<Instrument> {
    let term = term.trim().to_lowercase();
    market
        .instruments()
        .into_iter()
        .filter(|i| {
            term.is_empty()
                || i.ticker.to_lowercase().contains(&term)
                || i.name.to_lowercase().contains(&term)
        })
        .collect()
}
