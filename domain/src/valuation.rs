use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::market::{FxPolicy, MarketData, PricingError, quote_in};
use crate::portfolio::Portfolio;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PositionValuation {
    pub ticker: String,
    pub name: String,
    pub shares: u64,
    pub avg_price: f64,
    /// Current price converted to the portfolio currency
    pub current_price: f64,
    pub market_value: f64,
    pub cost_basis: f64,
    pub profit_loss: f64,
    pub profit_loss_percent: f64,
}

/// Point-in-time valuation of a portfolio at current market prices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioValuation {
    pub currency: String,
    pub cash: f64,
    pub positions: Vec<PositionValuation>,
    pub market_value: f64,
    /// What the current holdings cost, at their average prices
    pub cost_basis: f64,
    pub total_value: f64,
    pub initial_deposit: f64,
    pub total_profit_loss: f64,
    pub total_profit_loss_percent: f64,
}

fn percent_of(amount: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        0.0
    } else {
        amount / reference * 100.0
    }
}

/// Value every holding of `portfolio` at the market's current prices.
/// Read-only; two calls may disagree when the market is noisy.
/// # Errors
/// Returns `PricingError` if a held ticker can no longer be priced
pub fn value_portfolio<M: MarketData + ?Sized>(
    portfolio: &Portfolio,
    market: &M,
    fx_policy: FxPolicy,
) -> Result<PortfolioValuation, PricingError> {
    let positions = portfolio
        .holdings
        .iter()
        .map(|(ticker, holding)| {
            let converted = quote_in(market, ticker, &portfolio.currency, fx_policy)?;
            let shares = holding.shares as f64;
            let market_value = shares * converted.price_in_base;
            let cost_basis = shares * holding.avg_price;
            let profit_loss = market_value - cost_basis;

            Ok(PositionValuation {
                ticker: converted.quote.ticker,
                name: converted.quote.name,
                shares: holding.shares,
                avg_price: holding.avg_price,
                current_price: converted.price_in_base,
                market_value,
                cost_basis,
                profit_loss,
                profit_loss_percent: percent_of(profit_loss, cost_basis),
            })
        })
        .collect::<Result<Vec<_>, PricingError>>()?;

    let market_value: f64 = positions.iter().map(|p| p.market_value).sum();
    let total_value = portfolio.cash + market_value;
    let total_profit_loss = total_value - portfolio.initial_deposit;

    Ok(PortfolioValuation {
        currency: portfolio.currency.clone(),
        cash: portfolio.cash,
        positions,
        market_value,
        cost_basis: portfolio.total_cost(),
        total_value,
        initial_deposit: portfolio.initial_deposit,
        total_profit_loss,
        total_profit_loss_percent: percent_of(total_profit_loss, portfolio.initial_deposit),
    })
}
