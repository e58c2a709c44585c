use json_store_adapter::db::DbError;
use thiserror::Error;
use tracing::{debug, warn};

use crate::market::{FxPolicy, MarketData, PricingError, quote_in};
use crate::portfolio::{Holding, Portfolio, TradeDirection, Transaction};

/// Trade errors
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("Invalid trade request: {0}")]
    InvalidRequest(String),
    #[error("Stock with ticker '{0}' not found")]
    UnknownTicker(String),
    #[error("No exchange rate from {from} to {to}")]
    UnsupportedCurrencyPair { from: String, to: String },
    #[error("Not enough cash: required {required:.2}, available {available:.2}")]
    InsufficientFunds { required: f64, available: f64 },
    #[error("Not enough shares to sell: requested {requested}, held {held}")]
    InsufficientShares { requested: u64, held: u64 },
    #[error("Portfolio not found")]
    PortfolioNotFound,
    #[error("Database error: {0}")]
    DbError(#[from] DbError),
}

impl From<PricingError> for TradeError {
    fn from(error: PricingError) -> Self {
        match error {
            PricingError::UnknownTicker(ticker) => TradeError::UnknownTicker(ticker),
            PricingError::UnsupportedCurrencyPair { from, to } => {
                TradeError::UnsupportedCurrencyPair { from, to }
            }
        }
    }
}

/// A validated trade instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeRequest {
    pub ticker: String,
    pub shares: u64,
    pub direction: TradeDirection,
}

impl TradeRequest {
    /// Build a request from raw client input. The ticker is upper-cased.
    /// # Errors
    /// Returns `TradeError::InvalidRequest` for a blank ticker, a share count
    /// below 1 or an unknown direction
    pub fn parse(ticker: &str, shares: i64, direction: &str) -> Result<Self, TradeError> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(TradeError::InvalidRequest("ticker is required".to_string()));
        }
        let shares = u64::try_from(shares)
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| {
                TradeError::InvalidRequest("shares must be a positive integer".to_string())
            })?;
        let direction = direction.parse().map_err(TradeError::InvalidRequest)?;

        Ok(Self {
            ticker,
            shares,
            direction,
        })
    }

    #[must_use]
    pub fn buy(ticker: &str, shares: u64) -> Self {
        Self {
            ticker: ticker.to_uppercase(),
            shares,
            direction: TradeDirection::Buy,
        }
    }

    #[must_use]
    pub fn sell(ticker: &str, shares: u64) -> Self {
        Self {
            ticker: ticker.to_uppercase(),
            shares,
            direction: TradeDirection::Sell,
        }
    }
}

/// Settles trades against a portfolio using prices from a market
#[derive(Debug)]
pub struct SettlementEngine<'a, M: ?Sized> {
    market: &'a M,
    fx_policy: FxPolicy,
}

impl<'a, M: MarketData + ?Sized> SettlementEngine<'a, M> {
    pub fn new(market: &'a M, fx_policy: FxPolicy) -> Self {
        Self { market, fx_policy }
    }

    /// Execute `request` against `portfolio` at the current market price.
    ///
    /// On success the portfolio's cash, holdings and history are updated and
    /// the appended transaction is returned. On error the portfolio is left
    /// untouched.
    /// # Errors
    /// - `InvalidRequest` if the share count is zero
    /// - `UnknownTicker` / `UnsupportedCurrencyPair` if the trade cannot be priced
    /// - `InsufficientFunds` if a buy costs more than the available cash
    /// - `InsufficientShares` if a sell exceeds the held quantity
    pub fn execute_trade(
        &self,
        portfolio: &mut Portfolio,
        request: &TradeRequest,
    ) -> Result<Transaction, TradeError> {
        if request.shares == 0 {
            return Err(TradeError::InvalidRequest(
                "shares must be a positive integer".to_string(),
            ));
        }

        let converted = quote_in(
            self.market,
            &request.ticker,
            &portfolio.currency,
            self.fx_policy,
        )?;
        let price = converted.price_in_base;
        let total = request.shares as f64 * price;
        debug!(
            "Pricing {} {} x {} at {price:.4} {} (rate {})",
            request.direction, request.shares, request.ticker, portfolio.currency, converted.rate
        );

        match request.direction {
            TradeDirection::Buy => Self::settle_buy(portfolio, request, price, total)?,
            TradeDirection::Sell => Self::settle_sell(portfolio, request, total)?,
        }

        let transaction = Transaction {
            direction: request.direction,
            ticker: request.ticker.clone(),
            shares: request.shares,
            price,
            total,
            timestamp: portfolio.next_timestamp(),
        };
        portfolio.history.push(transaction.clone());

        Ok(transaction)
    }

    fn settle_buy(
        portfolio: &mut Portfolio,
        request: &TradeRequest,
        price: f64,
        total: f64,
    ) -> Result<(), TradeError> {
        if portfolio.cash < total {
            warn!(
                "Rejected buy of {} {} for {}: cost {total:.2}, cash {:.2}",
                request.shares, request.ticker, portfolio.user_id, portfolio.cash
            );
            return Err(TradeError::InsufficientFunds {
                required: total,
                available: portfolio.cash,
            });
        }

        portfolio.cash -= total;
        match portfolio.holdings.get_mut(&request.ticker) {
            Some(holding) => {
                let shares = holding.shares + request.shares;
                let cost = holding.shares as f64 * holding.avg_price + total;
                holding.shares = shares;
                holding.avg_price = cost / shares as f64;
            }
            None => {
                portfolio.holdings.insert(
                    request.ticker.clone(),
                    Holding {
                        ticker: request.ticker.clone(),
                        shares: request.shares,
                        avg_price: price,
                    },
                );
            }
        }
        Ok(())
    }

    fn settle_sell(
        portfolio: &mut Portfolio,
        request: &TradeRequest,
        total: f64,
    ) -> Result<(), TradeError> {
        let held = portfolio.shares_of(&request.ticker);
        if held < request.shares {
            warn!(
                "Rejected sell of {} {} for {}: holds {held}",
                request.shares, request.ticker, portfolio.user_id
            );
            return Err(TradeError::InsufficientShares {
                requested: request.shares,
                held,
            });
        }

        portfolio.cash += total;
        if held == request.shares {
            portfolio.holdings.remove(&request.ticker);
        } else if let Some(holding) = portfolio.holdings.get_mut(&request.ticker) {
            holding.shares -= request.shares;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MockMarket;

    const EPS: f64 = 1e-9;

    fn fresh_portfolio() -> Portfolio {
        Portfolio::new("alice".to_string(), 10_000.0, "USD")
    }

    fn stable_market() -> MockMarket {
        MockMarket::with_noise(0.0)
    }

    #[test]
    fn test_worked_example() {
        let market = stable_market();
        let engine = SettlementEngine::new(&market, FxPolicy::Strict);
        let mut portfolio = fresh_portfolio();

        engine
            .execute_trade(&mut portfolio, &TradeRequest::buy("AAPL", 10))
            .unwrap();
        assert!((portfolio.cash - 7_900.0).abs() < EPS);
        let aapl = portfolio.holding("AAPL").unwrap();
        assert_eq!(aapl.shares, 10);
        assert!((aapl.avg_price - 210.0).abs() < EPS);
        assert_eq!(portfolio.history.len(), 1);

        market.set_base_price("AAPL", 220.0);
        engine
            .execute_trade(&mut portfolio, &TradeRequest::buy("AAPL", 5))
            .unwrap();
        let aapl = portfolio.holding("AAPL").unwrap();
        assert_eq!(aapl.shares, 15);
        assert!((aapl.avg_price - 3_200.0 / 15.0).abs() < EPS);
        assert!((aapl.avg_price - 213.33).abs() < 0.01);

        market.set_base_price("AAPL", 230.0);
        let cash_before = portfolio.cash;
        let sell = engine
            .execute_trade(&mut portfolio, &TradeRequest::sell("AAPL", 15))
            .unwrap();
        assert!((portfolio.cash - (cash_before + 15.0 * 230.0)).abs() < EPS);
        assert!(portfolio.holding("AAPL").is_none());
        assert_eq!(portfolio.history.len(), 3);
        assert_eq!(sell.direction, TradeDirection::Sell);
        assert!((sell.total - 3_450.0).abs() < EPS);
    }

    #[test]
    fn test_partial_sell_keeps_average_price() {
        let market = stable_market();
        let engine = SettlementEngine::new(&market, FxPolicy::Strict);
        let mut portfolio = fresh_portfolio();

        engine
            .execute_trade(&mut portfolio, &TradeRequest::buy("MSFT", 4))
            .unwrap();
        market.set_base_price("MSFT", 500.0);
        engine
            .execute_trade(&mut portfolio, &TradeRequest::sell("MSFT", 1))
            .unwrap();

        let msft = portfolio.holding("MSFT").unwrap();
        assert_eq!(msft.shares, 3);
        assert!((msft.avg_price - 450.0).abs() < EPS);
        assert!((portfolio.cash - (10_000.0 - 4.0 * 450.0 + 500.0)).abs() < EPS);
    }

    #[test]
    fn test_insufficient_funds_leaves_portfolio_untouched() {
        let market = stable_market();
        let engine = SettlementEngine::new(&market, FxPolicy::Strict);
        let mut portfolio = fresh_portfolio();
        let before = portfolio.clone();

        let result = engine.execute_trade(&mut portfolio, &TradeRequest::buy("MSFT", 23));

        assert!(matches!(
            result,
            Err(TradeError::InsufficientFunds { required, available })
                if (required - 10_350.0).abs() < EPS && available == 10_000.0
        ));
        assert_eq!(portfolio, before);
    }

    #[test]
    fn test_insufficient_shares_leaves_portfolio_untouched() {
        let market = stable_market();
        let engine = SettlementEngine::new(&market, FxPolicy::Strict);
        let mut portfolio = fresh_portfolio();
        engine
            .execute_trade(&mut portfolio, &TradeRequest::buy("NKE", 2))
            .unwrap();
        let before = portfolio.clone();

        let oversell = engine.execute_trade(&mut portfolio, &TradeRequest::sell("NKE", 3));
        assert!(matches!(
            oversell,
            Err(TradeError::InsufficientShares {
                requested: 3,
                held: 2
            })
        ));

        let not_held = engine.execute_trade(&mut portfolio, &TradeRequest::sell("V", 1));
        assert!(matches!(
            not_held,
            Err(TradeError::InsufficientShares { held: 0, .. })
        ));
        assert_eq!(portfolio, before);
    }

    #[test]
    fn test_buy_converts_to_base_currency() {
        let market = stable_market();
        let engine = SettlementEngine::new(&market, FxPolicy::Strict);
        let mut portfolio = Portfolio::new("bob".to_string(), 10_000.0, "EUR");

        let tx = engine
            .execute_trade(&mut portfolio, &TradeRequest::buy("AAPL", 10))
            .unwrap();

        assert!((tx.price - 210.0 * 0.92).abs() < EPS);
        assert!((tx.total - 10.0 * tx.price).abs() < EPS);
        assert!((portfolio.cash - (10_000.0 - tx.total)).abs() < EPS);
    }

    #[test]
    fn test_unsupported_pair_is_rejected_when_strict() {
        let market = stable_market();
        let strict = SettlementEngine::new(&market, FxPolicy::Strict);
        let mut portfolio = Portfolio::new("carol".to_string(), 1_000_000.0, "USD");

        let result = strict.execute_trade(&mut portfolio, &TradeRequest::buy("0700.HK", 1));
        assert!(matches!(
            result,
            Err(TradeError::UnsupportedCurrencyPair { .. })
        ));
        assert!(portfolio.history.is_empty());

        let lenient = SettlementEngine::new(&market, FxPolicy::FallbackToParity);
        let tx = lenient
            .execute_trade(&mut portfolio, &TradeRequest::buy("0700.HK", 1))
            .unwrap();
        assert_eq!(tx.price, 380.0);
    }

    #[test]
    fn test_unknown_ticker_and_zero_shares() {
        let market = stable_market();
        let engine = SettlementEngine::new(&market, FxPolicy::Strict);
        let mut portfolio = fresh_portfolio();

        assert!(matches!(
            engine.execute_trade(&mut portfolio, &TradeRequest::buy("NOPE", 1)),
            Err(TradeError::UnknownTicker(t)) if t == "NOPE"
        ));
        assert!(matches!(
            engine.execute_trade(&mut portfolio, &TradeRequest::buy("AAPL", 0)),
            Err(TradeError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_history_is_chronological() {
        let market = MockMarket::new();
        let engine = SettlementEngine::new(&market, FxPolicy::Strict);
        let mut portfolio = fresh_portfolio();

        for _ in 0..5 {
            engine
                .execute_trade(&mut portfolio, &TradeRequest::buy("DIS", 1))
                .unwrap();
        }
        engine
            .execute_trade(&mut portfolio, &TradeRequest::sell("DIS", 5))
            .unwrap();

        assert_eq!(portfolio.history.len(), 6);
        assert!(
            portfolio
                .history
                .windows(2)
                .all(|w| w[0].timestamp <= w[1].timestamp)
        );
        for tx in &portfolio.history {
            assert!((tx.total - tx.shares as f64 * tx.price).abs() < EPS);
        }
        assert!(portfolio.holdings.is_empty());
    }

    #[test]
    fn test_parse_request() {
        let request = TradeRequest::parse(" aapl ", 3, "Buy").unwrap();
        assert_eq!(request, TradeRequest::buy("AAPL", 3));

        assert!(matches!(
            TradeRequest::parse("AAPL", 0, "buy"),
            Err(TradeError::InvalidRequest(_))
        ));
        assert!(matches!(
            TradeRequest::parse("AAPL", -4, "sell"),
            Err(TradeError::InvalidRequest(_))
        ));
        assert!(matches!(
            TradeRequest::parse("", 1, "sell"),
            Err(TradeError::InvalidRequest(_))
        ));
        assert!(matches!(
            TradeRequest::parse("AAPL", 1, "short"),
            Err(TradeError::InvalidRequest(_))
        ));
    }
}
