use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::user::UserId;

/// Starting cash of a freshly registered portfolio
pub const DEFAULT_STARTING_CASH: f64 = 10_000.0;
/// Base currency of a freshly registered portfolio
pub const DEFAULT_BASE_CURRENCY: &str = "EUR";

fn default_initial_deposit() -> f64 {
    DEFAULT_STARTING_CASH
}

/// Holdings written without their own `ticker` take it from the map key
fn holdings_by_ticker<'de, D>(deserializer: D) -> Result<BTreeMap<String, Holding>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut holdings = BTreeMap::<String, Holding>::deserialize(deserializer)?;
    for (ticker, holding) in &mut holdings {
        if holding.ticker.is_empty() {
            holding.ticker.clone_from(ticker);
        }
    }
    Ok(holdings)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeDirection::Buy => write!(f, "buy"),
            TradeDirection::Sell => write!(f, "sell"),
        }
    }
}

impl TradeDirection {
    #[must_use]
    pub fn past_tense(self) -> &'static str {
        match self {
            TradeDirection::Buy => "bought",
            TradeDirection::Sell => "sold",
        }
    }
}

impl FromStr for TradeDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(TradeDirection::Buy),
            "sell" => Ok(TradeDirection::Sell),
            other => Err(format!("unknown trade type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    #[serde(default)]
    pub ticker: String,
    pub shares: u64,
    /// Average cost per share, in the portfolio currency
    pub avg_price: f64,
}

/// A settled trade. Never edited once appended to a portfolio's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    #[serde(rename = "type")]
    pub direction: TradeDirection,
    pub ticker: String,
    pub shares: u64,
    /// Execution price per share, in the portfolio currency
    pub price: f64,
    /// Cash moved by the trade, `shares * price`
    pub total: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    #[schema(value_type = String)]
    pub user_id: UserId,
    pub cash: f64,
    pub currency: String,
    /// Ticker -> Holding
    #[serde(rename = "stocks", default, deserialize_with = "holdings_by_ticker")]
    pub holdings: BTreeMap<String, Holding>,
    #[serde(default)]
    pub history: Vec<Transaction>,
    /// Cash the account was opened with, the reference for P/L
    #[serde(default = "default_initial_deposit")]
    pub initial_deposit: f64,
}

impl Portfolio {
    #[must_use]
    pub fn new(user_id: UserId, starting_cash: f64, currency: &str) -> Self {
        Self {
            user_id,
            cash: starting_cash,
            currency: currency.to_uppercase(),
            holdings: BTreeMap::new(),
            history: Vec::new(),
            initial_deposit: starting_cash,
        }
    }

    #[must_use]
    pub fn holding(&self, ticker: &str) -> Option<&Holding> {
        self.holdings.get(ticker)
    }

    #[must_use]
    pub fn shares_of(&self, ticker: &str) -> u64 {
        self.holding(ticker).map_or(0, |h| h.shares)
    }

    /// Total cost basis of all holdings
    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.holdings
            .values()
            .map(|h| h.shares as f64 * h.avg_price)
            .sum()
    }

    /// Timestamp for the next transaction, never earlier than the last one
    pub(crate) fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.history.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_matches_client() {
        let mut portfolio = Portfolio::new("alice".to_string(), 10_000.0, "eur");
        portfolio.holdings.insert(
            "AAPL".to_string(),
            Holding {
                ticker: "AAPL".to_string(),
                shares: 10,
                avg_price: 210.0,
            },
        );

        let json = serde_json::to_value(&portfolio).unwrap();
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["currency"], "EUR");
        assert_eq!(json["stocks"]["AAPL"]["avgPrice"], 210.0);
        assert_eq!(json["initialDeposit"], 10_000.0);
    }

    #[test]
    fn test_reads_document_without_initial_deposit() {
        let json = r#"{
            "userId": "bob",
            "cash": 9000.5,
            "currency": "EUR",
            "stocks": { "MSFT": { "shares": 2, "avgPrice": 410.0 } },
            "history": [{
                "type": "buy", "ticker": "MSFT", "shares": 2,
                "price": 410.0, "total": 820.0,
                "timestamp": "2024-06-01T10:00:00.000Z"
            }]
        }"#;

        let portfolio: Portfolio = serde_json::from_str(json).unwrap();
        assert_eq!(portfolio.initial_deposit, DEFAULT_STARTING_CASH);
        assert_eq!(portfolio.shares_of("MSFT"), 2);
        assert_eq!(portfolio.holding("MSFT").unwrap().ticker, "MSFT");
        assert_eq!(portfolio.history[0].direction, TradeDirection::Buy);
        assert_eq!(portfolio.total_cost(), 820.0);
    }

    #[test]
    fn test_parse_direction() {
        assert_eq!("BUY".parse::<TradeDirection>(), Ok(TradeDirection::Buy));
        assert_eq!(" sell ".parse::<TradeDirection>(), Ok(TradeDirection::Sell));
        assert!("hold".parse::<TradeDirection>().is_err());
    }
}
