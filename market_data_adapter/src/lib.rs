use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;
use utoipa::ToSchema;

/// A tradable instrument as listed by a market data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Instrument {
    pub ticker: String,
    pub name: String,
    /// Currency the instrument is quoted in
    pub currency: String,
}

/// Instantaneous price of an instrument in its native currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PriceQuote {
    pub ticker: String,
    pub name: String,
    pub price: f64,
    pub currency: String,
}

/// Source of instrument prices and currency conversion rates
pub trait MarketData: Send + Sync {
    /// All listed instruments, in listing order
    fn instruments(&self) -> Vec<Instrument>;
    /// Current quote for `ticker`, `None` if the ticker is not listed
    fn quote(&self, ticker: &str) -> Option<PriceQuote>;
    /// Multiplier converting an amount in `from` into `to`, `None` if the pair is unknown
    fn rate(&self, from: &str, to: &str) -> Option<f64>;
}

#[derive(Debug, Clone)]
struct Listing {
    instrument: Instrument,
    base_price: f64,
}

/// Random-walk market over a static instrument table.
///
/// Each quote is the listing's base price with uniform noise of
/// `±noise` (a fraction) applied, so two quotes for the same ticker
/// usually differ.
#[derive(Debug)]
pub struct MockMarket {
    listings: RwLock<Vec<Listing>>,
    rates: RwLock<HashMap<(String, String), f64>>,
    noise: f64,
}

pub const DEFAULT_NOISE: f64 = 0.01;

const DEFAULT_LISTINGS: &[(&str, &str, &str, f64)] = &[
    // US
    ("AAPL", "Apple Inc.", "USD", 210.0),
    ("MSFT", "Microsoft Corp.", "USD", 450.0),
    ("GOOGL", "Alphabet Inc. (Google)", "USD", 180.0),
    ("AMZN", "Amazon.com, Inc.", "USD", 190.0),
    ("NVDA", "NVIDIA Corporation", "USD", 125.0),
    ("TSLA", "Tesla, Inc.", "USD", 185.0),
    ("META", "Meta Platforms, Inc.", "USD", 500.0),
    ("JPM", "JPMorgan Chase & Co.", "USD", 200.0),
    ("V", "Visa Inc.", "USD", 275.0),
    ("DIS", "The Walt Disney Company", "USD", 105.0),
    ("NKE", "NIKE, Inc.", "USD", 95.0),
    // Europe
    ("VOW3.DE", "Volkswagen AG", "EUR", 125.0),
    ("SIE.DE", "Siemens AG", "EUR", 170.0),
    ("SAP.DE", "SAP SE", "EUR", 180.0),
    ("AIR.PA", "Airbus SE", "EUR", 150.0),
    ("LVMH.PA", "LVMH Moët Hennessy", "EUR", 730.0),
    ("NESN.SW", "Nestlé S.A.", "CHF", 95.0),
    ("NOVN.SW", "Novartis AG", "CHF", 94.0),
    ("ASML.AS", "ASML Holding N.V.", "EUR", 970.0),
    // Asia, ADRs quoted in USD
    ("TM", "Toyota Motor Corp.", "USD", 205.0),
    ("7203.T", "Toyota Motor Corp. (Tokyo)", "JPY", 3200.0),
    ("SONY", "Sony Group Corporation", "USD", 85.0),
    ("6758.T", "Sony Group Corp. (Tokyo)", "JPY", 13000.0),
    ("BABA", "Alibaba Group Holding Ltd.", "USD", 75.0),
    ("0700.HK", "Tencent Holdings Ltd.", "HKD", 380.0),
    ("SSNLF", "Samsung Electronics Co., Ltd.", "USD", 1400.0),
];

const DEFAULT_RATES: &[(&str, &str, f64)] = &[
    ("USD", "EUR", 0.92),
    ("EUR", "USD", 1.08),
    ("JPY", "EUR", 0.0058),
    ("CHF", "EUR", 1.02),
    ("HKD", "EUR", 0.12),
];

impl MockMarket {
    /// The default instrument and FX tables with ±1% noise
    #[must_use]
    pub fn new() -> Self {
        Self::with_noise(DEFAULT_NOISE)
    }

    /// The default tables with the given noise fraction (0.0 gives stable prices)
    #[must_use]
    pub fn with_noise(noise: f64) -> Self {
        let market = Self::empty(noise);
        for (ticker, name, currency, price) in DEFAULT_LISTINGS {
            market.add_instrument(ticker, name, currency, *price);
        }
        for (from, to, rate) in DEFAULT_RATES {
            market.set_rate(from, to, *rate);
        }
        market
    }

    /// A market without instruments or rates
    #[must_use]
    pub fn empty(noise: f64) -> Self {
        Self {
            listings: RwLock::new(Vec::new()),
            rates: RwLock::new(HashMap::new()),
            noise: noise.abs(),
        }
    }

    /// List an instrument, or replace the listing with the same ticker
    pub fn add_instrument(&self, ticker: &str, name: &str, currency: &str, base_price: f64) {
        let listing = Listing {
            instrument: Instrument {
                ticker: ticker.to_uppercase(),
                name: name.to_string(),
                currency: currency.to_uppercase(),
            },
            base_price,
        };
        let mut listings = self.listings.write().unwrap_or_else(PoisonError::into_inner);
        match listings
            .iter_mut()
            .find(|l| l.instrument.ticker == listing.instrument.ticker)
        {
            Some(existing) => *existing = listing,
            None => listings.push(listing),
        }
    }

    /// Move the base price of a listed instrument. Returns false if the ticker is unknown.
    pub fn set_base_price(&self, ticker: &str, base_price: f64) -> bool {
        let ticker = ticker.to_uppercase();
        let mut listings = self.listings.write().unwrap_or_else(PoisonError::into_inner);
        match listings.iter_mut().find(|l| l.instrument.ticker == ticker) {
            Some(listing) => {
                listing.base_price = base_price;
                true
            }
            None => false,
        }
    }

    pub fn set_rate(&self, from: &str, to: &str, rate: f64) {
        self.rates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((from.to_uppercase(), to.to_uppercase()), rate);
    }

    fn noisy(&self, base_price: f64) -> f64 {
        if self.noise == 0.0 {
            return base_price;
        }
        let jitter: f64 = rand::rng().random_range(-self.noise..=self.noise);
        base_price * (1.0 + jitter)
    }
}

impl Default for MockMarket {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketData for MockMarket {
    fn instruments(&self) -> Vec<Instrument> {
        self.listings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|l| l.instrument.clone())
            .collect()
    }

    fn quote(&self, ticker: &str) -> Option<PriceQuote> {
        let ticker = ticker.to_uppercase();
        let listings = self.listings.read().unwrap_or_else(PoisonError::into_inner);
        let listing = listings.iter().find(|l| l.instrument.ticker == ticker)?;
        let price = self.noisy(listing.base_price);
        debug!("Quoted {ticker} at {price:.4} {}", listing.instrument.currency);

        Some(PriceQuote {
            ticker,
            name: listing.instrument.name.clone(),
            price,
            currency: listing.instrument.currency.clone(),
        })
    }

    fn rate(&self, from: &str, to: &str) -> Option<f64> {
        let (from, to) = (from.to_uppercase(), to.to_uppercase());
        if from == to {
            return Some(1.0);
        }
        self.rates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(from, to))
            .copied()
    }
}
