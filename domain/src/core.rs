use std::path::PathBuf;

use json_store_adapter::db::{DbError, JsonFileRepo, JsonFileStore, Repository};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::locks::IdentityLocks;
use crate::market::{self, FxPolicy, Instrument, MarketData, MockMarket, PriceQuote, PricingError};
use crate::portfolio::{DEFAULT_BASE_CURRENCY, DEFAULT_STARTING_CASH, Portfolio};
use crate::settlement::{SettlementEngine, TradeError, TradeRequest};
use crate::user::{
    AuthError, Credential, CredentialHasher, UserId, normalise_identity, normalise_login,
};
use crate::valuation::{PortfolioValuation, value_portfolio};

pub const USERS_TABLE: &str = "users";
pub const PORTFOLIOS_TABLE: &str = "portfolios";

pub type CredentialRepo = JsonFileRepo<Credential, UserId>;
pub type PortfolioRepo = JsonFileRepo<Portfolio, UserId>;

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("Portfolio not found")]
    NotFound,
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error("Database error: {0}")]
    DbError(#[from] DbError),
}

/// Settings applied to new accounts and to pricing
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub starting_cash: f64,
    pub base_currency: String,
    pub fx_policy: FxPolicy,
    pub credential_hasher: CredentialHasher,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            starting_cash: DEFAULT_STARTING_CASH,
            base_currency: DEFAULT_BASE_CURRENCY.to_string(),
            fx_policy: FxPolicy::default(),
            credential_hasher: CredentialHasher::default(),
        }
    }
}

/// The stock simulator: accounts, portfolios and trading over a store and a market
#[derive(Debug)]
pub struct StockSim<C = CredentialRepo, P = PortfolioRepo, M = MockMarket> {
    credentials: C,
    portfolios: P,
    market: M,
    config: SimConfig,
    locks: IdentityLocks,
}

impl StockSim {
    /// Open the JSON document at `path` and trade against the default mock market
    /// # Errors
    /// Returns `DbError` if the document cannot be opened or is corrupt
    pub async fn open(path: impl Into<PathBuf>, config: SimConfig) -> Result<Self, DbError> {
        Self::open_with_market(path, MockMarket::new(), config).await
    }
}

impl<M: MarketData> StockSim<CredentialRepo, PortfolioRepo, M> {
    /// Open the JSON document at `path` and trade against `market`
    /// # Errors
    /// Returns `DbError` if the document cannot be opened or is corrupt
    pub async fn open_with_market(
        path: impl Into<PathBuf>,
        market: M,
        config: SimConfig,
    ) -> Result<Self, DbError> {
        let store = JsonFileStore::open(path, &[USERS_TABLE, PORTFOLIOS_TABLE]).await?;
        Ok(Self::with_parts(
            store.repo(USERS_TABLE),
            store.repo(PORTFOLIOS_TABLE),
            market,
            config,
        ))
    }
}

impl<C, P, M> StockSim<C, P, M>
where
    C: Repository<Credential, UserId>,
    P: Repository<Portfolio, UserId>,
    M: MarketData,
{
    #[must_use]
    pub fn with_parts(credentials: C, portfolios: P, market: M, config: SimConfig) -> Self {
        Self {
            credentials,
            portfolios,
            market,
            config,
            locks: IdentityLocks::new(),
        }
    }

    #[must_use]
    pub fn market(&self) -> &M {
        &self.market
    }

    fn engine(&self) -> SettlementEngine<'_, M> {
        SettlementEngine::new(&self.market, self.config.fx_policy)
    }

    /// Create an account and its starting portfolio
    /// # Errors
    /// - `AuthError::InvalidRequest` if the identity or secret is blank
    /// - `AuthError::DuplicateIdentity` if the identity is taken; the existing account is untouched
    /// - `AuthError::Hashing` / `AuthError::DbError` on infrastructure failures
    pub async fn register(&self, identity: &str, secret: &str) -> Result<Portfolio, AuthError> {
        let (identity, secret) = normalise_login(identity, secret)?;
        // Hashed outside the identity lock
        let credential = self.config.credential_hasher.spawn_hash(secret).await?;
        let _guard = self.locks.acquire(&identity).await;

        if self.credentials.contains(&identity).await? {
            warn!("Registration refused, {identity} already exists");
            return Err(AuthError::DuplicateIdentity);
        }

        match self.credentials.insert(identity.clone(), credential).await {
            Err(DbError::AlreadyExists { .. }) => return Err(AuthError::DuplicateIdentity),
            other => other?,
        }

        let portfolio = Portfolio::new(
            identity.clone(),
            self.config.starting_cash,
            &self.config.base_currency,
        );
        if let Err(e) = self
            .portfolios
            .insert(identity.clone(), portfolio.clone())
            .await
        {
            error!("Failed to create portfolio for {identity}: {e}");
            if let Err(cleanup) = self.credentials.remove(identity.clone()).await {
                error!("Failed to roll back credential of {identity}: {cleanup}");
            }
            return Err(e.into());
        }

        info!(
            "Registered {identity} with {:.2} {}",
            portfolio.cash, portfolio.currency
        );
        Ok(portfolio)
    }

    /// Check a user's secret and return their portfolio
    /// # Errors
    /// - `AuthError::InvalidRequest` if the identity or secret is blank
    /// - `AuthError::UnknownIdentity` / `AuthError::InvalidCredential` on a failed login
    /// - `AuthError::PortfolioNotFound` if the account has no portfolio
    pub async fn login(&self, identity: &str, secret: &str) -> Result<Portfolio, AuthError> {
        let (identity, secret) = normalise_login(identity, secret)?;

        let credential = self
            .credentials
            .get(&identity)
            .await?
            .ok_or(AuthError::UnknownIdentity)?;
        if let Err(e) = credential.spawn_verify(secret).await {
            warn!("Failed login for {identity}: {e}");
            return Err(e);
        }

        let portfolio = self
            .portfolios
            .get(&identity)
            .await?
            .ok_or(AuthError::PortfolioNotFound)?;
        info!("{identity} logged in");
        Ok(portfolio)
    }

    /// # Errors
    /// - `PortfolioError::NotFound` if the identity has no portfolio
    /// - `PortfolioError::DbError` if the store fails
    pub async fn get_portfolio(&self, identity: &str) -> Result<Portfolio, PortfolioError> {
        self.portfolios
            .get(&normalise_identity(identity))
            .await?
            .ok_or(PortfolioError::NotFound)
    }

    /// Settle a trade for `identity` and persist the result.
    ///
    /// Trades for the same identity are applied one at a time.
    /// # Errors
    /// - `TradeError::PortfolioNotFound` if the identity has no portfolio
    /// - any settlement error, in which case nothing is persisted
    pub async fn trade(
        &self,
        identity: &str,
        request: &TradeRequest,
    ) -> Result<Portfolio, TradeError> {
        let id = normalise_identity(identity);
        let _guard = self.locks.acquire(&id).await;

        let mut portfolio = self
            .portfolios
            .get(&id)
            .await?
            .ok_or(TradeError::PortfolioNotFound)?;
        let transaction = self.engine().execute_trade(&mut portfolio, request)?;
        self.portfolios.update(id, portfolio.clone()).await?;

        info!(
            "{} {} {} {} at {:.2} {} (total {:.2})",
            portfolio.user_id,
            transaction.direction.past_tense(),
            transaction.shares,
            transaction.ticker,
            transaction.price,
            portfolio.currency,
            transaction.total
        );
        Ok(portfolio)
    }

    /// Value the portfolio of `identity` at current prices
    /// # Errors
    /// - `PortfolioError::NotFound` if the identity has no portfolio
    /// - `PortfolioError::Pricing` if a holding cannot be priced
    pub async fn valuation(&self, identity: &str) -> Result<PortfolioValuation, PortfolioError> {
        let portfolio = self.get_portfolio(identity).await?;
        Ok(value_portfolio(
            &portfolio,
            &self.market,
            self.config.fx_policy,
        )?)
    }

    /// Instruments matching `term` by ticker or name; all of them for a blank term
    #[must_use]
    pub fn search_stocks(&self, term: &str) -> Vec<Instrument> {
        market::search(&self.market, term)
    }

    /// Current quote of `ticker` in its own currency
    /// # Errors
    /// Returns `PricingError::UnknownTicker` if the ticker is not listed
    pub fn quote(&self, ticker: &str) -> Result<PriceQuote, PricingError> {
        self.market
            .quote(ticker.trim())
            .ok_or_else(|| PricingError::UnknownTicker(ticker.trim().to_uppercase()))
    }
}
