use std::net::SocketAddr;
use std::path::PathBuf;

use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use domain::core::SimConfig;
use domain::market::FxPolicy;

lazy_static::lazy_static! {
    pub static ref PROJECT_NAME: String = String::from("StockSim").to_uppercase();
}

const DEFAULT_BIND: &str = "127.0.0.1:3001";
const DB_FILE: &str = "db.json";

/// Get the data directory for the application
pub fn get_data_dir() -> PathBuf {
    let project_name = PROJECT_NAME.clone().to_lowercase();

    if let Ok(data_dir) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(data_dir).join(&project_name)
    } else if let Ok(home_dir) = std::env::var("HOME") {
        PathBuf::from(home_dir)
            .join(".local")
            .join("share")
            .join(&project_name)
    } else {
        // Fallback to current directory if no home directory is found
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(&project_name)
    }
}

/// Name of a setting in the environment, e.g. `STOCKSIM_BIND`
pub fn env_key(setting: &str) -> String {
    format!("{}_{setting}", *PROJECT_NAME)
}

/// Load `.env` into the process environment, returning its path if one was found.
/// Call before `logging::init` so the file can set the log filter.
pub fn load_dotenv() -> Result<Option<PathBuf>> {
    dotenv_outcome(dotenvy::dotenv())
}

fn dotenv_outcome(result: dotenvy::Result<PathBuf>) -> Result<Option<PathBuf>> {
    match result {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e).wrap_err(".env could not be loaded"),
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub sim: SimConfig,
}

impl AppConfig {
    /// Read the settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |setting: &str| {
            lookup(&env_key(setting))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_addr = get("BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse::<SocketAddr>()
            .wrap_err_with(|| format!("{} is not a socket address", env_key("BIND")))?;

        let db_path = get("DB_PATH").map_or_else(|| get_data_dir().join(DB_FILE), PathBuf::from);

        let mut sim = SimConfig::default();
        if let Some(cash) = get("STARTING_CASH") {
            let cash = cash
                .parse::<f64>()
                .wrap_err_with(|| format!("{} is not a number", env_key("STARTING_CASH")))?;
            if !cash.is_finite() || cash < 0.0 {
                return Err(eyre!(
                    "{} must be a non-negative amount, got {cash}",
                    env_key("STARTING_CASH")
                ));
            }
            sim.starting_cash = cash;
        }
        if let Some(currency) = get("BASE_CURRENCY") {
            sim.base_currency = currency.to_uppercase();
        }
        if let Some(flag) = get("FX_FALLBACK") {
            sim.fx_policy = if parse_flag(&flag)
                .ok_or_else(|| eyre!("{} must be true or false", env_key("FX_FALLBACK")))?
            {
                FxPolicy::FallbackToParity
            } else {
                FxPolicy::Strict
            };
        }

        Ok(Self {
            bind_addr,
            db_path,
            sim,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
