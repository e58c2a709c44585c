use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use domain::core::{SimConfig, StockSim};
use domain::settlement::{TradeError, TradeRequest};
use domain::user::CredentialHasher;
use hdrhistogram::Histogram;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "stocksim-benchmark")]
#[command(about = "Concurrent trading load against a StockSim JSON store")]
struct Args {
    /// Number of concurrent clients
    #[arg(short, long, default_value_t = 10)]
    clients: usize,

    /// Duration of the test in seconds
    #[arg(short, long, default_value_t = 30)]
    duration: u64,

    /// Number of test users to register
    #[arg(long, default_value_t = 20)]
    test_users: usize,

    /// Largest share count of a single trade
    #[arg(long, default_value_t = 20)]
    max_shares: u64,

    /// Store file to use instead of a temporary one
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[derive(Debug)]
struct BenchmarkMetrics {
    pub trades_submitted: AtomicU64,
    pub trades_accepted: AtomicU64,
    pub trades_rejected: AtomicU64,
    pub trades_failed: AtomicU64,
    /// Accepted trades per test user, checked against the stored history at the end
    pub accepted_per_user: Vec<AtomicU64>,
    pub latency_histogram: Mutex<Histogram<u64>>,
    pub start_time: Instant,
}

impl BenchmarkMetrics {
    fn new(users: usize) -> Result<Self> {
        Ok(Self {
            trades_submitted: AtomicU64::new(0),
            trades_accepted: AtomicU64::new(0),
            trades_rejected: AtomicU64::new(0),
            trades_failed: AtomicU64::new(0),
            accepted_per_user: (0..users).map(|_| AtomicU64::new(0)).collect(),
            // Microseconds, up to one minute
            latency_histogram: Mutex::new(Histogram::new_with_bounds(1, 60_000_000, 3)?),
            start_time: Instant::now(),
        })
    }

    fn record(&self, user_idx: usize, outcome: &Result<(), TradeError>, latency: Duration) {
        self.trades_submitted.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Ok(()) => {
                self.trades_accepted.fetch_add(1, Ordering::Relaxed);
                self.accepted_per_user[user_idx].fetch_add(1, Ordering::Relaxed);
            }
            Err(
                TradeError::InsufficientFunds { .. }
                | TradeError::InsufficientShares { .. }
                | TradeError::UnsupportedCurrencyPair { .. },
            ) => {
                self.trades_rejected.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.trades_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        if let Ok(mut hist) = self.latency_histogram.lock() {
            let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
            // Clamps to the histogram bounds instead of dropping outliers
            hist.saturating_record(micros.max(1));
        }
    }

    fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let submitted = self.trades_submitted.load(Ordering::Relaxed) as f64;
        if elapsed > 0.0 {
            submitted / elapsed
        } else {
            0.0
        }
    }

    fn print_report(&self) {
        let submitted = self.trades_submitted.load(Ordering::Relaxed);
        let accepted = self.trades_accepted.load(Ordering::Relaxed);
        let rejected = self.trades_rejected.load(Ordering::Relaxed);
        let failed = self.trades_failed.load(Ordering::Relaxed);
        let elapsed = self.start_time.elapsed().as_secs_f64();

        println!("\n=== STOCKSIM BENCHMARK RESULTS ===");
        println!("Test Duration: {elapsed:.2} seconds");
        println!("Trades Submitted: {submitted}");
        println!("Trades Accepted: {accepted}");
        println!("Trades Rejected (funds/shares/fx): {rejected}");
        println!("Trades Failed: {failed}");
        println!("Throughput: {:.2} trades/s", self.get_throughput());

        if let Ok(hist) = self.latency_histogram.lock() {
            println!("\n=== LATENCY DISTRIBUTION (µs) ===");
            println!("Min: {}", hist.min());
            println!("P50: {}", hist.value_at_quantile(0.50));
            println!("P90: {}", hist.value_at_quantile(0.90));
            println!("P95: {}", hist.value_at_quantile(0.95));
            println!("P99: {}", hist.value_at_quantile(0.99));
            println!("Max: {}", hist.max());
        }
    }
}

async fn setup_test_users(sim: &StockSim, num_users: usize) -> Result<Vec<String>> {
    info!("Registering {num_users} test users...");
    let mut users = Vec::with_capacity(num_users);
    for i in 0..num_users {
        let user = format!("bench_user_{i}");
        sim.register(&user, "password123")
            .await
            .map_err(|e| eyre!("Failed to register {user}: {e}"))?;
        users.push(user);
    }
    Ok(users)
}

async fn benchmark_worker(
    worker_id: usize,
    sim: Arc<StockSim>,
    users: Arc<Vec<String>>,
    tickers: Arc<Vec<String>>,
    metrics: Arc<BenchmarkMetrics>,
    should_stop: Arc<AtomicBool>,
    max_shares: u64,
) {
    let mut rng = StdRng::from_os_rng();
    info!("Worker {worker_id} started");

    while !should_stop.load(Ordering::Relaxed) {
        let user_idx = rng.random_range(0..users.len());
        let ticker = &tickers[rng.random_range(0..tickers.len())];
        let shares = rng.random_range(1..=max_shares);
        let request = if rng.random_bool(0.5) {
            TradeRequest::buy(ticker, shares)
        } else {
            TradeRequest::sell(ticker, shares)
        };

        let started = Instant::now();
        let outcome = sim
            .trade(&users[user_idx], &request)
            .await
            .map(|_| ());
        let latency = started.elapsed();

        if let Err(e) = &outcome {
            if matches!(e, TradeError::DbError(_) | TradeError::PortfolioNotFound) {
                warn!("Worker {worker_id} trade failed: {e}");
            }
        }
        metrics.record(user_idx, &outcome, latency);
    }

    info!("Worker {worker_id} stopped");
}

/// Check every test user's portfolio against what the workers observed
async fn verify_portfolios(
    sim: &StockSim,
    users: &[String],
    metrics: &BenchmarkMetrics,
) -> Result<()> {
    let mut violations = 0usize;
    for (idx, user) in users.iter().enumerate() {
        let portfolio = sim
            .get_portfolio(user)
            .await
            .map_err(|e| eyre!("Failed to read portfolio of {user}: {e}"))?;
        let accepted = metrics.accepted_per_user[idx].load(Ordering::Relaxed);

        if portfolio.history.len() as u64 != accepted {
            warn!(
                "{user}: {} transactions stored, {accepted} trades accepted",
                portfolio.history.len()
            );
            violations += 1;
        }
        if portfolio.cash < 0.0 {
            warn!("{user}: negative cash {:.2}", portfolio.cash);
            violations += 1;
        }
        if let Some(empty) = portfolio.holdings.values().find(|h| h.shares == 0) {
            warn!("{user}: zero-share holding {}", empty.ticker);
            violations += 1;
        }
    }

    if violations > 0 {
        return Err(eyre!("{violations} invariant violations"));
    }
    println!("\n=== INVARIANTS ===");
    println!("All {} portfolios consistent ✓", users.len());
    Ok(())
}

async fn run_benchmark(args: Args) -> Result<()> {
    if args.test_users == 0 || args.clients == 0 || args.max_shares == 0 {
        return Err(eyre!("clients, test users and max shares must be positive"));
    }

    let temp_dir = tempfile::tempdir()?;
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| temp_dir.path().join("db.json"));
    info!("Using store at {}", db_path.display());

    let config = SimConfig {
        // Registration cost is not what is being measured
        credential_hasher: CredentialHasher::insecure_fast(),
        ..SimConfig::default()
    };
    let sim = StockSim::open(db_path.clone(), config.clone())
        .await
        .wrap_err("Failed to open store")?;

    let users = Arc::new(setup_test_users(&sim, args.test_users).await?);
    let tickers: Arc<Vec<String>> = Arc::new(
        sim.search_stocks("")
            .into_iter()
            .map(|instrument| instrument.ticker)
            .collect(),
    );
    let sim = Arc::new(sim);

    let metrics = Arc::new(BenchmarkMetrics::new(users.len())?);
    let should_stop = Arc::new(AtomicBool::new(false));

    let mut handles = Vec::new();
    for worker_id in 0..args.clients {
        handles.push(tokio::spawn(benchmark_worker(
            worker_id,
            Arc::clone(&sim),
            Arc::clone(&users),
            Arc::clone(&tickers),
            Arc::clone(&metrics),
            Arc::clone(&should_stop),
            args.max_shares,
        )));
    }

    // Status reporting task
    let status_handle = {
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                info!(
                    "Status: {} submitted, {} accepted, {} rejected, {:.2} trades/s",
                    metrics.trades_submitted.load(Ordering::Relaxed),
                    metrics.trades_accepted.load(Ordering::Relaxed),
                    metrics.trades_rejected.load(Ordering::Relaxed),
                    metrics.get_throughput()
                );
            }
        })
    };

    sleep(Duration::from_secs(args.duration)).await;

    should_stop.store(true, Ordering::Relaxed);
    status_handle.abort();
    for handle in handles {
        handle.await?;
    }

    metrics.print_report();
    verify_portfolios(&sim, &users, &metrics).await?;

    // Everything accepted must also be on disk
    let reopened = StockSim::open(db_path, config)
        .await
        .wrap_err("Failed to reopen store")?;
    verify_portfolios(&reopened, &users, &metrics).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("benchmark=info".parse()?),
        )
        .init();

    let args = Args::parse();

    info!("StockSim benchmark");
    info!("Configuration: {:?}", args);

    run_benchmark(args).await
}
