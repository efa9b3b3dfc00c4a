//! optimize-portfolio: minimum-variance allocation with risk and tax diagnostics.
//!
//! Usage:
//!   cargo run -p optimizer-cli -- --symbols AAPL MSFT BND --period 5y
//!   cargo run -p optimizer-cli -- --tax-status retirement --json
//!   cargo run -p optimizer-cli -- --csv prices.csv

use anyhow::{bail, Context};
use polygon_client::PolygonClient;
use portfolio_core::{OptimizationReport, PriceHistoryProvider, TaxStatus};
use portfolio_service::{CsvPriceProvider, OptimizationConfig, PortfolioOptimizationService};
use std::sync::Arc;

const DEFAULT_SYMBOLS: &[&str] = &[
    // Tech
    "AAPL", "GOOGL", "MSFT", "AMZN",
    // Consumer staples
    "JNJ", "PG", "KO",
    // Bond ETFs
    "BND", "AGG",
    // Broad market ETFs
    "VTI", "SPY",
];
const DEFAULT_PERIOD: &str = "5y";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "optimize_portfolio=info,portfolio_service=info,portfolio_optimizer=warn,polygon_client=warn".into()
            }),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let as_json = args.iter().any(|a| a == "--json");
    let flag_value = |flag: &str| -> Option<&str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(|s| s.as_str())
    };

    let mut config = OptimizationConfig::from_env()?;
    if let Some(status) = flag_value("--tax-status") {
        config.tax_status = TaxStatus::from(status.to_string());
    }
    if let Some(capital) = flag_value("--capital") {
        config.initial_capital = capital
            .parse()
            .with_context(|| format!("--capital expects a number, got '{}'", capital))?;
    }
    if let Some(tolerance) = flag_value("--risk-tolerance") {
        config.risk_tolerance = tolerance
            .parse()
            .with_context(|| format!("--risk-tolerance expects a number, got '{}'", tolerance))?;
    }
    let period = flag_value("--period").unwrap_or(DEFAULT_PERIOD).to_string();

    let requested: Vec<String> = args
        .iter()
        .position(|a| a == "--symbols")
        .map(|idx| {
            args[idx + 1..]
                .iter()
                .take_while(|a| !a.starts_with("--"))
                .map(|s| s.to_uppercase())
                .collect()
        })
        .unwrap_or_default();

    let (provider, symbols): (Arc<dyn PriceHistoryProvider>, Vec<String>) = match flag_value("--csv") {
        Some(path) => {
            let csv = CsvPriceProvider::from_path(path)?;
            let symbols = if requested.is_empty() { csv.tickers() } else { requested };
            tracing::info!("Using price history from {}", path);
            (Arc::new(csv), symbols)
        }
        None => {
            let api_key = std::env::var("POLYGON_API_KEY")
                .context("POLYGON_API_KEY must be set (or pass --csv PATH)")?;
            let symbols = if requested.is_empty() {
                DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect()
            } else {
                requested
            };
            (Arc::new(PolygonClient::new(api_key)), symbols)
        }
    };

    if symbols.is_empty() {
        bail!("no symbols to optimize");
    }

    tracing::info!(
        "optimize-portfolio: {} symbols, period={}, tax_status={}",
        symbols.len(),
        period,
        config.tax_status
    );

    let service = PortfolioOptimizationService::new(provider, config)?;
    let report = service.run(&symbols, &period).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &OptimizationReport) {
    println!("Portfolio Weights ({} periods)", report.observations);
    for w in &report.weights {
        println!(
            "  {:<8} {:>7.2}%  ${:>12.2}",
            w.ticker,
            w.weight * 100.0,
            w.weight * report.initial_capital
        );
    }
    if !report.excluded_tickers.is_empty() {
        println!("  excluded (no data): {}", report.excluded_tickers.join(", "));
    }

    println!();
    println!("Expected annual return: {:>8.2}%", report.expected_annual_return * 100.0);
    println!("Annual volatility:      {:>8.2}%", report.annual_volatility * 100.0);

    println!();
    println!("Tax Efficiency ({})", report.tax_status);
    println!("  portfolio: {:.4}", report.tax_efficiency.portfolio);
    for (ticker, liability) in &report.tax_efficiency.per_asset {
        println!("  {:<8} {:.4}", ticker, liability);
    }

    println!();
    println!("Loss Harvesting Recommendations");
    if report.loss_harvesting.is_empty() {
        println!("  none");
    }
    for candidate in report.loss_harvesting.values() {
        println!(
            "  {:<8} sell  {:>7.2}%  {}",
            candidate.asset, candidate.loss_percentage, candidate.reason
        );
    }

    println!();
    let risk = &report.risk_profile;
    println!("Risk Profile");
    println!("  volatility:    {:.4}", risk.volatility);
    match risk.sharpe_ratio {
        Some(sharpe) => println!("  sharpe ratio:  {:.4}", sharpe),
        None => println!("  sharpe ratio:  undefined (zero volatility)"),
    }
    println!("  max drawdown:  {:.2}%", risk.max_drawdown * 100.0);
    println!("  VaR:           {:.2}%", risk.value_at_risk * 100.0);
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  optimize-portfolio [--symbols AAPL MSFT ...] [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --symbols T1 T2 ...     Tickers to allocate (default: {})", DEFAULT_SYMBOLS.join(" "));
    eprintln!("  --period P              History window, e.g. 5y, 6mo, ytd (default: {})", DEFAULT_PERIOD);
    eprintln!("  --tax-status S          standard | retirement | high_income");
    eprintln!("  --capital N             Initial capital, informational");
    eprintln!("  --risk-tolerance N      Accepted, not yet used by the optimizer");
    eprintln!("  --csv PATH              Read closes from a wide CSV instead of Polygon");
    eprintln!("  --json                  Print the report as JSON");
}
