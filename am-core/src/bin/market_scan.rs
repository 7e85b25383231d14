use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use strum::IntoEnumIterator;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use am_core::reqwest_helpers::create_client;
use am_core::{AodpClient, BatchFailure, MarketApi, MarketConfig, PriceRepository, RequestBudget};
use am_domain::{
    best_prices_by_city, city_quotes, raw_item_id, refined_item_id, ArbitrageScanner, City, CityBonusTable, ItemId, PlayerConfig, RefiningRequest,
    ResourceCategory, Tier,
};

#[derive(Clone, Parser)]
#[command(version, about = "Scan the Albion market for profit opportunities", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Subcommand)]
enum Commands {
    /// Ranks buy/sell city pairs for one item
    Scan {
        /// API item id, e.g. T4_BAG
        #[arg(long)]
        item: String,
        /// History window feeding the liquidity tie-break
        #[arg(long, default_value_t = 7)]
        days: u32,
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
    /// Ranks refine-and-resell plans for a resource tier
    Refine {
        #[arg(long, default_value = "T5")]
        tier: String,
        #[arg(long, default_value = "Ore")]
        resource: String,
        #[arg(long, default_value_t = 100)]
        quantity: u32,
        #[arg(long, default_value_t = 5)]
        top: usize,
        #[arg(long, env("AM_PREMIUM"), default_value_t = false)]
        premium: bool,
        #[arg(long, env("AM_FOCUS_POINTS"), default_value_t = 0)]
        focus_points: u64,
    },
}

/// Fetch deadline for one scan invocation.
const SCAN_DEADLINE: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry().with(fmt::layer()).with(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = MarketConfig::from_env().map_err(anyhow::Error::msg)?;

    let budget = Arc::new(RequestBudget::per_minute(config.rate_limit_per_minute));
    let client = create_client(budget, config.request_timeout);
    let api: Arc<dyn MarketApi> = Arc::new(AodpClient::new(client, config.base_url()));
    let repository = PriceRepository::new(api, &config);

    match cli.command {
        Commands::Scan { item, days, top } => scan_item(&repository, ItemId::new(item), days, top).await,
        Commands::Refine {
            tier,
            resource,
            quantity,
            top,
            premium,
            focus_points,
        } => {
            let tier = Tier::from_str(&tier).map_err(|e| anyhow::anyhow!("invalid tier '{tier}': {e}"))?;
            let resource = ResourceCategory::from_str(&resource).map_err(|e| anyhow::anyhow!("invalid resource '{resource}': {e}"))?;
            let player = PlayerConfig {
                premium,
                use_focus: focus_points > 0,
                focus_points,
                ..PlayerConfig::default()
            };
            scan_refining(&repository, tier, resource, quantity, top, &player).await
        }
    }
}

async fn scan_item(repository: &PriceRepository, item: ItemId, days: u32, top: usize) -> Result<()> {
    let cities: Vec<City> = City::iter().collect();
    let outcome = repository.current_prices(&[item.clone()], &cities, Some(SCAN_DEADLINE)).await;
    report_failures(&outcome.failures);

    let quotes = outcome.prices.values().flatten();
    let best = best_prices_by_city(quotes);

    let mut volumes: HashMap<City, u64> = HashMap::new();
    for city in &cities {
        match repository.history(&item, *city, days).await {
            Ok(history) => {
                volumes.insert(*city, history.iter().map(|h| h.total_volume()).sum());
            }
            Err(error) => eprintln!("no history for {city}: {error}"),
        }
    }

    let opportunities = ArbitrageScanner::new(top).scan(&item, &city_quotes(&best, &volumes));
    if opportunities.is_empty() {
        println!("No profitable city pair found for {item}.");
        return Ok(());
    }

    println!("Top opportunities for {item}:");
    for (rank, opp) in opportunities.iter().enumerate() {
        println!(
            "{}. buy in {} -> sell in {}: {:.0} silver/unit ({:.1}%), ~{} units/day traded",
            rank + 1,
            opp.buy_city,
            opp.sell_city,
            opp.margin_per_unit,
            opp.margin_pct,
            opp.estimated_volume / days.max(1) as u64,
        );
    }

    let stats = repository.stats();
    println!("(cache: {} hits / {} misses)", stats.hits, stats.misses);
    Ok(())
}

async fn scan_refining(repository: &PriceRepository, tier: Tier, resource: ResourceCategory, quantity: u32, top: usize, player: &PlayerConfig) -> Result<()> {
    let cities: Vec<City> = City::iter().collect();
    let raw_item = raw_item_id(tier, resource, 0);
    let refined_item = refined_item_id(tier, resource, 0);

    let outcome = repository
        .current_prices(&[raw_item.clone(), refined_item.clone()], &cities, Some(SCAN_DEADLINE))
        .await;
    report_failures(&outcome.failures);

    let raw_best = best_prices_by_city(outcome.prices.iter().filter(|((id, _), _)| *id == raw_item).flat_map(|(_, quotes)| quotes));
    let refined_best = best_prices_by_city(outcome.prices.iter().filter(|((id, _), _)| *id == refined_item).flat_map(|(_, quotes)| quotes));

    let no_volumes = HashMap::new();
    let raw_quotes = city_quotes(&raw_best, &no_volumes);
    let refined_quotes = city_quotes(&refined_best, &no_volumes);

    let bonus_table = CityBonusTable::current();
    let plans = ArbitrageScanner::new(top)
        .scan_refining(&bonus_table, player, tier, resource, &raw_quotes, &refined_quotes, quantity)
        .context("refining scan failed")?;

    if plans.is_empty() {
        println!("No profitable refining plan for {tier} {resource}.");
        return Ok(());
    }

    println!("Top refining plans for {quantity}x {tier} {resource}:");
    for (rank, plan) in plans.iter().enumerate() {
        println!(
            "{}. buy raw in {}, refine in {}, sell in {}: {:.0} silver net ({:.1}% margin)",
            rank + 1,
            plan.buy_city,
            plan.refine_city,
            plan.sell_city,
            plan.net_profit,
            plan.profit_margin_pct,
        );
    }

    // Show what the processed quantity actually was under the focus budget.
    if player.use_focus {
        if let Some((_, raw_price)) = raw_best.iter().map(|(c, (sell, _))| (*c, *sell)).filter(|(_, p)| *p > 0).min_by_key(|(_, p)| *p) {
            if let Some((_, refined_price)) = refined_best.iter().map(|(c, (_, buy))| (*c, *buy)).max_by_key(|(_, p)| *p) {
                let request = RefiningRequest {
                    tier,
                    resource,
                    city: bonus_table.optimal_refining_city(resource),
                    raw_price: raw_price as f64,
                    refined_sell_price: refined_price as f64,
                    input_qty: quantity,
                };
                if let Ok(result) = am_domain::refining::calculate(&bonus_table, player, &request) {
                    println!(
                        "Focus budget covers {:.0} of {} units ({:.0} focus spent).",
                        result.input_qty, quantity, result.focus_points_spent
                    );
                }
            }
        }
    }

    Ok(())
}

fn report_failures(failures: &[BatchFailure]) {
    for failure in failures {
        eprintln!("warning: {} items unresolved ({})", failure.item_ids.len(), failure.error);
    }
}
