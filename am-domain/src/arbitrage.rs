use std::cmp::Reverse;
use std::collections::HashMap;

use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::refining::{calculate as calculate_refining, RefiningRequest};
use crate::{CalculationError, City, CityBonusTable, ItemId, PlayerConfig, PriceQuote, ResourceCategory, Tier};

/// Per-city market view of one item: what buying costs (cheapest sell
/// offer), what selling pays (best buy order), and how liquid the market
/// has been. Sides without data are `None`, never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityQuote {
    pub city: City,
    pub buy_cost: Option<f64>,
    pub sell_proceeds: Option<f64>,
    pub volume: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub item_id: ItemId,
    pub buy_city: City,
    pub sell_city: City,
    pub margin_per_unit: f64,
    pub margin_pct: f64,
    /// Liquidity estimate: the thinner side of the pair's historical volume.
    pub estimated_volume: u64,
}

/// A transport-and-refine plan: buy raw in one city, refine where the
/// production bonus lives, sell refined in another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefiningPlan {
    pub tier: Tier,
    pub resource: ResourceCategory,
    pub buy_city: City,
    pub refine_city: City,
    pub sell_city: City,
    pub net_profit: f64,
    pub profit_margin_pct: f64,
}

#[derive(Debug, Clone)]
pub struct ArbitrageScanner {
    top_k: usize,
}

impl Default for ArbitrageScanner {
    fn default() -> Self {
        ArbitrageScanner { top_k: 5 }
    }
}

impl ArbitrageScanner {
    pub fn new(top_k: usize) -> Self {
        ArbitrageScanner { top_k }
    }

    /// Ranks buy/sell city pairs for one item by margin, ties broken by the
    /// more liquid pair. Pairs missing a quote on either side are omitted
    /// entirely rather than scored as zero.
    pub fn scan(&self, item_id: &ItemId, quotes: &[CityQuote]) -> Vec<ArbitrageOpportunity> {
        let buys = quotes.iter().filter(|q| q.buy_cost.is_some()).collect_vec();
        let sells = quotes.iter().filter(|q| q.sell_proceeds.is_some()).collect_vec();

        buys.iter()
            .cartesian_product(sells.iter())
            .filter(|(buy, sell)| buy.city != sell.city)
            .filter_map(|(buy, sell)| {
                let buy_cost = buy.buy_cost?;
                let sell_proceeds = sell.sell_proceeds?;
                let margin = sell_proceeds - buy_cost;
                if margin <= 0.0 {
                    return None;
                }
                Some(ArbitrageOpportunity {
                    item_id: item_id.clone(),
                    buy_city: buy.city,
                    sell_city: sell.city,
                    margin_per_unit: margin,
                    margin_pct: margin / buy_cost * 100.0,
                    estimated_volume: buy.volume.unwrap_or(0).min(sell.volume.unwrap_or(0)),
                })
            })
            .sorted_by_key(|opp| (Reverse(OrderedFloat(opp.margin_per_unit)), Reverse(opp.estimated_volume)))
            .take(self.top_k)
            .collect_vec()
    }

    /// Ranks refine-and-resell plans: raw bought at its cheapest city,
    /// refined in the optimal-bonus city, sold into each city with refined
    /// demand. Cities lacking either price are skipped.
    pub fn scan_refining(
        &self,
        bonus_table: &CityBonusTable,
        config: &PlayerConfig,
        tier: Tier,
        resource: ResourceCategory,
        raw_quotes: &[CityQuote],
        refined_quotes: &[CityQuote],
        input_qty: u32,
    ) -> Result<Vec<RefiningPlan>, CalculationError> {
        let Some((buy_city, raw_price)) = raw_quotes
            .iter()
            .filter_map(|q| q.buy_cost.map(|cost| (q.city, cost)))
            .min_by_key(|(_, cost)| OrderedFloat(*cost))
        else {
            return Ok(Vec::new());
        };

        let refine_city = bonus_table.optimal_refining_city(resource);

        let mut plans = Vec::new();
        for (sell_city, refined_price) in refined_quotes.iter().filter_map(|q| q.sell_proceeds.map(|p| (q.city, p))) {
            let request = RefiningRequest {
                tier,
                resource,
                city: refine_city,
                raw_price,
                refined_sell_price: refined_price,
                input_qty,
            };
            let result = calculate_refining(bonus_table, config, &request)?;
            if result.net_profit > 0.0 {
                plans.push(RefiningPlan {
                    tier,
                    resource,
                    buy_city,
                    refine_city,
                    sell_city,
                    net_profit: result.net_profit,
                    profit_margin_pct: result.profit_margin_pct,
                });
            }
        }

        plans.sort_by_key(|plan| Reverse(OrderedFloat(plan.net_profit)));
        plans.truncate(self.top_k);
        Ok(plans)
    }
}

/// Best prices per city across quality levels: the lowest non-zero sell
/// offer (what buying costs) and the highest buy order (what selling pays).
pub fn best_prices_by_city<'a>(quotes: impl IntoIterator<Item = &'a PriceQuote>) -> HashMap<City, (u64, u64)> {
    let mut best: HashMap<City, (u64, u64)> = HashMap::new();
    for quote in quotes {
        let entry = best.entry(quote.city).or_insert((0, 0));
        if quote.sell_price_min > 0 && (entry.0 == 0 || quote.sell_price_min < entry.0) {
            entry.0 = quote.sell_price_min;
        }
        entry.1 = entry.1.max(quote.buy_price_max);
    }
    best
}

/// Collapses per-(city) price quotes and optional history into the scanner's
/// per-city view. Zero prices (empty book sides) become `None`.
pub fn city_quotes(prices_by_city: &HashMap<City, (u64, u64)>, volume_by_city: &HashMap<City, u64>) -> Vec<CityQuote> {
    prices_by_city
        .iter()
        .map(|(city, (sell_price_min, buy_price_max))| CityQuote {
            city: *city,
            buy_cost: (*sell_price_min > 0).then_some(*sell_price_min as f64),
            sell_proceeds: (*buy_price_max > 0).then_some(*buy_price_max as f64),
            volume: volume_by_city.get(city).copied(),
        })
        .sorted_by_key(|q| q.city)
        .collect_vec()
}
