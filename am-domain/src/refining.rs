use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tracing::warn;

use crate::{base_focus_cost, CalculationError, City, CityBonusTable, PlayerConfig, ResourceCategory, Specialization, Tier};

/// Production-station baseline in the return-rate formula. Always present;
/// only the city's local production bonus adds to it. Neither focus nor
/// premium ever enters the return rate.
const STATION_BASE_BONUS: f64 = 0.59;

/// Premium is +5% focus *efficiency*: every point does 5% more work, so the
/// per-unit cost divides by 1.05. It is never a return-rate bonus.
const PREMIUM_FOCUS_EFFICIENCY: f64 = 0.05;

/// Specialization removes up to half the base focus cost at level 100.
const SPEC_FOCUS_REDUCTION_CAP: f64 = 0.5;

/// Stacked reductions never push the effective focus cost below this
/// fraction of the base cost.
const MIN_FOCUS_COST_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefiningRequest {
    pub tier: Tier,
    pub resource: ResourceCategory,
    pub city: City,
    /// Price paid per raw resource unit.
    pub raw_price: f64,
    /// Price received per refined unit.
    pub refined_sell_price: f64,
    /// Raw units the caller wants to process.
    pub input_qty: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefiningResult {
    /// Raw units actually processed; smaller than requested when the focus
    /// balance could not cover the full quantity.
    pub input_qty: f64,
    pub output_qty: f64,
    pub return_rate: f64,
    /// Whole bonus units returned by the production chain.
    pub resources_returned: u64,
    pub focus_points_spent: f64,
    pub focus_cost_silver: f64,
    pub material_cost: f64,
    pub tax: f64,
    pub sell_revenue: f64,
    pub net_profit: f64,
    pub profit_margin_pct: f64,
}

/// `1 − 1/(1 + 0.59 + LPB)`; cities without a bonus contribute LPB = 0.
pub fn return_rate(bonus_table: &CityBonusTable, city: City, resource: ResourceCategory) -> f64 {
    let lpb = bonus_table.local_production_bonus_or_zero(city, resource);
    1.0 - 1.0 / (1.0 + STATION_BASE_BONUS + lpb)
}

/// Clamps a specialization level into [0, 100], warning on out-of-range
/// input instead of failing the calculation.
pub fn clamp_specialization(level: i32) -> f64 {
    if !(0..=100).contains(&level) {
        warn!(level, "specialization level outside [0, 100], clamping");
    }
    level.clamp(0, 100) as f64
}

/// `1 − (specialization/100) · 0.5`, after clamping.
pub fn focus_cost_multiplier(specialization: i32) -> f64 {
    1.0 - clamp_specialization(specialization) / 100.0 * SPEC_FOCUS_REDUCTION_CAP
}

/// Effective focus cost per processed unit: specialization, premium
/// efficiency, and gear/food reductions compose multiplicatively, floored
/// at 10% of the base cost.
pub fn effective_focus_cost_per_unit(base_cost: u32, config: &PlayerConfig, specialization: i32) -> f64 {
    let base = base_cost as f64;
    let premium_divisor = if config.premium { 1.0 + PREMIUM_FOCUS_EFFICIENCY } else { 1.0 };
    let cost = base * focus_cost_multiplier(specialization) / premium_divisor
        * (1.0 - config.equipment_focus_reduction)
        * (1.0 - config.food_focus_reduction);
    cost.max(base * MIN_FOCUS_COST_FRACTION)
}

/// Splits a requested quantity into (achieved quantity, focus spent) under
/// the focus balance: a shortfall shrinks the processed quantity pro-rata.
/// A zero balance degrades to not using focus at all.
pub(crate) fn apply_focus_budget(requested: f64, per_unit_cost: f64, config: &PlayerConfig) -> (f64, f64) {
    if !config.use_focus || config.focus_points == 0 {
        return (requested, 0.0);
    }
    let needed = requested * per_unit_cost;
    let available = config.focus_points as f64;
    if needed > available {
        (requested * available / needed, available)
    } else {
        (requested, needed)
    }
}

pub fn calculate(bonus_table: &CityBonusTable, config: &PlayerConfig, request: &RefiningRequest) -> Result<RefiningResult, CalculationError> {
    if request.raw_price <= 0.0 {
        return Err(CalculationError::invalid_price("raw resource", request.raw_price));
    }
    if request.refined_sell_price <= 0.0 {
        return Err(CalculationError::invalid_price("refined resource", request.refined_sell_price));
    }

    let rate = return_rate(bonus_table, request.city, request.resource);
    let specialization = config.specialization_level(Specialization::refining(request.resource));
    let per_unit_focus = effective_focus_cost_per_unit(base_focus_cost(request.tier), config, specialization);

    let (input_qty, focus_points_spent) = apply_focus_budget(request.input_qty as f64, per_unit_focus, config);

    let output_qty = input_qty * (1.0 + rate);
    let reduction = bonus_table.resource_reduction_or_zero(request.city, request.resource);
    let material_cost = input_qty * request.raw_price * (1.0 - reduction);
    let sell_revenue = output_qty * request.refined_sell_price;
    let tax = sell_revenue * bonus_table.tax_rate(request.city);
    let focus_cost_silver = focus_points_spent * config.silver_per_focus_point;
    let net_profit = sell_revenue - material_cost - tax - focus_cost_silver;

    let total_cost = material_cost + tax + focus_cost_silver;
    let profit_margin_pct = if total_cost > 0.0 { net_profit / total_cost * 100.0 } else { 0.0 };

    Ok(RefiningResult {
        input_qty,
        output_qty,
        return_rate: rate,
        resources_returned: (input_qty * rate).floor() as u64,
        focus_points_spent,
        focus_cost_silver,
        material_cost,
        tax,
        sell_revenue,
        net_profit,
        profit_margin_pct,
    })
}

/// Highest raw price that still breaks even for the given request, found by
/// bisecting the (monotonic in price) profit function. `None` when not even
/// the lowest bracket price is profitable.
pub fn break_even_raw_price(bonus_table: &CityBonusTable, config: &PlayerConfig, request: &RefiningRequest) -> Option<f64> {
    const TOLERANCE: f64 = 0.01;

    let mut low = 0.01;
    let mut high = request.refined_sell_price * 10.0;

    let profit_at = |raw_price: f64| {
        let probe = RefiningRequest { raw_price, ..request.clone() };
        calculate(bonus_table, config, &probe).map(|r| r.net_profit).unwrap_or(f64::NEG_INFINITY)
    };

    if profit_at(low) <= 0.0 {
        return None;
    }

    while high - low > TOLERANCE {
        let mid = (low + high) / 2.0;
        if profit_at(mid) > 0.0 {
            low = mid;
        } else {
            high = mid;
        }
    }

    Some(low)
}

/// Runs the calculation in every city (same prices) and ranks by net
/// profit, best first.
pub fn best_refining_city(bonus_table: &CityBonusTable, config: &PlayerConfig, request: &RefiningRequest) -> Vec<(City, RefiningResult)> {
    City::iter()
        .filter_map(|city| {
            let probe = RefiningRequest { city, ..request.clone() };
            calculate(bonus_table, config, &probe).ok().map(|result| (city, result))
        })
        .sorted_by_key(|(_, result)| std::cmp::Reverse(OrderedFloat(result.net_profit)))
        .collect_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn request(city: City) -> RefiningRequest {
        RefiningRequest {
            tier: Tier::T5,
            resource: ResourceCategory::Ore,
            city,
            raw_price: 100.0,
            refined_sell_price: 350.0,
            input_qty: 100,
        }
    }

    #[test]
    fn base_return_rate_without_any_bonus() {
        let table = CityBonusTable::current();
        // Caerleon has no local production bonus for ore.
        let rate = return_rate(&table, City::Caerleon, ResourceCategory::Ore);
        assert!((rate - (1.0 - 1.0 / 1.59)).abs() < 1e-12);
        assert!((rate - 0.371069).abs() < 1e-6);
    }

    #[test]
    fn local_production_bonus_raises_return_rate() {
        let table = CityBonusTable::current();
        let rate = return_rate(&table, City::Thetford, ResourceCategory::Ore);
        assert!((rate - (1.0 - 1.0 / 1.99)).abs() < 1e-12);
    }

    #[test]
    fn return_rate_stays_in_unit_interval_for_all_cities_and_resources() {
        let table = CityBonusTable::current();
        for city in City::iter() {
            for resource in ResourceCategory::iter() {
                let rate = return_rate(&table, city, resource);
                assert!((0.0..1.0).contains(&rate), "rate {rate} out of range for {city}/{resource}");
            }
        }
    }

    #[test]
    fn zero_and_negative_prices_are_rejected() {
        let table = CityBonusTable::current();
        let config = PlayerConfig::default();

        let mut bad = request(City::Thetford);
        bad.raw_price = 0.0;
        assert!(matches!(calculate(&table, &config, &bad), Err(CalculationError::InvalidPrice { .. })));

        let mut bad = request(City::Thetford);
        bad.refined_sell_price = -5.0;
        assert!(matches!(calculate(&table, &config, &bad), Err(CalculationError::InvalidPrice { .. })));
    }

    #[test]
    fn net_profit_identity_holds_exactly() {
        let table = CityBonusTable::current();
        let config = PlayerConfig {
            premium: true,
            use_focus: true,
            focus_points: 10_000,
            silver_per_focus_point: 1.5,
            ..PlayerConfig::default()
        };

        let result = calculate(&table, &config, &request(City::Thetford)).unwrap();
        let expected = result.sell_revenue - (result.material_cost + result.tax + result.focus_cost_silver);
        assert!((result.net_profit - expected).abs() < 1e-9);
    }

    #[test]
    fn worked_example_without_focus() {
        let table = CityBonusTable::current();
        let result = calculate(&table, &PlayerConfig::default(), &request(City::Thetford)).unwrap();

        let rate = 1.0 - 1.0 / 1.99;
        let output = 100.0 * (1.0 + rate);
        assert!((result.output_qty - output).abs() < 1e-9);
        // Thetford grants no material reduction for ore.
        assert!((result.material_cost - 10_000.0).abs() < 1e-9);
        assert!((result.tax - output * 350.0 * 0.045).abs() < 1e-9);
        assert_eq!(result.focus_points_spent, 0.0);
        assert_eq!(result.resources_returned, 49);
    }

    #[test]
    fn premium_changes_focus_cost_but_never_return_rate() {
        let table = CityBonusTable::current();
        let base_config = PlayerConfig {
            use_focus: true,
            focus_points: 1_000_000,
            ..PlayerConfig::default()
        };
        let premium_config = PlayerConfig { premium: true, ..base_config.clone() };

        let plain = calculate(&table, &base_config, &request(City::Thetford)).unwrap();
        let premium = calculate(&table, &premium_config, &request(City::Thetford)).unwrap();

        assert_eq!(plain.return_rate, premium.return_rate);
        assert!((plain.focus_points_spent / premium.focus_points_spent - 1.05).abs() < 1e-9);
    }

    #[test]
    fn focus_shortfall_shrinks_quantity_pro_rata() {
        let table = CityBonusTable::current();
        // T5 base cost 20; no discounts, so 100 units need 2000 focus.
        let config = PlayerConfig {
            use_focus: true,
            focus_points: 500,
            ..PlayerConfig::default()
        };

        let result = calculate(&table, &config, &request(City::Thetford)).unwrap();
        assert!((result.input_qty - 25.0).abs() < 1e-9);
        assert_eq!(result.focus_points_spent, 500.0);
    }

    #[test]
    fn zero_focus_balance_degrades_to_no_focus() {
        let table = CityBonusTable::current();
        let config = PlayerConfig {
            use_focus: true,
            focus_points: 0,
            ..PlayerConfig::default()
        };

        let result = calculate(&table, &config, &request(City::Thetford)).unwrap();
        assert_eq!(result.focus_points_spent, 0.0);
        assert!((result.input_qty - 100.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_specialization_is_clamped() {
        assert_eq!(focus_cost_multiplier(150), 0.5);
        assert_eq!(focus_cost_multiplier(-20), 1.0);
        assert_eq!(focus_cost_multiplier(100), 0.5);
        assert_eq!(focus_cost_multiplier(0), 1.0);
    }

    #[test]
    fn effective_focus_cost_is_floored_at_ten_percent() {
        let config = PlayerConfig {
            premium: true,
            equipment_focus_reduction: 0.9,
            food_focus_reduction: 0.5,
            ..PlayerConfig::default()
        };
        assert_eq!(effective_focus_cost_per_unit(10, &config, 100), 1.0);
    }

    #[test]
    fn break_even_price_brackets_the_sign_change() {
        let table = CityBonusTable::current();
        let config = PlayerConfig::default();
        let req = request(City::Thetford);

        let break_even = break_even_raw_price(&table, &config, &req).unwrap();

        let below = RefiningRequest { raw_price: break_even - 1.0, ..req.clone() };
        let above = RefiningRequest { raw_price: break_even + 1.0, ..req.clone() };
        assert!(calculate(&table, &config, &below).unwrap().net_profit > 0.0);
        assert!(calculate(&table, &config, &above).unwrap().net_profit < 0.0);
    }

    #[test]
    fn bonus_city_ranks_first_when_prices_are_equal() {
        let table = CityBonusTable::current();
        let ranking = best_refining_city(&table, &PlayerConfig::default(), &request(City::Caerleon));
        assert_eq!(ranking.first().map(|(city, _)| *city), Some(City::Thetford));
        assert_eq!(ranking.len(), 7);
    }
}
