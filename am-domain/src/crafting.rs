use std::collections::HashMap;

use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::refining::{apply_focus_budget, clamp_specialization, effective_focus_cost_per_unit};
use crate::{base_focus_cost, CalculationError, City, CityBonusTable, CraftKind, ItemId, PlayerConfig, Quality, Recipe, Specialization};

/// Specialization adds up to +30% return rate at level 100.
const SPEC_RETURN_BONUS_CAP: f64 = 0.30;

/// Flat return-rate bonus while focus is spent on the craft.
const FOCUS_RETURN_BONUS: f64 = 0.35;

/// Hard cap on the crafting return rate.
const MAX_RETURN_RATE: f64 = 0.70;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CraftingRequest {
    pub city: City,
    /// Market price per crafted item at `Normal` quality.
    pub sell_price: f64,
    pub quality: Quality,
    /// Prices per material unit, keyed by material item id.
    pub material_prices: HashMap<ItemId, f64>,
    /// Number of crafts to run.
    pub crafts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CraftingResult {
    pub items_produced: f64,
    pub return_rate: f64,
    pub material_cost: f64,
    /// Cost contribution per material, in recipe order.
    pub material_costs: Vec<(ItemId, f64)>,
    pub tax: f64,
    pub sell_revenue: f64,
    pub focus_points_spent: f64,
    pub focus_cost_silver: f64,
    pub net_profit: f64,
    pub profit_margin_pct: f64,
    /// Sell price per item at which the craft breaks even.
    pub break_even_price: f64,
}

/// A crafting calculation either completes or reports exactly which
/// materials lacked price data. An `Incomplete` recipe never produces a
/// numeric profit; a misleading figure is worse than none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CraftingOutcome {
    Complete(CraftingResult),
    Incomplete { missing: Vec<ItemId> },
}

impl CraftingOutcome {
    pub fn as_complete(&self) -> Option<&CraftingResult> {
        match self {
            CraftingOutcome::Complete(result) => Some(result),
            CraftingOutcome::Incomplete { .. } => None,
        }
    }
}

/// `base + (specialization/100) · 0.30 + 0.35 if focused`, capped at 0.70.
pub fn crafting_return_rate(base_return_rate: f64, specialization: i32, focus_used: bool) -> f64 {
    let spec_bonus = clamp_specialization(specialization) / 100.0 * SPEC_RETURN_BONUS_CAP;
    let focus_bonus = if focus_used { FOCUS_RETURN_BONUS } else { 0.0 };
    (base_return_rate + spec_bonus + focus_bonus).min(MAX_RETURN_RATE)
}

fn specialization_tree(kind: CraftKind) -> Specialization {
    match kind {
        CraftKind::Weapon => Specialization::WeaponSmith,
        CraftKind::Armor => Specialization::ArmorSmith,
        CraftKind::Accessory => Specialization::Toolmaker,
    }
}

pub fn calculate(bonus_table: &CityBonusTable, config: &PlayerConfig, recipe: &Recipe, request: &CraftingRequest) -> Result<CraftingOutcome, CalculationError> {
    if request.sell_price <= 0.0 {
        return Err(CalculationError::invalid_price(recipe.item_id.0.clone(), request.sell_price));
    }

    // Every material needs a usable price before any math happens.
    let missing = recipe
        .materials
        .iter()
        .filter(|material| request.material_prices.get(&material.item_id).copied().unwrap_or(0.0) <= 0.0)
        .map(|material| material.item_id.clone())
        .collect_vec();
    if !missing.is_empty() {
        return Ok(CraftingOutcome::Incomplete { missing });
    }

    let specialization = config.specialization_level(specialization_tree(recipe.kind));
    let focus_used = config.use_focus && config.focus_points > 0;
    let rate = crafting_return_rate(recipe.base_return_rate(), specialization, focus_used);

    let per_craft_focus = effective_focus_cost_per_unit(base_focus_cost(recipe.tier), config, specialization);
    let requested_crafts = (request.crafts * recipe.base_qty) as f64;
    let (crafts, focus_points_spent) = apply_focus_budget(requested_crafts, per_craft_focus, config);

    let items_produced = crafts * (1.0 + rate);
    // Quality scales what the item sells for, never what the materials cost.
    let effective_sell_price = request.sell_price * request.quality.sell_price_multiplier();

    let material_costs = recipe
        .materials
        .iter()
        .map(|material| {
            let price = request.material_prices[&material.item_id];
            let reduction = material
                .category
                .map(|category| bonus_table.resource_reduction_or_zero(request.city, category))
                .unwrap_or(0.0);
            let cost = crafts * material.quantity as f64 * (1.0 - reduction) * price;
            (material.item_id.clone(), cost)
        })
        .collect_vec();
    let material_cost: f64 = material_costs.iter().map(|(_, cost)| cost).sum();

    let sell_revenue = items_produced * effective_sell_price;
    let tax = sell_revenue * bonus_table.tax_rate(request.city);
    let focus_cost_silver = focus_points_spent * config.silver_per_focus_point;
    let net_profit = sell_revenue - material_cost - tax - focus_cost_silver;

    let total_cost = material_cost + tax + focus_cost_silver;
    let profit_margin_pct = if sell_revenue > 0.0 { net_profit / sell_revenue * 100.0 } else { 0.0 };
    let break_even_price = if items_produced > 0.0 { total_cost / items_produced } else { 0.0 };

    Ok(CraftingOutcome::Complete(CraftingResult {
        items_produced,
        return_rate: rate,
        material_cost,
        material_costs,
        tax,
        sell_revenue,
        focus_points_spent,
        focus_cost_silver,
        net_profit,
        profit_margin_pct,
        break_even_price,
    }))
}

/// Same craft priced per city, ranked by net profit. Cities where the
/// outcome is incomplete are skipped, not scored as zero.
pub fn best_crafting_city(
    bonus_table: &CityBonusTable,
    config: &PlayerConfig,
    recipe: &Recipe,
    requests_by_city: &HashMap<City, CraftingRequest>,
) -> Vec<(City, CraftingResult)> {
    City::iter()
        .filter_map(|city| {
            let request = requests_by_city.get(&city)?;
            match calculate(bonus_table, config, recipe, request) {
                Ok(CraftingOutcome::Complete(result)) => Some((city, result)),
                Ok(CraftingOutcome::Incomplete { .. }) | Err(_) => None,
            }
        })
        .sorted_by_key(|(_, result)| std::cmp::Reverse(OrderedFloat(result.net_profit)))
        .collect_vec()
}
