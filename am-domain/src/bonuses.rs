use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{City, ResourceCategory};

/// Immutable, versioned lookup table for the per-city bonuses that feed the
/// calculators: local production bonus (refining return rate), resource
/// reduction (material discount for processing the matching category), and
/// station tax rate.
///
/// Lookups are explicit about absence: `local_production_bonus` and
/// `resource_reduction` return `None` when no bonus is configured for the
/// (city, category) pair, so a missing table entry is distinguishable from
/// a configured zero. The `*_or_zero` forms exist for formula use.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CityBonusTable {
    version: String,
    local_production: HashMap<City, HashMap<ResourceCategory, f64>>,
    resource_reduction: HashMap<City, HashMap<ResourceCategory, f64>>,
    tax_rates: HashMap<City, f64>,
}

/// Fallback tax rate for a city missing from the table.
const DEFAULT_TAX_RATE: f64 = 0.05;

impl CityBonusTable {
    pub fn new(
        version: impl Into<String>,
        local_production: HashMap<City, HashMap<ResourceCategory, f64>>,
        resource_reduction: HashMap<City, HashMap<ResourceCategory, f64>>,
        tax_rates: HashMap<City, f64>,
    ) -> Self {
        CityBonusTable {
            version: version.into(),
            local_production,
            resource_reduction,
            tax_rates,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn local_production_bonus(&self, city: City, resource: ResourceCategory) -> Option<f64> {
        self.local_production.get(&city).and_then(|by_resource| by_resource.get(&resource)).copied()
    }

    pub fn local_production_bonus_or_zero(&self, city: City, resource: ResourceCategory) -> f64 {
        self.local_production_bonus(city, resource).unwrap_or(0.0)
    }

    pub fn resource_reduction(&self, city: City, resource: ResourceCategory) -> Option<f64> {
        self.resource_reduction.get(&city).and_then(|by_resource| by_resource.get(&resource)).copied()
    }

    pub fn resource_reduction_or_zero(&self, city: City, resource: ResourceCategory) -> f64 {
        self.resource_reduction(city, resource).unwrap_or(0.0)
    }

    pub fn tax_rate(&self, city: City) -> f64 {
        self.tax_rates.get(&city).copied().unwrap_or(DEFAULT_TAX_RATE)
    }

    /// The city with the highest local production bonus for a resource,
    /// falling back to Caerleon when no city carries one.
    pub fn optimal_refining_city(&self, resource: ResourceCategory) -> City {
        self.local_production
            .iter()
            .filter_map(|(city, by_resource)| by_resource.get(&resource).map(|bonus| (*city, *bonus)))
            .filter(|(_, bonus)| *bonus > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(city, _)| city)
            .unwrap_or(City::Caerleon)
    }

    /// The live game tables: each royal city grants +40% local production
    /// for one resource family and a 15% material reduction for processing
    /// it; royal cities tax 4.5%, Caerleon 3.5%, Brecilien 2%.
    pub fn current() -> Self {
        fn single(city: City, resource: ResourceCategory, value: f64) -> (City, HashMap<ResourceCategory, f64>) {
            (city, HashMap::from([(resource, value)]))
        }

        let local_production = HashMap::from([
            single(City::Thetford, ResourceCategory::Ore, 0.40),
            single(City::FortSterling, ResourceCategory::Wood, 0.40),
            single(City::Lymhurst, ResourceCategory::Fiber, 0.40),
            single(City::Martlock, ResourceCategory::Hide, 0.40),
            single(City::Bridgewatch, ResourceCategory::Rock, 0.40),
        ]);

        let resource_reduction = HashMap::from([
            single(City::Thetford, ResourceCategory::Fiber, 0.15),
            single(City::FortSterling, ResourceCategory::Ore, 0.15),
            single(City::Lymhurst, ResourceCategory::Wood, 0.15),
            single(City::Bridgewatch, ResourceCategory::Hide, 0.15),
            single(City::Martlock, ResourceCategory::Rock, 0.15),
        ]);

        let tax_rates = HashMap::from([
            (City::Thetford, 0.045),
            (City::FortSterling, 0.045),
            (City::Lymhurst, 0.045),
            (City::Bridgewatch, 0.045),
            (City::Martlock, 0.045),
            (City::Caerleon, 0.035),
            (City::Brecilien, 0.02),
        ]);

        CityBonusTable::new("2024-07", local_production, resource_reduction, tax_rates)
    }
}
