use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::ResourceCategory;

/// Mastery trees a player can level. Refining trees are per resource
/// family; the crafting trees cover the stations the recipe book uses.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Specialization {
    OreRefining,
    WoodRefining,
    HideRefining,
    FiberRefining,
    StoneRefining,
    WeaponSmith,
    ArmorSmith,
    Toolmaker,
}

impl Specialization {
    pub fn refining(resource: ResourceCategory) -> Self {
        match resource {
            ResourceCategory::Ore => Specialization::OreRefining,
            ResourceCategory::Wood => Specialization::WoodRefining,
            ResourceCategory::Hide => Specialization::HideRefining,
            ResourceCategory::Fiber => Specialization::FiberRefining,
            ResourceCategory::Rock => Specialization::StoneRefining,
        }
    }
}

/// Player-side inputs to the calculators. Supplied by the caller, never
/// mutated by the core.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    pub premium: bool,
    pub use_focus: bool,
    /// Focus balance available for the calculation at hand. Spending beyond
    /// this shrinks the processed quantity pro-rata instead of going
    /// negative.
    pub focus_points: u64,
    /// Levels are nominally 0..=100; out-of-range values are clamped (with
    /// a warning) by the calculators, and missing trees count as level 0.
    #[serde(default)]
    pub specializations: HashMap<Specialization, i32>,
    /// Focus-cost reduction from crafting gear, as a fraction in [0, 1).
    #[serde(default)]
    pub equipment_focus_reduction: f64,
    /// Focus-cost reduction from food buffs, as a fraction in [0, 1).
    #[serde(default)]
    pub food_focus_reduction: f64,
    /// Silver value assigned to one focus point when deducting focus spend
    /// from net profit. Zero treats focus as monetarily free.
    #[serde(default)]
    pub silver_per_focus_point: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            premium: false,
            use_focus: false,
            focus_points: 0,
            specializations: HashMap::new(),
            equipment_focus_reduction: 0.0,
            food_focus_reduction: 0.0,
            silver_per_focus_point: 0.0,
        }
    }
}

impl PlayerConfig {
    /// Level of the given tree, defaulting to 0 when the entry is absent.
    pub fn specialization_level(&self, tree: Specialization) -> i32 {
        self.specializations.get(&tree).copied().unwrap_or(0)
    }

    pub fn with_specialization(mut self, tree: Specialization, level: i32) -> Self {
        self.specializations.insert(tree, level);
        self
    }
}
