use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{ItemId, ResourceCategory, Tier};

/// Raw and previous-tier refined inputs consumed per refined unit, e.g.
/// one T5 bar takes 3 raw ore plus 1 T4 bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefiningStep {
    pub raw_per_refined: u32,
    pub prev_refined_per_refined: u32,
}

/// Inputs needed per refined unit at a tier.
pub fn refining_requirements(tier: Tier) -> RefiningStep {
    let (raw, prev) = match tier {
        Tier::T2 => (1, 0),
        Tier::T3 => (2, 1),
        Tier::T4 => (2, 1),
        Tier::T5 => (3, 1),
        Tier::T6 => (4, 1),
        Tier::T7 => (5, 1),
        Tier::T8 => (6, 1),
    };
    RefiningStep {
        raw_per_refined: raw,
        prev_refined_per_refined: prev,
    }
}

/// Base focus cost per crafted/refined unit at full specialization discounts
/// not yet applied.
pub fn base_focus_cost(tier: Tier) -> u32 {
    match tier {
        Tier::T2 | Tier::T3 => 5,
        Tier::T4 => 10,
        Tier::T5 => 20,
        Tier::T6 => 40,
        Tier::T7 => 80,
        Tier::T8 => 160,
    }
}

/// Base crafting return rate per tier, before specialization and focus.
pub fn base_return_rate(tier: Tier) -> f64 {
    match tier {
        Tier::T2 | Tier::T3 => 0.15,
        Tier::T4 => 0.15,
        Tier::T5 => 0.20,
        Tier::T6 => 0.22,
        Tier::T7 => 0.24,
        Tier::T8 => 0.26,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CraftKind {
    Weapon,
    Armor,
    Accessory,
}

/// One ingredient line of a crafting recipe. `category` ties the material
/// to the city resource-reduction table; materials outside the five
/// resource families (artifacts etc.) carry no category and never get a
/// city discount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeMaterial {
    pub item_id: ItemId,
    pub quantity: u32,
    pub category: Option<ResourceCategory>,
}

impl RecipeMaterial {
    pub fn new(item_id: impl Into<String>, quantity: u32, category: Option<ResourceCategory>) -> Self {
        RecipeMaterial {
            item_id: ItemId::new(item_id),
            quantity,
            category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub item_id: ItemId,
    pub tier: Tier,
    pub kind: CraftKind,
    pub materials: Vec<RecipeMaterial>,
    /// Units produced per craft before the return rate is applied.
    pub base_qty: u32,
}

impl Recipe {
    pub fn base_return_rate(&self) -> f64 {
        base_return_rate(self.tier)
    }
}

/// Read-only recipe lookup. The real reference tables are an external
/// collaborator; this book carries the starter set used by the scan tool
/// and the tests.
#[derive(Debug, Clone, Default)]
pub struct RecipeBook {
    recipes: HashMap<ItemId, Recipe>,
}

impl RecipeBook {
    pub fn new(recipes: impl IntoIterator<Item = Recipe>) -> Self {
        RecipeBook {
            recipes: recipes.into_iter().map(|r| (r.item_id.clone(), r)).collect(),
        }
    }

    pub fn get(&self, item_id: &ItemId) -> Option<&Recipe> {
        self.recipes.get(item_id)
    }

    pub fn available(&self) -> impl Iterator<Item = &ItemId> {
        self.recipes.keys()
    }

    pub fn starter_set() -> Self {
        fn sword(tier: Tier, main: &str, prev: &str) -> Recipe {
            Recipe {
                item_id: ItemId::new(format!("{tier}_SWORD")),
                tier,
                kind: CraftKind::Weapon,
                materials: vec![
                    RecipeMaterial::new(main, 16, Some(ResourceCategory::Ore)),
                    RecipeMaterial::new(prev, 8, Some(ResourceCategory::Ore)),
                ],
                base_qty: 1,
            }
        }

        fn robe(tier: Tier, main: &str, prev: &str) -> Recipe {
            Recipe {
                item_id: ItemId::new(format!("{tier}_ARMOR_CLOTH_ROBE")),
                tier,
                kind: CraftKind::Armor,
                materials: vec![
                    RecipeMaterial::new(main, 16, Some(ResourceCategory::Fiber)),
                    RecipeMaterial::new(prev, 8, Some(ResourceCategory::Fiber)),
                ],
                base_qty: 1,
            }
        }

        fn bag(tier: Tier, cloth: &str, leather: &str) -> Recipe {
            Recipe {
                item_id: ItemId::new(format!("{tier}_BAG")),
                tier,
                kind: CraftKind::Accessory,
                materials: vec![
                    RecipeMaterial::new(cloth, 8, Some(ResourceCategory::Fiber)),
                    RecipeMaterial::new(leather, 4, Some(ResourceCategory::Hide)),
                ],
                base_qty: 1,
            }
        }

        RecipeBook::new([
            sword(Tier::T4, "T4_METALBAR", "T3_METALBAR"),
            sword(Tier::T5, "T5_METALBAR", "T4_METALBAR"),
            sword(Tier::T6, "T6_METALBAR", "T5_METALBAR"),
            robe(Tier::T4, "T4_CLOTH", "T3_CLOTH"),
            robe(Tier::T5, "T5_CLOTH", "T4_CLOTH"),
            robe(Tier::T6, "T6_CLOTH", "T5_CLOTH"),
            bag(Tier::T4, "T4_CLOTH", "T4_LEATHER"),
            bag(Tier::T5, "T5_CLOTH", "T5_LEATHER"),
            bag(Tier::T6, "T6_CLOTH", "T6_LEATHER"),
        ])
    }
}
