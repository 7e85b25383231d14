pub mod arbitrage;
pub mod bonuses;
pub mod crafting;
pub mod errors;
pub mod market;
pub mod player;
pub mod recipes;
pub mod refining;

pub use arbitrage::*;
pub use bonuses::*;
pub use errors::*;
pub use market::*;
pub use player::*;
pub use recipes::*;

// Both calculators expose a module-scoped `calculate`; call those through
// their module path. Everything else is re-exported flat.
pub use crafting::{best_crafting_city, crafting_return_rate, CraftingOutcome, CraftingRequest, CraftingResult};
pub use refining::{
    best_refining_city, break_even_raw_price, clamp_specialization, effective_focus_cost_per_unit, focus_cost_multiplier, return_rate, RefiningRequest,
    RefiningResult,
};
