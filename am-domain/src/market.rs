use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        ItemId(id.into())
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The royal cities plus Caerleon and Brecilien. The API uses the display
/// names (including the space in "Fort Sterling") as location identifiers.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Display, EnumIter, EnumString)]
pub enum City {
    Thetford,
    #[serde(rename = "Fort Sterling")]
    #[strum(serialize = "Fort Sterling")]
    FortSterling,
    Lymhurst,
    Bridgewatch,
    Martlock,
    Caerleon,
    Brecilien,
}

/// Region-sharded API hosts.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Region {
    Europe,
    Americas,
    Asia,
}

impl Region {
    pub fn base_url(&self) -> &'static str {
        match self {
            Region::Europe => "https://europe.albion-online-data.com",
            Region::Americas => "https://west.albion-online-data.com",
            Region::Asia => "https://east.albion-online-data.com",
        }
    }
}

/// Item quality levels. The API encodes them as integers 1..=5; the
/// multiplier scales an item's sell price, never its material cost.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Display)]
#[serde(try_from = "u8", into = "u8")]
pub enum Quality {
    #[default]
    Normal,
    Good,
    Outstanding,
    Excellent,
    Masterpiece,
}

impl Quality {
    pub fn sell_price_multiplier(&self) -> f64 {
        match self {
            Quality::Normal => 1.0,
            Quality::Good => 1.2,
            Quality::Outstanding => 1.4,
            Quality::Excellent => 1.6,
            Quality::Masterpiece => 2.0,
        }
    }

    pub fn level(&self) -> u8 {
        *self as u8 + 1
    }
}

impl TryFrom<u8> for Quality {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            // the API reports quality 0 for items that have no quality axis
            0 | 1 => Ok(Quality::Normal),
            2 => Ok(Quality::Good),
            3 => Ok(Quality::Outstanding),
            4 => Ok(Quality::Excellent),
            5 => Ok(Quality::Masterpiece),
            other => Err(format!("unknown quality level {other}")),
        }
    }
}

impl From<Quality> for u8 {
    fn from(quality: Quality) -> u8 {
        quality.level()
    }
}

/// The five gatherable resource families. The API calls stone `ROCK`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
pub enum ResourceCategory {
    Ore,
    Wood,
    Hide,
    Fiber,
    Rock,
}

impl ResourceCategory {
    pub fn raw_suffix(&self) -> &'static str {
        match self {
            ResourceCategory::Ore => "ORE",
            ResourceCategory::Wood => "WOOD",
            ResourceCategory::Hide => "HIDE",
            ResourceCategory::Fiber => "FIBER",
            ResourceCategory::Rock => "ROCK",
        }
    }

    pub fn refined_suffix(&self) -> &'static str {
        match self {
            ResourceCategory::Ore => "METALBAR",
            ResourceCategory::Wood => "PLANKS",
            ResourceCategory::Hide => "LEATHER",
            ResourceCategory::Fiber => "CLOTH",
            ResourceCategory::Rock => "STONEBLOCK",
        }
    }
}

/// Resource tiers the refining chain covers.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Display, EnumIter, EnumString)]
pub enum Tier {
    T2,
    T3,
    T4,
    T5,
    T6,
    T7,
    T8,
}

impl Tier {
    pub fn previous(&self) -> Option<Tier> {
        match self {
            Tier::T2 => None,
            Tier::T3 => Some(Tier::T2),
            Tier::T4 => Some(Tier::T3),
            Tier::T5 => Some(Tier::T4),
            Tier::T6 => Some(Tier::T5),
            Tier::T7 => Some(Tier::T6),
            Tier::T8 => Some(Tier::T7),
        }
    }
}

fn enchantment_suffix(enchantment: u8) -> String {
    if enchantment == 0 {
        String::new()
    } else {
        format!("_LEVEL{enchantment}@{enchantment}")
    }
}

/// API item id of a raw resource, e.g. `T5_ORE` or `T5_ORE_LEVEL2@2`.
pub fn raw_item_id(tier: Tier, resource: ResourceCategory, enchantment: u8) -> ItemId {
    ItemId(format!("{tier}_{}{}", resource.raw_suffix(), enchantment_suffix(enchantment)))
}

/// API item id of the refined counterpart, e.g. `T5_METALBAR`.
pub fn refined_item_id(tier: Tier, resource: ResourceCategory, enchantment: u8) -> ItemId {
    ItemId(format!("{tier}_{}{}", resource.refined_suffix(), enchantment_suffix(enchantment)))
}

/// One price record from `/api/v2/stats/prices`. A record is identified by
/// (item, city, quality); a zero price means the order book side is empty,
/// not that the item is free.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub item_id: ItemId,
    pub city: City,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub sell_price_min: u64,
    #[serde(default)]
    pub sell_price_max: u64,
    #[serde(default)]
    pub buy_price_max: u64,
    #[serde(rename = "sell_price_min_date", default)]
    pub timestamp: Option<NaiveDateTime>,
}

impl PriceQuote {
    /// True if somebody is selling, i.e. the quote can be bought from.
    pub fn has_sell_offer(&self) -> bool {
        self.sell_price_min > 0
    }

    /// True if somebody is buying, i.e. the quote can be sold into.
    pub fn has_buy_order(&self) -> bool {
        self.buy_price_max > 0
    }
}

/// One aggregated point from `/api/v2/stats/history`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct HistoryPoint {
    #[serde(default)]
    pub item_count: u64,
    #[serde(default)]
    pub avg_price: f64,
    pub timestamp: NaiveDateTime,
}

/// Per-(item, city, quality) history series as returned by the API.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ItemHistory {
    pub item_id: ItemId,
    pub location: City,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub data: Vec<HistoryPoint>,
}

impl ItemHistory {
    /// Total traded volume over the series; the liquidity signal used to
    /// break ranking ties between otherwise equal opportunities.
    pub fn total_volume(&self) -> u64 {
        self.data.iter().map(|p| p.item_count).sum()
    }

    pub fn average_price(&self) -> Option<f64> {
        if self.data.is_empty() {
            return None;
        }
        Some(self.data.iter().map(|p| p.avg_price).sum::<f64>() / self.data.len() as f64)
    }
}
