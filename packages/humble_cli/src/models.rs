use crate::decode::{HumbleTime, decode_items, decode_product_keys};

use log::warn;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Claim state of a bundle's keys, or of a single choice key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStatus {
    Yes,
    No,
    NotAvailable,
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Yes => "Yes",
            Self::No => "No",
            Self::NotAvailable => "-",
        })
    }
}

/// Response of the order endpoint, keyed by bundle identifier
pub type BundleMap = HashMap<String, Bundle>;

/// Entry of the identifier listing endpoint
#[derive(Deserialize, Debug)]
pub struct GameKey {
    pub gamekey: String,
}

/// Wire shape of a bundle before its items and keys are normalized
#[derive(Deserialize)]
struct RawBundle {
    gamekey: String,
    created: HumbleTime,
    #[serde(default)]
    claimed: bool,
    #[serde(default)]
    tpkd_dict: Map<String, Value>,
    product: BundleDetails,
    #[serde(default)]
    subproducts: Vec<Value>,
    #[serde(default)]
    amount_spent: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
}

/// A single purchase
#[derive(Deserialize, Debug, Clone)]
#[serde(from = "RawBundle")]
pub struct Bundle {
    gamekey: String,
    /// Purchase time
    pub created: HumbleTime,
    /// Account-level claim flag, independent of key redemption
    #[allow(dead_code)]
    pub claimed: bool,
    /// Bundle name as shown on the site
    pub details: BundleDetails,
    /// Items in server order; malformed entries are left out
    pub items: Vec<Item>,
    pub amount_spent: Option<f64>,
    pub currency: Option<String>,
    tpkd_dict: Map<String, Value>,
}

impl From<RawBundle> for Bundle {
    fn from(raw: RawBundle) -> Self {
        let gamekey = raw.gamekey;
        let items = decode_items(raw.subproducts, |index, e| {
            warn!("Skipping malformed item #{} in bundle {}: {}", index + 1, gamekey, e);
        });

        Self {
            gamekey,
            created: raw.created,
            claimed: raw.claimed,
            details: raw.product,
            items,
            amount_spent: raw.amount_spent,
            currency: raw.currency,
            tpkd_dict: raw.tpkd_dict,
        }
    }
}

impl Bundle {
    #[cfg(test)]
    pub fn new(
        gamekey: impl Into<String>,
        created: HumbleTime,
        details: BundleDetails,
        items: Vec<Item>,
        tpkd_dict: Map<String, Value>,
    ) -> Self {
        Self {
            gamekey: gamekey.into(),
            created,
            claimed: false,
            details,
            items,
            amount_spent: None,
            currency: None,
            tpkd_dict,
        }
    }

    /// Bundle identifier (the "gamekey")
    pub fn gamekey(&self) -> &str {
        &self.gamekey
    }

    pub fn total_size(&self) -> u64 {
        self.items.iter().map(Item::total_size).sum()
    }

    /// Redeemable keys, decoded afresh from the raw key dictionary
    pub fn product_keys(&self) -> Vec<ProductKey> {
        decode_product_keys(&self.tpkd_dict)
    }

    pub fn claim_status(&self) -> ClaimStatus {
        let keys = self.product_keys();
        if keys.is_empty() {
            ClaimStatus::NotAvailable
        } else if keys.iter().any(|k| !k.redeemed) {
            ClaimStatus::No
        } else {
            ClaimStatus::Yes
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct BundleDetails {
    #[serde(default)]
    #[allow(dead_code)]
    pub machine_name: String,
    pub human_name: String,
}

/// A redeemable key attached to a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductKey {
    pub human_name: String,
    pub redeemed: bool,
}

/// A product inside a bundle
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Item {
    #[allow(dead_code)]
    pub machine_name: String,
    pub human_name: String,
    /// Product page
    #[serde(rename = "url")]
    #[allow(dead_code)]
    pub details_url: String,
    /// Download groups, usually one per platform
    pub downloads: Vec<DownloadGroup>,
}

impl Item {
    pub fn total_size(&self) -> u64 {
        self.downloads.iter().map(DownloadGroup::total_size).sum()
    }

    pub fn formats_as_vec(&self) -> Vec<&str> {
        self.downloads
            .iter()
            .flat_map(DownloadGroup::formats_as_vec)
            .collect()
    }

    pub fn formats(&self) -> String {
        self.formats_as_vec().join(", ")
    }

    pub fn files(&self) -> impl Iterator<Item = &DownloadFile> {
        self.downloads.iter().flat_map(|group| group.files.iter())
    }

    /// Whether the lower-cased `keywords` match whole words of this item's name
    pub fn name_matches(&self, keywords: &[&str], mode: MatchMode) -> bool {
        if keywords.is_empty() {
            return false;
        }

        let human_name = self.human_name.to_lowercase();
        let words: HashSet<&str> = human_name.split_whitespace().collect();

        match mode {
            MatchMode::Any => keywords.iter().any(|kw| words.contains(kw)),
            MatchMode::All => keywords.iter().all(|kw| words.contains(kw)),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct DownloadGroup {
    #[serde(default)]
    #[allow(dead_code)]
    pub platform: String,
    #[serde(rename = "download_struct")]
    pub files: Vec<DownloadFile>,
}

impl DownloadGroup {
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.file_size).sum()
    }

    pub fn formats_as_vec(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.format.as_str()).collect()
    }
}

/// One downloadable file
#[derive(Deserialize, Debug, Clone, Default)]
pub struct DownloadFile {
    /// Checksum published by the server, not verified
    #[serde(default)]
    #[allow(dead_code)]
    pub md5: String,
    /// Format label such as "PDF" or "EPUB"
    #[serde(rename = "name")]
    pub format: String,
    #[serde(default)]
    pub file_size: u64,
    pub url: DownloadUrl,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct DownloadUrl {
    pub web: String,
    #[serde(default)]
    pub bittorrent: Option<String>,
}

/// Keyword matching mode for `search`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MatchMode {
    All,
    Any,
}

/// Claim filter for `list`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ClaimFilter {
    All,
    Yes,
    No,
}

impl ClaimFilter {
    pub fn accepts(&self, status: ClaimStatus) -> bool {
        match self {
            Self::All => true,
            Self::Yes => status == ClaimStatus::Yes,
            Self::No => status == ClaimStatus::No,
        }
    }
}

// ===========================================================================
// Choice subscription pages
// ===========================================================================

#[derive(Deserialize, Debug)]
pub struct HumbleChoice {
    #[serde(rename = "contentChoiceOptions")]
    pub options: ContentChoiceOptions,
}

#[derive(Deserialize, Debug)]
pub struct ContentChoiceOptions {
    #[serde(rename = "contentChoiceData")]
    pub data: ContentChoiceData,
    pub title: String,
}

#[derive(Deserialize, Debug)]
pub struct ContentChoiceData {
    pub game_data: BTreeMap<String, GameData>,
}

#[derive(Deserialize, Debug)]
pub struct GameData {
    #[serde(default)]
    pub tpkds: Vec<Tpkd>,
}

/// Key record of a choice game
#[derive(Deserialize, Debug)]
pub struct Tpkd {
    #[serde(default)]
    pub gamekey: Option<String>,
    pub human_name: String,
    #[serde(default)]
    pub redeemed_key_val: Option<String>,
}

impl Tpkd {
    pub fn claim_status(&self) -> ClaimStatus {
        match (self.gamekey.is_some(), self.redeemed_key_val.is_some()) {
            (true, true) => ClaimStatus::Yes,
            (true, false) => ClaimStatus::No,
            _ => ClaimStatus::NotAvailable,
        }
    }
}

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Month of a choice subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoicePeriod {
    Current,
    Date { month: String, year: u16 },
}

impl fmt::Display for ChoicePeriod {
    /// Path segment used by the membership page
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => f.write_str("home"),
            Self::Date { month, year } => write!(f, "{month}-{year}"),
        }
    }
}

impl FromStr for ChoicePeriod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.to_lowercase();
        if value == "current" {
            return Ok(Self::Current);
        }

        let Some((month, year)) = value.split_once('-') else {
            return Err("invalid format. expected {month name}-{year}".to_owned());
        };

        if !MONTH_NAMES.contains(&month) {
            return Err(format!("invalid month: {month}"));
        }

        let year: u16 = year
            .parse()
            .map_err(|e| format!("invalid year value: {e}"))?;
        if !(2018..=2030).contains(&year) {
            return Err("years out of 2018-2030 range are not supported".to_owned());
        }

        Ok(Self::Date {
            month: month.to_owned(),
            year,
        })
    }
}
