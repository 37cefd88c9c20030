use crate::models::{DownloadFile, Item};

use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid values: {}", quoted(.0))]
pub struct InvalidRange(pub Vec<String>);

fn quoted(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("'{v}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Which items of a bundle to download
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    /// Lower-cased format labels; empty accepts everything
    pub formats: Vec<String>,
    /// Exclusive upper bound on an item's total size; 0 disables it
    pub max_size: u64,
    /// 1-based item numbers and ranges, e.g. `1,4-6,10-`
    pub item_numbers: Option<String>,
}

impl ItemFilter {
    /// Builds a filter
    ///
    /// # Arguments
    /// * `formats` - Accepted format labels, in any case
    /// * `max_size` - Exclusive size limit per item, 0 for none
    /// * `item_numbers` - Optional item number ranges such as `1,4-6`
    pub fn new(formats: &[String], max_size: u64, item_numbers: Option<String>) -> Self {
        Self {
            formats: formats.iter().map(|f| f.to_lowercase()).collect(),
            max_size,
            item_numbers,
        }
    }

    fn accepts_size(&self, item: &Item) -> bool {
        self.max_size == 0 || item.total_size() < self.max_size
    }

    fn accepts_formats(&self, item: &Item) -> bool {
        self.formats.is_empty()
            || item
                .formats_as_vec()
                .iter()
                .any(|f| self.formats.contains(&f.to_lowercase()))
    }

    /// Per-file check applied at download time
    pub fn accepts_file(&self, file: &DownloadFile) -> bool {
        self.formats.is_empty() || self.formats.contains(&file.format.to_lowercase())
    }
}

/// Selects the items of a bundle to download
///
/// # Arguments
/// * `items` - All items of the bundle, in bundle order
/// * `filter` - Number, size and format criteria
///
/// # Returns
/// The items passing every check, in bundle order, or the invalid range tokens
pub fn select_items<'a>(items: &'a [Item], filter: &ItemFilter) -> Result<Vec<&'a Item>, InvalidRange> {
    let numbers = match filter.item_numbers.as_deref() {
        Some(ranges) => Some(parse_index_ranges(ranges, items.len())?),
        None => None,
    };

    Ok(items
        .iter()
        .enumerate()
        .filter(|(i, _)| numbers.as_ref().is_none_or(|n| n.contains(&(i + 1))))
        .map(|(_, item)| item)
        .filter(|item| filter.accepts_size(item))
        .filter(|item| filter.accepts_formats(item))
        .collect())
}

/// Parses a 1-based item number
fn parse_item_number(value: &str) -> Option<usize> {
    value.parse().ok().filter(|&n| n > 0)
}

/// Resolves one range token, clamped to `max_value`.
///
/// Supported forms: `n`, `a-b`, `a-` (up to `max_value`) and `-b` (from 1).
fn parse_range(token: &str, max_value: usize) -> Option<RangeInclusive<usize>> {
    let (start, end) = match token.split_once('-') {
        None => {
            let value = parse_item_number(token)?;
            (value, value)
        }
        Some((left, right)) => {
            let start = if left.is_empty() { 1 } else { parse_item_number(left)? };
            let end = if right.is_empty() { max_value } else { parse_item_number(right)? };
            (start, end)
        }
    };

    Some(start..=end.min(max_value))
}

/// Parses a comma-separated list of ranges into the union of their values
///
/// # Arguments
/// * `ranges` - Tokens such as `3`, `1-4`, `8-` or `-2`
/// * `max_value` - Number of items; open and oversized ranges stop here
///
/// # Returns
/// The selected 1-based numbers, or every token that doesn't parse
pub fn parse_index_ranges(ranges: &str, max_value: usize) -> Result<BTreeSet<usize>, InvalidRange> {
    let mut values = BTreeSet::new();
    let mut invalid = vec![];

    for token in ranges.split(',').map(str::trim) {
        match parse_range(token, max_value) {
            Some(range) => values.extend(range),
            None => invalid.push(token.to_owned()),
        }
    }

    if invalid.is_empty() {
        Ok(values)
    } else {
        Err(InvalidRange(invalid))
    }
}
