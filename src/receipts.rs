//! Client-side receipt search and sorting for the receipts list

use chrono::NaiveDate;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::models::Receipt;

/// Receipts list ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Most recent date first (default)
    #[default]
    Newest,
    Oldest,
    /// Largest total first
    Highest,
    Lowest,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Newest => "newest",
            Self::Oldest => "oldest",
            Self::Highest => "highest",
            Self::Lowest => "lowest",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            "highest" => Ok(Self::Highest),
            "lowest" => Ok(Self::Lowest),
            other => Err(format!(
                "unknown sort order '{}' (expected newest, oldest, highest or lowest)",
                other
            )),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter + sort applied to a cached receipt list
#[derive(Debug, Clone, Default)]
pub struct ReceiptQuery {
    /// Case-insensitive substring of the retailer name; empty matches all
    pub search: String,
    pub sort: SortOrder,
}

impl ReceiptQuery {
    pub fn new(search: impl Into<String>, sort: SortOrder) -> Self {
        Self {
            search: search.into(),
            sort,
        }
    }

    /// Matching receipts in the requested order. Receipts whose date does not
    /// parse as `YYYY-MM-DD` sort after dated ones for both date orders.
    pub fn apply<'a>(&self, receipts: &'a [Receipt]) -> Vec<&'a Receipt> {
        let needle = self.search.to_lowercase();
        let mut matched: Vec<&Receipt> = receipts
            .iter()
            .filter(|r| r.retailer.to_lowercase().contains(&needle))
            .collect();

        match self.sort {
            SortOrder::Newest => matched.sort_by(|a, b| compare_dates(a, b, true)),
            SortOrder::Oldest => matched.sort_by(|a, b| compare_dates(a, b, false)),
            SortOrder::Highest => matched.sort_by(|a, b| b.total.total_cmp(&a.total)),
            SortOrder::Lowest => matched.sort_by(|a, b| a.total.total_cmp(&b.total)),
        }
        matched
    }
}

fn parse_date(receipt: &Receipt) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&receipt.date, "%Y-%m-%d").ok()
}

fn compare_dates(a: &Receipt, b: &Receipt, newest_first: bool) -> Ordering {
    match (parse_date(a), parse_date(b)) {
        (Some(da), Some(db)) if newest_first => db.cmp(&da),
        (Some(da), Some(db)) => da.cmp(&db),
        // Undated receipts go last in either direction
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
