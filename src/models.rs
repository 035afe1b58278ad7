// Wire types for the EcoReceipt API
//
// Field names follow the Rust side of the contract; serde renames map them to
// the server's JSON (`items`, `price`, `logo`, `water_saved`, ...). Everything
// the server adds that the client never reads is optional so older or newer
// servers still deserialize.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// User profile as returned by the auth endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Server-side user id. Accepted as a JSON string or number.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Display name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            created_at: None,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Int(n) => n.to_string(),
        Id::Float(n) => n.to_string(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Receipts
// ─────────────────────────────────────────────────────────────────────────────

/// One purchased line on a receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    #[serde(rename = "price")]
    pub unit_price: f64,
}

/// A stored receipt (server-owned, read-only on the client)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: String,
    pub retailer: String,
    #[serde(rename = "logo", default)]
    pub logo_url: Option<String>,
    /// Purchase date, `YYYY-MM-DD`
    pub date: String,
    /// Purchase time, `HH:MM`
    pub time: String,
    #[serde(rename = "items", default)]
    pub line_items: Vec<LineItem>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Receipt {
    /// Whether `subtotal + tax == total` to the cent.
    ///
    /// The server is trusted to keep this; the client only reports it.
    pub fn is_balanced(&self) -> bool {
        let cents = |v: f64| (v * 100.0).round() as i64;
        cents(self.subtotal) + cents(self.tax) == cents(self.total)
    }

    /// Number of individual units across all line items
    pub fn unit_count(&self) -> u32 {
        self.line_items.iter().map(|item| item.quantity).sum()
    }
}

/// Payload for creating a receipt (also the shape the OCR endpoint returns)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReceipt {
    pub retailer: String,
    pub date: String,
    pub time: String,
    #[serde(rename = "items")]
    pub line_items: Vec<LineItem>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub category: String,
    #[serde(rename = "logo", default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

/// Response of `POST /api/receipts/ocr`
#[derive(Debug, Clone, Deserialize)]
pub struct OcrResult {
    pub parsed_receipt: NewReceipt,
    #[serde(default)]
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Analytics
// ─────────────────────────────────────────────────────────────────────────────

/// Savings from going paperless, recomputed server-side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalImpact {
    pub trees_saved: f64,
    #[serde(rename = "water_saved")]
    pub water_saved_liters: f64,
    #[serde(rename = "co2_reduced")]
    pub co2_reduced_kg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySpending {
    pub month: String,
    pub amount: f64,
}

/// Aggregate spending numbers for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingAnalytics {
    pub total_spent: f64,
    /// Category name → amount. Order carries no meaning.
    #[serde(default)]
    pub category_breakdown: HashMap<String, f64>,
    #[serde(default)]
    pub monthly_spending: Vec<MonthlySpending>,
}

impl SpendingAnalytics {
    /// Categories sorted by amount, largest first
    pub fn top_categories(&self) -> Vec<(&str, f64)> {
        let mut categories: Vec<_> = self
            .category_breakdown
            .iter()
            .map(|(name, amount)| (name.as_str(), *amount))
            .collect();
        categories.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        categories
    }
}

/// Response of `GET /api/health`
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_accepts_number_or_string() {
        let numeric: User = serde_json::from_str(r#"{"id": 1, "name": "A"}"#).unwrap();
        assert_eq!(numeric.id, "1");
        assert_eq!(numeric.email, None);

        let text: User = serde_json::from_str(
            r#"{"id": "9f1c", "name": "B", "email": "b@example.com", "created_at": "2025-01-05T10:00:00"}"#,
        )
        .unwrap();
        assert_eq!(text.id, "9f1c");
        assert_eq!(text.email.as_deref(), Some("b@example.com"));
    }

    #[test]
    fn test_receipt_from_server_json() {
        let json = r#"{
            "id": "r-1",
            "user_id": "u-1",
            "retailer": "Whole Foods Market",
            "date": "2025-01-15",
            "time": "14:32",
            "items": [
                {"name": "Organic Bananas", "quantity": 2, "price": 3.98},
                {"name": "Almond Milk", "quantity": 1, "price": 4.49}
            ],
            "subtotal": 8.47,
            "tax": 0.68,
            "total": 9.15,
            "category": "Groceries",
            "logo": "https://placehold.co/50x50?text=WF",
            "created_at": "2025-01-15T14:33:00"
        }"#;

        let receipt: Receipt = serde_json::from_str(json).unwrap();
        assert_eq!(receipt.line_items.len(), 2);
        assert_eq!(receipt.line_items[0].unit_price, 3.98);
        assert_eq!(receipt.unit_count(), 3);
        assert_eq!(
            receipt.logo_url.as_deref(),
            Some("https://placehold.co/50x50?text=WF")
        );
        assert!(receipt.is_balanced());
    }

    #[test]
    fn test_unbalanced_receipt_is_reported() {
        let json = r#"{"id": "r-2", "retailer": "Shell", "date": "2025-01-10", "time": "08:00",
            "items": [], "subtotal": 40.0, "tax": 3.2, "total": 45.0, "category": "Gas"}"#;
        let receipt: Receipt = serde_json::from_str(json).unwrap();
        assert!(!receipt.is_balanced());
        assert_eq!(receipt.logo_url, None);
    }

    #[test]
    fn test_analytics_wire_names() {
        let impact: EnvironmentalImpact =
            serde_json::from_str(r#"{"trees_saved": 0.37, "water_saved": 62.5, "co2_reduced": 12.5}"#)
                .unwrap();
        assert_eq!(impact.water_saved_liters, 62.5);
        assert_eq!(impact.co2_reduced_kg, 12.5);

        let analytics: SpendingAnalytics = serde_json::from_str(
            r#"{"total_spent": 120.0,
                "category_breakdown": {"Groceries": 80.0, "Gas": 40.0},
                "monthly_spending": [{"month": "Jan", "amount": 20.0}]}"#,
        )
        .unwrap();
        assert_eq!(
            analytics.top_categories(),
            vec![("Groceries", 80.0), ("Gas", 40.0)]
        );
        assert_eq!(analytics.monthly_spending[0].month, "Jan");
    }
}
