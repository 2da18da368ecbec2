//! Quote models, totals and numbering

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a quote
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "VARCHAR", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    #[default]
    Draft,
    Sent,
    Accepted,
    Rejected,
    Expired,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Draft => "draft",
            QuoteStatus::Sent => "sent",
            QuoteStatus::Accepted => "accepted",
            QuoteStatus::Rejected => "rejected",
            QuoteStatus::Expired => "expired",
        }
    }

    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        use QuoteStatus::*;
        matches!(
            (self, next),
            (Draft, Sent) | (Sent, Accepted) | (Sent, Rejected) | (Sent, Expired)
        )
    }

    /// Only drafts can have their content changed
    pub fn is_editable(&self) -> bool {
        matches!(self, QuoteStatus::Draft)
    }

    pub fn is_deletable(&self) -> bool {
        matches!(
            self,
            QuoteStatus::Draft | QuoteStatus::Rejected | QuoteStatus::Expired
        )
    }
}

impl std::fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One priced line on a quote
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuoteItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl QuoteItem {
    pub fn line_total(&self) -> Decimal {
        self.quantity * self.unit_price
    }
}

/// Server-computed money fields of a quote
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct QuoteTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

impl QuoteTotals {
    /// Sum the lines and apply `tax_rate` (a percentage), rounding money to cents
    pub fn compute(items: &[QuoteItem], tax_rate: Decimal) -> Self {
        let subtotal = round_money(items.iter().map(QuoteItem::line_total).sum());
        let tax_amount = round_money(subtotal * tax_rate / Decimal::ONE_HUNDRED);
        Self {
            subtotal,
            tax_amount,
            total: subtotal + tax_amount,
        }
    }
}

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Check quote lines before totals are computed
pub fn validate_quote_items(items: &[QuoteItem]) -> Result<(), &'static str> {
    if items.is_empty() {
        return Err("A quote needs at least one item");
    }
    for item in items {
        if item.description.trim().is_empty() {
            return Err("Item description cannot be empty");
        }
        if item.quantity <= Decimal::ZERO {
            return Err("Item quantity must be greater than zero");
        }
        if item.unit_price < Decimal::ZERO {
            return Err("Item unit price cannot be negative");
        }
    }
    Ok(())
}

pub fn validate_tax_rate(tax_rate: Decimal) -> Result<(), &'static str> {
    if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE_HUNDRED {
        return Err("Tax rate must be between 0 and 100");
    }
    Ok(())
}

/// Format a quote number: `Q-YYYYMM-NNNN`, sequence is 1-based within the month
pub fn format_quote_number(year: i32, month: u32, sequence: i64) -> String {
    format!("Q-{:04}{:02}-{:04}", year, month, sequence)
}

/// Prefix shared by every quote number issued in the given month
pub fn quote_number_prefix(year: i32, month: u32) -> String {
    format!("Q-{:04}{:02}-", year, month)
}

/// A price proposal sent to a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub id: Uuid,
    pub quote_number: String,
    pub client_id: Uuid,
    pub service_id: Option<Uuid>,
    pub created_by: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub items: Vec<QuoteItem>,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub status: QuoteStatus,
    pub valid_until: Option<NaiveDate>,
    pub sent_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    /// A sent quote past its validity date can no longer be accepted
    pub fn is_past_validity(&self, today: NaiveDate) -> bool {
        self.valid_until.is_some_and(|until| until < today)
    }

    /// Status an acceptance attempt on `today` ends in
    pub fn acceptance_status(&self, today: NaiveDate) -> QuoteStatus {
        if self.is_past_validity(today) {
            QuoteStatus::Expired
        } else {
            QuoteStatus::Accepted
        }
    }

    /// Linked service and the cost it takes once this quote is accepted
    pub fn service_cost(&self) -> Option<(Uuid, Decimal)> {
        self.service_id.map(|service_id| (service_id, self.total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn item(qty: &str, price: &str) -> QuoteItem {
        QuoteItem {
            description: "Labour".to_string(),
            quantity: dec(qty),
            unit_price: dec(price),
        }
    }

    #[test]
    fn totals_apply_tax_and_round() {
        let items = vec![item("2", "45.50"), item("1.5", "20")];
        let totals = QuoteTotals::compute(&items, dec("7.25"));
        assert_eq!(totals.subtotal, dec("121.00"));
        // 121 * 7.25% = 8.7725 -> 8.77
        assert_eq!(totals.tax_amount, dec("8.77"));
        assert_eq!(totals.total, dec("129.77"));
    }

    #[test]
    fn zero_tax_keeps_subtotal() {
        let totals = QuoteTotals::compute(&[item("3", "10")], Decimal::ZERO);
        assert_eq!(totals.total, dec("30"));
        assert_eq!(totals.tax_amount, Decimal::ZERO);
    }

    #[test]
    fn items_are_validated() {
        assert!(validate_quote_items(&[]).is_err());
        assert!(validate_quote_items(&[item("0", "10")]).is_err());
        assert!(validate_quote_items(&[item("1", "-1")]).is_err());
        assert!(validate_quote_items(&[item("1", "0")]).is_ok());
    }

    #[test]
    fn quote_number_format() {
        assert_eq!(format_quote_number(2026, 3, 7), "Q-202603-0007");
        assert!(format_quote_number(2026, 3, 7).starts_with(&quote_number_prefix(2026, 3)));
    }

    fn sent_quote(valid_until: Option<NaiveDate>, service_id: Option<Uuid>) -> Quote {
        let now = Utc::now();
        Quote {
            id: Uuid::new_v4(),
            quote_number: format_quote_number(2025, 3, 1),
            client_id: Uuid::new_v4(),
            service_id,
            created_by: Uuid::new_v4(),
            title: "Compressor replacement".to_string(),
            description: None,
            items: vec![item("1", "250")],
            subtotal: dec("250"),
            tax_rate: dec("10"),
            tax_amount: dec("25"),
            total: dec("275"),
            status: QuoteStatus::Sent,
            valid_until,
            sent_at: Some(now),
            responded_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn acceptance_after_validity_expires() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(
            sent_quote(Some(yesterday), None).acceptance_status(today),
            QuoteStatus::Expired
        );
        assert_eq!(
            sent_quote(Some(today), None).acceptance_status(today),
            QuoteStatus::Accepted
        );
        assert_eq!(
            sent_quote(None, None).acceptance_status(today),
            QuoteStatus::Accepted
        );
    }

    #[test]
    fn accepted_total_becomes_service_cost() {
        let service_id = Uuid::new_v4();
        assert_eq!(
            sent_quote(None, Some(service_id)).service_cost(),
            Some((service_id, dec("275")))
        );
        assert_eq!(sent_quote(None, None).service_cost(), None);
    }

    #[test]
    fn only_sent_quotes_get_answered() {
        assert!(QuoteStatus::Sent.can_transition_to(QuoteStatus::Accepted));
        assert!(!QuoteStatus::Draft.can_transition_to(QuoteStatus::Accepted));
        assert!(!QuoteStatus::Accepted.can_transition_to(QuoteStatus::Rejected));
        assert!(QuoteStatus::Draft.is_editable());
        assert!(!QuoteStatus::Sent.is_editable());
    }
}
