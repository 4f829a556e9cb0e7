//! Perfume pricing view.
//!
//! The catalog row carries two price columns: `price` (canonical) and
//! `base_price` (legacy). They are resolved exactly once, here, so the order
//! workflow only ever sees a single authoritative unit price.

use rust_decimal::Decimal;

/// Stock of a perfume.
///
/// `Finite(0)` is depleted; a missing `stock_qty` column means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockLevel {
    Unlimited,
    Finite(u32),
}

impl StockLevel {
    /// Build from the nullable `stock_qty` column. Negative values clamp to 0.
    pub fn from_column(stock_qty: Option<i32>) -> Self {
        match stock_qty {
            None => StockLevel::Unlimited,
            Some(n) => StockLevel::Finite(u32::try_from(n).unwrap_or(0)),
        }
    }

    pub fn to_column(self) -> Option<i32> {
        match self {
            StockLevel::Unlimited => None,
            StockLevel::Finite(n) => Some(i32::try_from(n).unwrap_or(i32::MAX)),
        }
    }

    /// Stock after shipping `qty` units, floored at zero.
    pub fn after_shipping(self, qty: u32) -> Self {
        match self {
            StockLevel::Unlimited => StockLevel::Unlimited,
            StockLevel::Finite(n) => StockLevel::Finite(n.saturating_sub(qty)),
        }
    }

    pub fn is_depleted(self) -> bool {
        matches!(self, StockLevel::Finite(0))
    }
}

/// Resolve the dual price columns: legacy `base_price` only when `price` is absent.
pub fn resolve_price(price: Option<Decimal>, base_price: Option<Decimal>) -> Option<Decimal> {
    price.or(base_price)
}

/// Raw catalog row as stored in the `perfumes` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PerfumeRecord {
    pub id: String,
    pub price: Option<Decimal>,
    pub base_price: Option<Decimal>,
    pub currency: String,
    pub stock_qty: Option<i32>,
    pub in_stock: bool,
    pub order_count: i64,
}

impl PerfumeRecord {
    /// Pricing view of this row, or `None` when neither price column is set.
    pub fn pricing(&self) -> Option<PerfumePricing> {
        let price = resolve_price(self.price, self.base_price)?;
        Some(PerfumePricing {
            price,
            currency: self.currency.trim().to_string(),
        })
    }
}

/// Authoritative pricing view of a perfume used by the order workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct PerfumePricing {
    /// Unit price after resolving `price` / `base_price`
    pub price: Decimal,

    /// Trimmed currency symbol; empty when the catalog has none
    pub currency: String,
}
