use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallybook_core::{DomainError, DomainResult, checked_line_total, checked_sum};
use tallybook_products::ProductId;

/// What to do when deliveries exceed receipts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockFloorPolicy {
    /// Report zero stock (the raw balance is still exposed).
    #[default]
    ClampToZero,
    /// Report the raw, possibly negative, balance.
    Report,
}

impl FromStr for StockFloorPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clamp_to_zero" => Ok(StockFloorPolicy::ClampToZero),
            "report" => Ok(StockFloorPolicy::Report),
            other => Err(DomainError::validation(format!("unknown stock floor policy: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementDirection {
    /// Line of a goods-received purchase order.
    Receipt,
    /// Line of a delivered sales order.
    Delivery,
}

/// One order line that currently counts toward stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub product_id: ProductId,
    pub direction: MovementDirection,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub occurred_at: DateTime<Utc>,
    /// Position in the tenant log; orders same-instant movements.
    pub log_position: u64,
}

/// Stock and valuation of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPosition {
    pub product_id: ProductId,
    /// Quantity after the floor policy.
    pub quantity: Decimal,
    /// `Σ(received) − Σ(delivered)`, unclamped.
    pub raw_quantity: Decimal,
    pub unit_cost: Decimal,
    pub stock_value: Decimal,
    pub oversold: bool,
}

/// Compute stock for `product_id` from `movements`.
///
/// Movements of other products are ignored. The unit cost is the price of
/// the most recent receipt (ties broken by log position), or `fallback_cost`
/// when the product was never received.
pub fn value_product(
    product_id: ProductId,
    movements: &[StockMovement],
    fallback_cost: Decimal,
    policy: StockFloorPolicy,
) -> DomainResult<StockPosition> {
    let mut received = Decimal::ZERO;
    let mut delivered = Decimal::ZERO;
    let mut latest_receipt: Option<&StockMovement> = None;

    for m in movements.iter().filter(|m| m.product_id == product_id) {
        match m.direction {
            MovementDirection::Receipt => {
                received = checked_sum([received, m.quantity], "received quantity")?;
                let newer = latest_receipt
                    .map(|l| (m.occurred_at, m.log_position) >= (l.occurred_at, l.log_position))
                    .unwrap_or(true);
                if newer {
                    latest_receipt = Some(m);
                }
            }
            MovementDirection::Delivery => {
                delivered = checked_sum([delivered, m.quantity], "delivered quantity")?;
            }
        }
    }

    let raw_quantity = received
        .checked_sub(delivered)
        .ok_or_else(|| DomainError::validation("stock quantity is out of range"))?;
    let oversold = raw_quantity < Decimal::ZERO;
    let quantity = match policy {
        StockFloorPolicy::ClampToZero if oversold => {
            tracing::warn!(
                %product_id,
                %raw_quantity,
                "deliveries exceed receipts; reporting zero stock"
            );
            Decimal::ZERO
        }
        _ => raw_quantity,
    };

    let unit_cost = latest_receipt.map(|m| m.unit_price).unwrap_or(fallback_cost);

    let stock_value = checked_line_total(quantity, unit_cost)
        .map_err(|_| DomainError::validation(format!("stock value of product {product_id} is out of range")))?;

    Ok(StockPosition {
        product_id,
        quantity,
        raw_quantity,
        unit_cost,
        stock_value,
        oversold,
    })
}

/// Catalog data needed to report on a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockItem {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub cost_price: Decimal,
    pub min_stock: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReportRow {
    pub sku: String,
    pub name: String,
    pub position: StockPosition,
    pub min_stock: Decimal,
    pub below_minimum: bool,
}

/// Tenant-wide stock valuation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReport {
    pub rows: Vec<StockReportRow>,
    pub total_quantity: Decimal,
    pub total_value: Decimal,
    pub below_minimum_count: usize,
    pub oversold_count: usize,
}

impl StockReport {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Value every item in `items`, in SKU order.
pub fn build_stock_report<I>(
    items: I,
    movements: &[StockMovement],
    policy: StockFloorPolicy,
) -> DomainResult<StockReport>
where
    I: IntoIterator<Item = StockItem>,
{
    let mut items: Vec<StockItem> = items.into_iter().collect();
    items.sort_by(|a, b| a.sku.cmp(&b.sku));

    let mut report = StockReport::empty();
    for item in items {
        let position = value_product(item.product_id, movements, item.cost_price, policy)?;
        let below_minimum = position.quantity < item.min_stock;

        report.total_quantity = checked_sum([report.total_quantity, position.quantity], "total quantity")?;
        report.total_value = checked_sum([report.total_value, position.stock_value], "total stock value")?;
        report.below_minimum_count += usize::from(below_minimum);
        report.oversold_count += usize::from(position.oversold);

        report.rows.push(StockReportRow {
            sku: item.sku,
            name: item.name,
            position,
            min_stock: item.min_stock,
            below_minimum,
        });
    }
    Ok(report)
}
