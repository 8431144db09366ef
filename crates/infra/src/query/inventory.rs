//! Stock movements and valuation derived from order history.

use rust_decimal::Decimal;

use tallybook_inventory::valuation::{
    MovementDirection, StockFloorPolicy, StockItem, StockMovement, StockPosition, StockReport,
    build_stock_report, value_product,
};
use tallybook_products::{Product, ProductId};
use tallybook_purchasing::{PurchaseOrder, PurchaseOrderEvent};
use tallybook_sales::{SalesOrder, SalesOrderEvent};

use super::{rehydrate, rehydrate_all};
use crate::command_dispatcher::decode;
use crate::error::EngineError;
use crate::event_store::LogSnapshot;
use crate::streams;

/// Lines of every order that currently counts toward stock, in log order.
///
/// Receipts are dated by their goods-received event and deliveries by their
/// delivery event; an order cancelled after completion contributes nothing.
pub fn stock_movements(snapshot: &LogSnapshot) -> Result<Vec<StockMovement>, EngineError> {
    let purchases = rehydrate_all::<PurchaseOrder>(snapshot)?;
    let sales = rehydrate_all::<SalesOrder>(snapshot)?;

    let mut movements = Vec::new();
    for stored in &snapshot.events {
        match stored.aggregate_type.as_str() {
            streams::PURCHASE_ORDER => {
                let PurchaseOrderEvent::GoodsReceived(e) = decode::<PurchaseOrderEvent>(stored)? else {
                    continue;
                };
                let counts = purchases
                    .get(&stored.aggregate_id)
                    .is_some_and(PurchaseOrder::counts_toward_stock);
                if counts {
                    movements.extend(e.lines.iter().map(|line| StockMovement {
                        product_id: line.product_id,
                        direction: MovementDirection::Receipt,
                        quantity: line.quantity,
                        unit_price: line.unit_price,
                        occurred_at: e.occurred_at,
                        log_position: stored.log_position,
                    }));
                }
            }
            streams::SALES_ORDER => {
                let SalesOrderEvent::OrderDelivered(e) = decode::<SalesOrderEvent>(stored)? else {
                    continue;
                };
                let counts = sales
                    .get(&stored.aggregate_id)
                    .is_some_and(SalesOrder::counts_toward_stock);
                if counts {
                    movements.extend(e.lines.iter().map(|line| StockMovement {
                        product_id: line.product_id,
                        direction: MovementDirection::Delivery,
                        quantity: line.quantity,
                        unit_price: line.unit_price,
                        occurred_at: e.occurred_at,
                        log_position: stored.log_position,
                    }));
                }
            }
            _ => {}
        }
    }
    Ok(movements)
}

/// Quantity and value of one product.
pub fn product_position(
    snapshot: &LogSnapshot,
    product_id: ProductId,
    policy: StockFloorPolicy,
) -> Result<StockPosition, EngineError> {
    let fallback_cost = rehydrate::<Product>(snapshot, product_id.0)?
        .map(|p| p.cost_price())
        .unwrap_or(Decimal::ZERO);
    let movements = stock_movements(snapshot)?;
    Ok(value_product(product_id, &movements, fallback_cost, policy)?)
}

/// Valuation of every product in the catalog.
pub fn stock_report(snapshot: &LogSnapshot, policy: StockFloorPolicy) -> Result<StockReport, EngineError> {
    let items = rehydrate_all::<Product>(snapshot)?
        .into_values()
        .filter(Product::exists)
        .map(|p| StockItem {
            product_id: p.id_typed(),
            sku: p.sku().to_string(),
            name: p.name().to_string(),
            cost_price: p.cost_price(),
            min_stock: p.min_stock(),
        });
    let movements = stock_movements(snapshot)?;
    Ok(build_stock_report(items, &movements, policy)?)
}
