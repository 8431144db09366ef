//! Inventory valuation (derived, never stored).
//!
//! Stock quantities and values are computed on demand from the lines of
//! completed orders: goods-received purchase orders add stock, delivered
//! sales orders remove it. There is no mutable stock counter anywhere.

pub mod valuation;

pub use valuation::{
    MovementDirection, StockFloorPolicy, StockItem, StockMovement, StockPosition, StockReport,
    StockReportRow, build_stock_report, value_product,
};
