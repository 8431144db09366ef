//! Purchasing module (event-sourced purchase orders).
//!
//! Pure domain logic only. A purchase order's lines count toward derived stock
//! only while the order sits in the `goods_received` terminal state.

pub mod order;

pub use order::{
    AddLine, CancelPurchaseOrder, CreatePurchaseOrder, GoodsReceived, PurchaseLine,
    PurchaseOrder, PurchaseOrderCancelled, PurchaseOrderCommand, PurchaseOrderCreated,
    PurchaseOrderEvent, PurchaseOrderId, PurchaseOrderLineAdded, PurchaseOrderStatus,
    ReceiveGoods,
};
