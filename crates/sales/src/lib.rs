//! Sales module (event-sourced sales orders).
//!
//! A sales order's lines leave stock only while the order is `delivered`;
//! cancelling a delivered order restores them.

pub mod order;

pub use order::{
    AddLine, CancelSalesOrder, CreateSalesOrder, DeliverOrder, OrderDelivered, OrderLine,
    SalesOrder, SalesOrderCancelled, SalesOrderCommand, SalesOrderCreated, SalesOrderEvent,
    SalesOrderId, SalesOrderLineAdded, SalesOrderStatus,
};
