//! Product catalog (event-sourced).
//!
//! Products carry pricing and the minimum-stock threshold only. There is no
//! stored quantity: stock is always derived from order history.

pub mod product;

pub use product::{
    ArchiveProduct, ChangePricing, CreateProduct, Pricing, PricingChanged, Product,
    ProductArchived, ProductCommand, ProductCreated, ProductEvent, ProductId, ProductStatus,
};
