use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallybook_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, ensure_non_negative, typed_id,
};
use tallybook_events::{Command, Event};

typed_id!(
    /// Product identifier (tenant-scoped via `tenant_id` fields in events/commands).
    ProductId
);

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Archived,
}

/// Static prices of a product.
///
/// `cost_price` is the valuation fallback used when the product has never
/// been received on a purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub cost_price: Decimal,
    pub selling_price: Decimal,
}

impl Pricing {
    fn validate(&self) -> Result<(), DomainError> {
        ensure_non_negative(self.cost_price, "cost price")?;
        ensure_non_negative(self.selling_price, "selling price")
    }
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    tenant_id: Option<TenantId>,
    sku: String,
    name: String,
    unit: String,
    pricing: Pricing,
    min_stock: Decimal,
    status: ProductStatus,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: String::new(),
            name: String::new(),
            unit: String::new(),
            pricing: Pricing {
                cost_price: Decimal::ZERO,
                selling_price: Decimal::ZERO,
            },
            min_stock: Decimal::ZERO,
            status: ProductStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unit of measure (e.g. "pcs", "kg").
    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    pub fn cost_price(&self) -> Decimal {
        self.pricing.cost_price
    }

    /// Minimum-stock threshold used by stock reports.
    pub fn min_stock(&self) -> Decimal {
        self.min_stock
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    /// Archived products cannot be put on new order lines.
    pub fn can_be_traded(&self) -> bool {
        self.created && self.status == ProductStatus::Active
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub pricing: Pricing,
    pub min_stock: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangePricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePricing {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub pricing: Pricing,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ArchiveProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    ChangePricing(ChangePricing),
    ArchiveProduct(ArchiveProduct),
}

impl Command for ProductCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            ProductCommand::CreateProduct(c) => c.product_id.0,
            ProductCommand::ChangePricing(c) => c.product_id.0,
            ProductCommand::ArchiveProduct(c) => c.product_id.0,
        }
    }
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub pricing: Pricing,
    pub min_stock: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PricingChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingChanged {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub pricing: Pricing,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductArchived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductArchived {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    PricingChanged(PricingChanged),
    ProductArchived(ProductArchived),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::PricingChanged(_) => "products.product.pricing_changed",
            ProductEvent::ProductArchived(_) => "products.product.archived",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::PricingChanged(e) => e.occurred_at,
            ProductEvent::ProductArchived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.tenant_id = Some(e.tenant_id);
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.unit = e.unit.clone();
                self.pricing = e.pricing.clone();
                self.min_stock = e.min_stock;
                self.status = ProductStatus::Active;
                self.created = true;
            }
            ProductEvent::PricingChanged(e) => {
                self.pricing = e.pricing.clone();
            }
            ProductEvent::ProductArchived(_) => {
                self.status = ProductStatus::Archived;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::ChangePricing(cmd) => self.handle_change_pricing(cmd),
            ProductCommand::ArchiveProduct(cmd) => self.handle_archive(cmd),
        }
    }
}

impl Product {
    fn ensure_existing(&self, tenant_id: TenantId, product_id: ProductId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.sku.trim().is_empty() {
            return Err(DomainError::validation("SKU cannot be empty"));
        }
        if cmd.unit.trim().is_empty() {
            return Err(DomainError::validation("unit of measure cannot be empty"));
        }
        cmd.pricing.validate()?;
        ensure_non_negative(cmd.min_stock, "minimum stock")?;

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            sku: cmd.sku.trim().to_string(),
            name: cmd.name.clone(),
            unit: cmd.unit.clone(),
            pricing: cmd.pricing.clone(),
            min_stock: cmd.min_stock,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_pricing(&self, cmd: &ChangePricing) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.product_id)?;
        cmd.pricing.validate()?;

        if cmd.pricing == self.pricing {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::PricingChanged(PricingChanged {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            pricing: cmd.pricing.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(&self, cmd: &ArchiveProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.product_id)?;

        if self.status == ProductStatus::Archived {
            return Err(DomainError::conflict("product is already archived"));
        }

        Ok(vec![ProductEvent::ProductArchived(ProductArchived {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
