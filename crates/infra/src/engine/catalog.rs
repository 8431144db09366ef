use chrono::{DateTime, Utc};

use tallybook_accounting::{BankAccount, BankAccountCommand, BankAccountId, OpenBankAccount};
use tallybook_core::TenantId;
use tallybook_products::{
    ArchiveProduct, ChangePricing, CreateProduct, Pricing, Product, ProductCommand, ProductId,
};

use super::{Engine, NewProduct};
use crate::error::EngineError;
use crate::event_store::EventStore;

impl<S> Engine<S>
where
    S: EventStore,
{
    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, sku = %request.sku))]
    pub fn create_product(&self, tenant_id: TenantId, request: NewProduct) -> Result<ProductId, EngineError> {
        let product_id = ProductId::generate();
        self.dispatcher.dispatch::<Product>(
            tenant_id,
            ProductCommand::CreateProduct(CreateProduct {
                tenant_id,
                product_id,
                sku: request.sku,
                name: request.name,
                unit: request.unit,
                pricing: request.pricing,
                min_stock: request.min_stock,
                occurred_at: request.occurred_at,
            }),
        )?;
        tracing::info!(%product_id, "product created");
        Ok(product_id)
    }

    /// Replace a product's prices. The new cost price becomes the valuation
    /// fallback for a product that has never been received.
    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, product = %product_id))]
    pub fn change_pricing(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        pricing: Pricing,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let written = self.dispatcher.dispatch::<Product>(
            tenant_id,
            ProductCommand::ChangePricing(ChangePricing {
                tenant_id,
                product_id,
                pricing,
                occurred_at,
            }),
        )?;
        if written.is_empty() {
            tracing::debug!("pricing unchanged");
        }
        Ok(())
    }

    /// Archive a product. Archived products cannot appear on new order lines;
    /// history that already references them is unaffected.
    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, product = %product_id))]
    pub fn archive_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.dispatcher.dispatch::<Product>(
            tenant_id,
            ProductCommand::ArchiveProduct(ArchiveProduct {
                tenant_id,
                product_id,
                occurred_at,
            }),
        )?;
        tracing::info!("product archived");
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(tenant = %tenant_id))]
    pub fn open_bank_account(
        &self,
        tenant_id: TenantId,
        name: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<BankAccountId, EngineError> {
        let bank_account_id = BankAccountId::generate();
        self.dispatcher.dispatch::<BankAccount>(
            tenant_id,
            BankAccountCommand::Open(OpenBankAccount {
                tenant_id,
                bank_account_id,
                name: name.to_string(),
                occurred_at,
            }),
        )?;
        tracing::info!(%bank_account_id, "bank account opened");
        Ok(bank_account_id)
    }
}
