use std::sync::Arc;

use anyhow::Context as _;
use serde_json::Value as JsonValue;
use tracing::info;

use optimapos_config::Settings;
use optimapos_events::{EventEnvelope, InMemoryEventBus};
use optimapos_inventory::{InMemoryInventoryStore, InventoryLedger, MovementService};
use optimapos_nomenclatures::{ApprovalService, DocumentService, StatusResolver};
use optimapos_partners::PartnerService;
use optimapos_pricing::{AverageCostLookup, PricingService};
use optimapos_products::ProductCatalog;

use crate::workflows::seed_default_workflows;

pub type AppBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type AppInventory = MovementService<InMemoryInventoryStore>;
pub type AppDocuments = DocumentService<InMemoryInventoryStore, AppBus>;

/// Every service of one process, sharing stores and one event bus.
pub struct AppContext {
    pub settings: Settings,
    pub catalog: Arc<ProductCatalog>,
    pub partners: Arc<PartnerService>,
    pub inventory: Arc<AppInventory>,
    pub pricing: Arc<PricingService>,
    pub resolver: Arc<StatusResolver>,
    pub approvals: Arc<ApprovalService>,
    pub documents: Arc<AppDocuments>,
    pub bus: AppBus,
}

/// Install the global subscriber described by `settings.logging`.
pub fn init_logging(settings: &Settings) {
    optimapos_observability::init_with(&settings.logging.filter, settings.logging.format);
}

impl AppContext {
    /// Load settings from the environment, start logging and wire services.
    pub fn bootstrap() -> anyhow::Result<Self> {
        let settings = Settings::load().context("loading settings")?;
        init_logging(&settings);
        Self::from_settings(settings)
    }

    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let catalog = Arc::new(ProductCatalog::default());
        let partners = Arc::new(PartnerService::default());

        let store = InMemoryInventoryStore::new(InventoryLedger::new(
            settings.inventory.batch_number_prefix.clone(),
        ));
        let inventory = Arc::new(
            MovementService::new(store, Arc::clone(&catalog))
                .with_negative_stock_default(settings.inventory.allow_negative_stock),
        );
        let pricing = Arc::new(PricingService::new(
            Arc::clone(&catalog),
            Arc::clone(&partners),
            Arc::clone(&inventory) as Arc<dyn AverageCostLookup>,
        ));

        let resolver = Arc::new(StatusResolver::new());
        let approvals = Arc::new(ApprovalService::new());
        if settings.documents.seed_default_workflows {
            seed_default_workflows(&resolver, &approvals).context("seeding document workflows")?;
        }

        let bus: AppBus = Arc::new(InMemoryEventBus::new());
        let documents = Arc::new(
            DocumentService::new(
                Arc::clone(&resolver),
                Arc::clone(&approvals),
                Arc::clone(&inventory),
                Arc::clone(&catalog),
                Arc::clone(&partners),
                Arc::clone(&bus),
            )
            .with_number_padding(settings.documents.number_padding),
        );

        info!(
            environment = %settings.environment,
            allow_negative_stock = settings.inventory.allow_negative_stock,
            seeded = settings.documents.seed_default_workflows,
            "application context ready"
        );
        Ok(Self {
            settings,
            catalog,
            partners,
            inventory,
            pricing,
            resolver,
            approvals,
            documents,
            bus,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_seed_workflows() {
        let ctx = AppContext::from_settings(Settings::defaults().unwrap()).unwrap();
        assert_eq!(ctx.resolver.document_types().unwrap().len(), 7);
    }

    #[test]
    fn seeding_can_be_turned_off() {
        let settings =
            Settings::from_toml("[documents]\nseed_default_workflows = false\n").unwrap();
        let ctx = AppContext::from_settings(settings).unwrap();
        assert!(ctx.resolver.document_types().unwrap().is_empty());
    }
}
