//! Cached reference data: settings, service catalog and weekly template.

use crate::availability::WeeklyTemplate;
use crate::cache::TtlCache;
use crate::error::BookingResult;
use crate::service::ServiceCatalog;
use crate::settings::Settings;
use crate::store::SharedReferenceStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Cache lifetimes for each reference table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub settings: Duration,
    pub catalog: Duration,
    pub template: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            settings: Duration::from_secs(600),
            catalog: Duration::from_secs(480),
            template: Duration::from_secs(300),
        }
    }
}

pub struct ReferenceData {
    store: SharedReferenceStore,
    settings: TtlCache<(), Arc<Settings>>,
    catalog: TtlCache<(), Arc<ServiceCatalog>>,
    template: TtlCache<(), Arc<WeeklyTemplate>>,
}

impl ReferenceData {
    pub fn new(store: SharedReferenceStore, ttls: CacheTtls) -> Self {
        Self {
            store,
            settings: TtlCache::new("settings", ttls.settings),
            catalog: TtlCache::new("catalog", ttls.catalog),
            template: TtlCache::new("template", ttls.template),
        }
    }

    pub async fn settings(&self) -> BookingResult<Arc<Settings>> {
        self.settings
            .get_or_fetch((), || async {
                let pairs = self.store.fetch_settings().await?;
                Ok(Arc::new(Settings::from_pairs(&pairs)))
            })
            .await
    }

    /// Settings, or defaults when the store cannot be reached.
    ///
    /// For best-effort paths (notifications, calendar text) only.
    pub async fn settings_or_default(&self) -> Arc<Settings> {
        match self.settings().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Settings unavailable, using defaults: {}", e);
                Arc::new(Settings::default())
            }
        }
    }

    pub async fn catalog(&self) -> BookingResult<Arc<ServiceCatalog>> {
        self.catalog
            .get_or_fetch((), || async {
                let services = self.store.fetch_services().await?;
                Ok(Arc::new(ServiceCatalog::from_services(services)))
            })
            .await
    }

    pub async fn template(&self) -> BookingResult<Arc<WeeklyTemplate>> {
        self.template
            .get_or_fetch((), || async {
                let slots = self.store.fetch_template().await?;
                Ok(Arc::new(WeeklyTemplate::from_slots(&slots)))
            })
            .await
    }

    /// Write one setting and drop the cached settings
    #[instrument(skip(self, value))]
    pub async fn put_setting(&self, key: &str, value: &str) -> BookingResult<()> {
        self.store.put_setting(key, value).await?;
        self.settings.invalidate(&()).await;
        Ok(())
    }

    pub async fn invalidate_settings(&self) {
        self.settings.invalidate(&()).await;
    }

    pub async fn invalidate_catalog(&self) {
        self.catalog.invalidate(&()).await;
    }

    pub async fn invalidate_template(&self) {
        self.template.invalidate(&()).await;
    }

    pub async fn invalidate_all(&self) {
        self.invalidate_settings().await;
        self.invalidate_catalog().await;
        self.invalidate_template().await;
        info!("Reference caches invalidated");
    }
}
