//! # Test Fixtures
//!
//! Features and bus helpers shared by the integration flows.

use std::sync::Arc;

use async_trait::async_trait;
use feature_runtime::{Feature, FeatureContext};
use parking_lot::Mutex;
use shared_bus::{BusConfig, EventCatalog, EventTable, InMemoryEventBus};

/// Ordered log of lifecycle hooks, shared between features under test.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// Create an empty journal.
pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// Snapshot of a journal's entries.
pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().clone()
}

/// Strict, traced bus whose catalog holds the core events plus `table`.
pub fn app_bus(table: &EventTable) -> Arc<InMemoryEventBus> {
    Arc::new(InMemoryEventBus::with_catalog(
        BusConfig::default(),
        EventCatalog::core().with_table(table),
    ))
}

/// Feature that records each hook as `<hook>:<name>`.
pub struct Recorder {
    name: String,
    dependencies: Vec<String>,
    flag: Option<String>,
    fail_install: bool,
    journal: Journal,
}

impl Recorder {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            dependencies: Vec::new(),
            flag: None,
            fail_install: false,
            journal: Arc::clone(journal),
        }
    }

    pub fn depends_on(mut self, dependencies: &[&str]) -> Self {
        self.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn flagged(mut self, flag: &str) -> Self {
        self.flag = Some(flag.to_string());
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_install = true;
        self
    }

    fn record(&self, hook: &str) {
        self.journal.lock().push(format!("{}:{}", hook, self.name));
    }
}

#[async_trait]
impl Feature for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn flag(&self) -> Option<&str> {
        self.flag.as_deref()
    }

    async fn install(&self, _ctx: &FeatureContext) -> anyhow::Result<()> {
        if self.fail_install {
            anyhow::bail!("{} refused to install", self.name);
        }
        self.record("install");
        Ok(())
    }

    async fn uninstall(&self, _ctx: &FeatureContext) -> anyhow::Result<()> {
        self.record("uninstall");
        Ok(())
    }

    fn on_enable(&self, _ctx: &FeatureContext) -> anyhow::Result<()> {
        self.record("enable");
        Ok(())
    }

    fn on_disable(&self, _ctx: &FeatureContext) -> anyhow::Result<()> {
        self.record("disable");
        Ok(())
    }
}
