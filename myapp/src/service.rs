use crate::config::Config;
use lambda_runtime::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResults {
    pub status: String,
    pub processed_items: usize,
    pub failed_items: usize,
}

/// Main application service.
///
/// Add clients for external systems as fields and set them up in
/// `initialize`. The fetch/process/store helpers are the places to put the
/// actual work.
pub struct AppService {
    config: Config,
    queued: Vec<Value>,
}

impl AppService {
    pub fn new(config: Config) -> Self {
        info!("Initializing AppService with app_setting: {}", config.app_setting);
        Self {
            config,
            queued: Vec::new(),
        }
    }

    /// Seeds the batch `fetch_data` hands to processing.
    pub fn with_items(mut self, items: Vec<Value>) -> Self {
        self.queued = items;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn initialize(&mut self) -> Result<(), Error> {
        info!("Initializing services...");
        info!("Services initialized");
        Ok(())
    }

    pub async fn process_data(&self) -> Result<ProcessingResults, Error> {
        info!("Starting data processing...");

        let items = self.fetch_data().await?;
        let total = items.len();
        let processed = self.process_items(items).await;
        let results = ProcessingResults {
            status: "success".to_string(),
            processed_items: processed.len(),
            failed_items: total - processed.len(),
        };
        self.store_results(&processed).await?;

        info!("Processing completed: {:?}", results);
        Ok(results)
    }

    pub async fn run(&mut self) -> Result<ProcessingResults, Error> {
        info!("Starting MyApp execution");

        if let Err(e) = self.initialize().await {
            error!("Service initialization failed: {}", e);
            return Err(e);
        }
        let results = match self.process_data().await {
            Ok(r) => r,
            Err(e) => {
                error!("Error during processing: {}", e);
                return Err(e);
            }
        };

        info!("MyApp execution completed successfully: {:?}", results);
        Ok(results)
    }

    async fn fetch_data(&self) -> Result<Vec<Value>, Error> {
        debug!("Fetching data...");
        Ok(self.queued.clone())
    }

    /// A failing item is logged and dropped; the rest of the batch carries on.
    async fn process_items(&self, items: Vec<Value>) -> Vec<Value> {
        debug!("Processing {} items...", items.len());
        let mut processed = Vec::with_capacity(items.len());
        for item in items {
            match self.process_single_item(item).await {
                Ok(v) => processed.push(v),
                Err(e) => error!("Error processing item: {}", e),
            }
        }
        processed
    }

    async fn process_single_item(&self, item: Value) -> Result<Value, Error> {
        if item.is_null() {
            return Err(Error::from("null item"));
        }
        Ok(item)
    }

    async fn store_results(&self, results: &[Value]) -> Result<(), Error> {
        debug!("Storing {} results...", results.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvSnapshot;
    use serde_json::json;

    fn service() -> AppService {
        AppService::new(Config::from_snapshot(EnvSnapshot::from_pairs([(
            "MYAPP_REQUIRED_VAR",
            "x",
        )])))
    }

    #[tokio::test]
    async fn run_on_empty_batch() {
        let results = service().run().await.unwrap();
        assert_eq!(
            results,
            ProcessingResults {
                status: "success".to_string(),
                processed_items: 0,
                failed_items: 0,
            }
        );
    }

    #[tokio::test]
    async fn bad_items_are_skipped() {
        let svc = service();
        let processed = svc
            .process_items(vec![json!({"id": 1}), Value::Null, json!({"id": 2})])
            .await;
        assert_eq!(processed, vec![json!({"id": 1}), json!({"id": 2})]);
    }

    #[tokio::test]
    async fn failed_items_are_counted() {
        let svc = service().with_items(vec![json!({"id": 1}), Value::Null, Value::Null, json!("ok")]);
        let results = svc.process_data().await.unwrap();
        assert_eq!(results.processed_items, 2);
        assert_eq!(results.failed_items, 2);
        assert_eq!(results.status, "success");
    }
}
