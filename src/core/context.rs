use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::core::config::{AppConfig, DeployEnv};
use crate::core::date::{DateResolver, DayInput, DayLedger, SqliteDayLedger};
use crate::core::error::SchedulerError;
use crate::core::generation::{
    GenerationService, HttpPublisher, HttpSynthesisBackend, Pipeline, SourceLoader,
};

/// Everything the commands share, built once at startup.
pub struct AppContext {
    pub env: DeployEnv,
    pub data_dir: PathBuf,
    pub config: AppConfig,
    pub resolver: DateResolver,
    pub ledger: Arc<SqliteDayLedger>,
}

impl AppContext {
    pub async fn from_parts(env: DeployEnv, data_dir: PathBuf, config: AppConfig) -> Result<Self> {
        let ledger = SqliteDayLedger::open(config.ledger_path(&data_dir, env)).await?;
        info!(
            "Context ready (env: {}, data dir: {})",
            env.as_str(),
            data_dir.display()
        );
        Ok(Self {
            env,
            data_dir,
            resolver: DateResolver::new(config.calendar.into()),
            config,
            ledger: Arc::new(ledger),
        })
    }

    /// Resolve a day identifier. With `rotate`, the ledger takes part and the
    /// boundary defaults to the ledger's newest date.
    pub async fn resolve_date(
        &self,
        day: Option<DayInput>,
        latest_known: Option<i64>,
        rotate: bool,
    ) -> Result<Option<i64>, SchedulerError> {
        if !rotate {
            return self.resolver.resolve(day, latest_known, None).await;
        }
        let latest_known = match latest_known {
            Some(latest) => latest,
            None => self.resolver.latest_baseline(&*self.ledger).await?,
        };
        let ledger: &dyn DayLedger = &*self.ledger;
        self.resolver
            .resolve(day, Some(latest_known), Some(ledger))
            .await
    }

    /// Wire the HTTP backends and publisher and start the worker.
    pub fn start_generation(&self) -> GenerationService {
        let backends = &self.config.backends;
        let synthesis = Arc::new(HttpSynthesisBackend::new(
            backends.image_edit_url.clone(),
            backends.text_to_image_url.clone(),
            Duration::from_secs(backends.timeout_secs),
        ));
        let publisher = Arc::new(HttpPublisher::new(
            &self.config.publisher_base_url(self.env),
            &self.config.publisher.create_path,
            Duration::from_secs(self.config.publisher.timeout_secs),
        ));
        info!("Publishing to {}", publisher.endpoint());

        GenerationService::start(
            SourceLoader::new(Duration::from_secs(self.config.source.fetch_timeout_secs)),
            Pipeline {
                image_edit: synthesis.clone(),
                text_to_image: synthesis,
                publisher,
            },
        )
    }
}
