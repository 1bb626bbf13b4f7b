//! Service assembly: builds one stage's router from configuration.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use axum::Router;

use evalforge_approval::{ApprovalService, WebhookNotifier};
use evalforge_config::{DatadogConfig, Env, Settings};
use evalforge_dashboard::{DashboardAggregator, DatadogMetricsPublisher};
use evalforge_dedup::DedupService;
use evalforge_extraction::ExtractionService;
use evalforge_generators::{
    EvalTestGenerator, GeneratorService, GuardrailGenerator, RunbookGenerator,
};
use evalforge_ingestion::{DatadogSpansClient, IngestionService};
use evalforge_llm::{Embedder, GeminiBackend, GeminiEmbeddings, LlmBackend};
use evalforge_redaction::PiiRedactor;
use evalforge_store::{Collections, DocumentStore, FirestoreStore};

/// The deployable services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ServiceName {
    Ingestion,
    Extraction,
    Dedup,
    Eval,
    Guardrail,
    Runbook,
    Approval,
}

/// Shared wiring for one process.
pub struct AppContext {
    pub settings: Settings,
    pub store: Arc<dyn DocumentStore>,
    pub collections: Collections,
    pub redactor: PiiRedactor,
}

impl AppContext {
    /// Build the production context: Firestore-backed, settings from the
    /// process environment. Fails fast on missing required configuration.
    pub fn from_env() -> Result<Self> {
        let env = Env::process();
        let settings = Settings::load(&env).context("loading configuration")?;
        let access_token = std::env::var("GOOGLE_ACCESS_TOKEN")
            .context("GOOGLE_ACCESS_TOKEN is required for the document store")?;
        let store = FirestoreStore::from_config(&settings.firestore, access_token)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        let collections = Collections::from_config(&settings.firestore);
        let redactor = PiiRedactor::new(settings.pii.salt.clone());
        Ok(Self {
            settings,
            store: Arc::new(store),
            collections,
            redactor,
        })
    }

    fn llm(&self) -> Result<Arc<dyn LlmBackend>> {
        let backend =
            GeminiBackend::from_config(&self.settings.gemini).map_err(|e| anyhow::anyhow!("{e}"))?;
        Ok(Arc::new(backend))
    }

    fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        let embedder = GeminiEmbeddings::from_config(
            &self.settings.embedding,
            self.settings.gemini.api_key.clone(),
        )
        .map_err(|e| anyhow::anyhow!("{e}"))?;
        Ok(Arc::new(embedder))
    }

    /// Build the axum router for one service.
    pub fn build_router(&self, service: ServiceName) -> Result<Router> {
        match service {
            ServiceName::Ingestion => {
                let datadog = DatadogConfig::load(&Env::process())
                    .map_err(|e| anyhow::anyhow!("{e}"))?;
                let provider = Arc::new(DatadogSpansClient::from_config(&datadog));
                let service = Arc::new(IngestionService::new(
                    provider,
                    self.store.clone(),
                    self.collections.clone(),
                    self.redactor.clone(),
                    datadog.trace_lookback_hours,
                    datadog.quality_threshold,
                ));
                Ok(evalforge_ingestion::router(service))
            }
            ServiceName::Extraction => {
                let service = Arc::new(ExtractionService::new(
                    self.llm()?,
                    self.store.clone(),
                    self.collections.clone(),
                    self.redactor.clone(),
                    self.settings.extraction.clone(),
                    self.settings.gemini.clone(),
                ));
                Ok(evalforge_extraction::router(service))
            }
            ServiceName::Dedup => {
                let service = Arc::new(DedupService::new(
                    self.embedder()?,
                    self.store.clone(),
                    self.collections.clone(),
                    self.settings.dedup_batch_size,
                    self.settings.similarity_threshold,
                ));
                Ok(evalforge_dedup::router(service))
            }
            ServiceName::Eval => {
                let service = Arc::new(GeneratorService::new(
                    Arc::new(EvalTestGenerator),
                    self.llm()?,
                    self.store.clone(),
                    self.collections.clone(),
                    self.redactor.clone(),
                    self.settings.eval_generator.clone(),
                    self.settings.gemini.clone(),
                ));
                Ok(evalforge_generators::router(service))
            }
            ServiceName::Guardrail => {
                let service = Arc::new(GeneratorService::new(
                    Arc::new(GuardrailGenerator),
                    self.llm()?,
                    self.store.clone(),
                    self.collections.clone(),
                    self.redactor.clone(),
                    self.settings.guardrail_generator.clone(),
                    self.settings.gemini.clone(),
                ));
                Ok(evalforge_generators::router(service))
            }
            ServiceName::Runbook => {
                let service = Arc::new(GeneratorService::new(
                    Arc::new(RunbookGenerator),
                    self.llm()?,
                    self.store.clone(),
                    self.collections.clone(),
                    self.redactor.clone(),
                    self.settings.runbook_generator.clone(),
                    self.settings.gemini.clone(),
                ));
                Ok(evalforge_generators::router(service))
            }
            ServiceName::Approval => {
                let notifier = Arc::new(WebhookNotifier::new(
                    self.settings.approval.slack_webhook_url.clone(),
                ));
                let service = Arc::new(ApprovalService::new(
                    self.store.clone(),
                    self.collections.clone(),
                    notifier,
                    self.settings.approval.api_key.clone(),
                ));
                Ok(evalforge_approval::router(service))
            }
        }
    }
}

/// Collect suggestion-state gauges and publish them to the provider.
/// Invoked by the scheduler or a cron job; one shot per call.
pub async fn publish_dashboard_metrics() -> Result<()> {
    let context = AppContext::from_env()?;
    let aggregator =
        DashboardAggregator::new(context.store.clone(), context.collections.clone());
    let datadog =
        DatadogConfig::load(&Env::process()).map_err(|e| anyhow::anyhow!("{e}"))?;
    let publisher = DatadogMetricsPublisher::from_config(&datadog);
    let points = aggregator
        .collect()
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    publisher
        .publish(&points)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(())
}

/// Serve one stage on the given port.
pub async fn serve(service: ServiceName, port: u16) -> Result<()> {
    let context = AppContext::from_env()?;
    let router = context.build_router(service)?;
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(service = ?service, addr = %addr, "service listening");
    axum::serve(listener, router).await.context("server error")?;
    bail!("server exited unexpectedly")
}
