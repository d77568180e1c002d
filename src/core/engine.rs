use crate::app::pipelines::analysis_pipeline::AnalysisPipeline;
use crate::core::events::{
    CancellationToken, EventSender, PipelineEvent, ProgressEvent, RunOutcome,
};
use crate::core::{InferenceConnector, Pipeline, Storage};
use crate::domain::model::{AnalysisSettings, PipelineConfig, RunSummary};
use crate::utils::error::{AnalysisError, ErrorSeverity, Result};
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct AnalysisEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> AnalysisEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        tracing::info!("🚀 Starting analysis");

        let dataset = self.pipeline.extract().await?;
        tracing::debug!("Extracted {} rows", dataset.len());

        let results = self.pipeline.transform(&dataset).await?;
        tracing::debug!("Analyzed {} rows", results.len());

        let summary = self.pipeline.load(dataset, results).await?;
        tracing::info!("📁 Output saved to: {}", summary.output_path.display());

        Ok(summary)
    }
}

/// Runs one analysis to completion and reports exactly one terminal event.
///
/// The credential is checked by `connector` before the input is touched, so
/// a rejected key fails the run without reading a single row.
pub async fn run_analysis<K, S>(
    connector: &K,
    storage: S,
    config: PipelineConfig,
    settings: &AnalysisSettings,
    events: EventSender,
    cancel: CancellationToken,
) -> RunOutcome
where
    K: InferenceConnector,
    S: Storage,
{
    let outcome = match connector.connect(&config.credential) {
        Ok(client) => {
            events.progress(ProgressEvent::ClientConfigured {
                model: settings.model.clone(),
            });
            let pipeline = AnalysisPipeline::new(storage, client, config)
                .with_row_delay(settings.row_delay)
                .with_events(events.clone())
                .with_cancellation(cancel);
            outcome_of(AnalysisEngine::new(pipeline).run().await)
        }
        Err(e) => outcome_of(Err(e)),
    };

    events.send(outcome.clone().into_event());
    outcome
}

fn outcome_of(result: Result<RunSummary>) -> RunOutcome {
    match result {
        Ok(summary) => {
            tracing::info!(
                "✅ Analysis complete: {} rows, {} failed",
                summary.total_rows,
                summary.failed_rows
            );
            RunOutcome::Completed(summary)
        }
        Err(AnalysisError::Cancelled) => {
            tracing::info!("🛑 Analysis cancelled, no output written");
            RunOutcome::Cancelled
        }
        Err(e) => {
            tracing::error!(
                "❌ Analysis failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            RunOutcome::Failed {
                message: e.user_friendly_message(),
                severity: e.severity(),
            }
        }
    }
}

/// Handle to a run executing on its own tokio task.
pub struct AnalysisHandle {
    pub events: mpsc::UnboundedReceiver<PipelineEvent>,
    cancel: CancellationToken,
    task: JoinHandle<RunOutcome>,
}

impl AnalysisHandle {
    /// 在背景任務啟動分析
    pub fn spawn<K, S>(
        connector: K,
        storage: S,
        config: PipelineConfig,
        settings: AnalysisSettings,
    ) -> Self
    where
        K: InferenceConnector + 'static,
        S: Storage + 'static,
    {
        let (events, rx) = EventSender::channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            run_analysis(&connector, storage, config, &settings, events, token).await
        });

        Self {
            events: rx,
            cancel,
            task,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn next_event(&mut self) -> Option<PipelineEvent> {
        self.events.recv().await
    }

    /// Drains the event stream until the run ends. When `stop` resolves the
    /// run is cancelled once and draining continues. Progress is already
    /// logged by the sender, so events are not rendered here.
    pub async fn drive<F>(mut self, stop: F) -> RunOutcome
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(stop);
        let mut stopping = false;

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    if event.is_none() {
                        break;
                    }
                }
                _ = &mut stop, if !stopping => {
                    self.cancel.cancel();
                    stopping = true;
                }
            }
        }

        self.wait().await
    }

    pub async fn wait(self) -> RunOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => RunOutcome::Failed {
                message: format!("Analysis task aborted: {}", e),
                severity: ErrorSeverity::Critical,
            },
        }
    }
}
