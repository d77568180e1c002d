use crate::core::events::{CancellationToken, EventSender, ProgressEvent};
use crate::core::loader::{self, InputFormat};
use crate::core::response::{build_prompt, parse_response};
use crate::core::{Dataset, FlattenedResult, InferenceClient, Pipeline, Storage};
use crate::domain::model::{OutputTable, PipelineConfig, RunSummary};
use crate::utils::error::{AnalysisError, Result};
use std::time::Duration;

/// Row analysis pipeline: load the table, ask the model about each row in
/// order, then write the augmented table next to the input.
pub struct AnalysisPipeline<S: Storage, C: InferenceClient> {
    pub(crate) storage: S,
    pub(crate) client: C,
    pub(crate) config: PipelineConfig,
    pub(crate) row_delay: Duration,
    pub(crate) events: EventSender,
    pub(crate) cancel: CancellationToken,
}

impl<S: Storage, C: InferenceClient> AnalysisPipeline<S, C> {
    pub fn new(storage: S, client: C, config: PipelineConfig) -> Self {
        Self {
            storage,
            client,
            config,
            row_delay: crate::domain::model::DEFAULT_ROW_DELAY,
            events: EventSender::discard(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_row_delay(mut self, row_delay: Duration) -> Self {
        self.row_delay = row_delay;
        self
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 單列分析；任何請求或解析錯誤都轉成該列的錯誤欄位
    async fn analyze_row(&self, index: usize, full_name: &str, username: &str) -> FlattenedResult {
        let prompt = build_prompt(full_name, username);

        let outcome = match self.client.generate(&prompt).await {
            Ok(raw) => {
                tracing::debug!("Row {} raw response: {} bytes", index + 1, raw.len());
                parse_response(&raw)
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => FlattenedResult::Analyzed(result),
            Err(e) => {
                self.events.progress(ProgressEvent::RowFailed {
                    index,
                    username: username.to_string(),
                    error: e.to_string(),
                });
                FlattenedResult::failed(e.to_string())
            }
        }
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: InferenceClient> Pipeline for AnalysisPipeline<S, C> {
    async fn extract(&self) -> Result<Dataset> {
        let path = &self.config.input_path;
        let origin = path.display().to_string();
        let format = InputFormat::from_path(path)?;

        tracing::debug!("Reading input file: {}", origin);
        let bytes = self
            .storage
            .read_file(&origin)
            .await
            .map_err(|e| AnalysisError::load(origin.clone(), e))?;
        let dataset = loader::load_bytes(&bytes, format, &origin)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(origin);
        self.events
            .progress(ProgressEvent::DatasetLoaded { file_name });

        // 欄位檢查必須在任何推論請求之前
        let missing = dataset.missing_columns(&[
            self.config.fullname_column.as_str(),
            self.config.username_column.as_str(),
        ]);
        if !missing.is_empty() {
            return Err(AnalysisError::ColumnError {
                missing: missing.into_iter().map(str::to_string).collect(),
                available: dataset.headers.clone(),
            });
        }

        self.events.progress(ProgressEvent::RowsFound {
            total: dataset.len(),
        });
        Ok(dataset)
    }

    async fn transform(&self, data: &Dataset) -> Result<Vec<FlattenedResult>> {
        let total = data.len();
        let mut results = Vec::with_capacity(total);

        for (index, row) in data.rows.iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.events.progress(ProgressEvent::Stopped);
                return Err(AnalysisError::Cancelled);
            }

            let full_name = data.value(row, &self.config.fullname_column);
            let username = data.value(row, &self.config.username_column);

            self.events.progress(ProgressEvent::RowStarted {
                index,
                total,
                username: username.to_string(),
            });

            let result = self.analyze_row(index, full_name, username).await;
            results.push(result);

            // 固定間隔，失敗列也一樣
            if !self.row_delay.is_zero() {
                tokio::time::sleep(self.row_delay).await;
            }
        }

        Ok(results)
    }

    async fn load(&self, data: Dataset, results: Vec<FlattenedResult>) -> Result<RunSummary> {
        let output_path = self.config.output_path();
        let failed_rows = results.iter().filter(|r| r.is_failed()).count();

        let table = OutputTable::assemble(&data, &results);
        let bytes = table.to_csv()?;

        tracing::debug!(
            "Writing {} rows ({} bytes) to {}",
            table.rows.len(),
            bytes.len(),
            output_path.display()
        );
        self.storage
            .write_file(&output_path.to_string_lossy(), &bytes)
            .await?;

        Ok(RunSummary {
            output_path,
            total_rows: table.rows.len(),
            failed_rows,
        })
    }
}
