pub use crate::app::pipelines::analysis_pipeline::AnalysisPipeline;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::{CancellationToken, EventSender, PipelineEvent, ProgressEvent};
    use crate::core::{InferenceClient, Pipeline, Storage};
    use crate::domain::model::{Credential, FlattenedResult, PipelineConfig};
    use crate::utils::error::{AnalysisError, Result};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn with_file(path: &str, content: &str) -> Self {
            let mut files = HashMap::new();
            files.insert(path.to_string(), content.as_bytes().to_vec());
            Self {
                files: Arc::new(Mutex::new(files)),
            }
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                AnalysisError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    /// 依提示內容中的使用者名稱決定回應
    #[derive(Clone, Default)]
    struct MockClient {
        prompts: Arc<Mutex<Vec<String>>>,
        failing: Vec<String>,
        garbage: Vec<String>,
    }

    impl MockClient {
        fn failing_for(mut self, username: &str) -> Self {
            self.failing.push(username.to_string());
            self
        }

        fn garbage_for(mut self, username: &str) -> Self {
            self.garbage.push(username.to_string());
            self
        }

        async fn calls(&self) -> usize {
            self.prompts.lock().await.len()
        }
    }

    #[async_trait::async_trait]
    impl InferenceClient for MockClient {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().await.push(prompt.to_string());

            let mentions = |names: &[String]| {
                names
                    .iter()
                    .any(|u| prompt.contains(&format!("Username: \"{}\"", u)))
            };
            if mentions(&self.failing) {
                return Err(AnalysisError::InferenceStatus {
                    status: 503,
                    message: "model overloaded".to_string(),
                });
            }
            if mentions(&self.garbage) {
                return Ok("I'm not able to guess that.".to_string());
            }

            Ok(r#"```json
{
  "predicted_gender": {"value": "Unisex/Unknown", "confidence": 0.4},
  "predicted_origin": {"value": "Brazil", "confidence": 0.7},
  "deduced_language": {"value": "Portuguese", "confidence": 0.65},
  "user_persona": {"value": "Football fan", "confidence": 0.3}
}
```"#
                .to_string())
        }
    }

    const INPUT: &str = "data/users.csv";
    const OUTPUT: &str = "data/users_output.csv";
    const CSV: &str = "Full Name,Username,Followers\n\
                       Joao Silva,joao10,1200\n\
                       Maria Souza,mari_s,87\n\
                       Pedro Costa,pedrinho,5\n";

    fn config(fullname: &str, username: &str) -> PipelineConfig {
        PipelineConfig {
            credential: Credential::new("test-key"),
            input_path: PathBuf::from(INPUT),
            fullname_column: fullname.to_string(),
            username_column: username.to_string(),
        }
    }

    fn pipeline(
        storage: MockStorage,
        client: MockClient,
        config: PipelineConfig,
    ) -> AnalysisPipeline<MockStorage, MockClient> {
        AnalysisPipeline::new(storage, client, config).with_row_delay(Duration::ZERO)
    }

    async fn output_rows(storage: &MockStorage) -> Vec<HashMap<String, String>> {
        let bytes = storage.get_file(OUTPUT).await.expect("output written");
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let headers = reader.headers().unwrap().clone();
        reader
            .records()
            .map(|r| {
                let record = r.unwrap();
                headers
                    .iter()
                    .zip(record.iter())
                    .map(|(h, v)| (h.to_string(), v.to_string()))
                    .collect()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_extract_reads_dataset() {
        let storage = MockStorage::with_file(INPUT, CSV);
        let pipeline = pipeline(storage, MockClient::default(), config("Full Name", "Username"));

        let dataset = pipeline.extract().await.unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.headers, vec!["Full Name", "Username", "Followers"]);
    }

    #[tokio::test]
    async fn test_extract_missing_column_makes_no_calls() {
        let storage = MockStorage::with_file(INPUT, CSV);
        let client = MockClient::default();
        let pipeline = pipeline(storage, client.clone(), config("Full Name", "handle"));

        let err = pipeline.extract().await.unwrap_err();

        match err {
            AnalysisError::ColumnError { missing, available } => {
                assert_eq!(missing, vec!["handle"]);
                assert_eq!(available.len(), 3);
            }
            other => panic!("expected column error, got {:?}", other),
        }
        assert_eq!(client.calls().await, 0);
    }

    #[tokio::test]
    async fn test_extract_missing_file_is_load_error() {
        let storage = MockStorage::with_file("other.csv", CSV);
        let pipeline = pipeline(storage, MockClient::default(), config("Full Name", "Username"));

        let err = pipeline.extract().await.unwrap_err();
        assert!(matches!(err, AnalysisError::LoadError { .. }));
    }

    #[tokio::test]
    async fn test_row_failure_does_not_abort_run() {
        let storage = MockStorage::with_file(INPUT, CSV);
        let client = MockClient::default().failing_for("mari_s");
        let pipeline = pipeline(storage.clone(), client.clone(), config("Full Name", "Username"));

        let data = pipeline.extract().await.unwrap();
        let results = pipeline.transform(&data).await.unwrap();
        let summary = pipeline.load(data, results).await.unwrap();

        assert_eq!(client.calls().await, 3);
        assert_eq!(summary.total_rows, 3);
        assert_eq!(summary.failed_rows, 1);
        assert_eq!(summary.output_path, PathBuf::from(OUTPUT));

        let rows = output_rows(&storage).await;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["predicted_origin_value"], "Brazil");
        assert_eq!(rows[0]["error"], "");
        assert!(rows[1]["error"].contains("model overloaded"));
        assert_eq!(rows[1]["predicted_origin_value"], "");
        assert_eq!(rows[2]["user_persona_confidence"], "0.3");
        assert_eq!(rows[2]["Followers"], "5");
    }

    #[tokio::test]
    async fn test_unparseable_response_is_recorded_inline() {
        let storage = MockStorage::with_file(INPUT, CSV);
        let client = MockClient::default().garbage_for("joao10");
        let pipeline = pipeline(storage, client, config("Full Name", "Username"));

        let data = pipeline.extract().await.unwrap();
        let results = pipeline.transform(&data).await.unwrap();

        assert!(results[0].is_failed());
        assert!(matches!(results[1], FlattenedResult::Analyzed(_)));
        assert!(matches!(results[2], FlattenedResult::Analyzed(_)));
    }

    #[tokio::test]
    async fn test_empty_cells_become_empty_strings_in_prompt() {
        let storage = MockStorage::with_file(INPUT, "Full Name,Username\n,ghost\nSolo,\n");
        let client = MockClient::default();
        let pipeline = pipeline(storage, client.clone(), config("Full Name", "Username"));

        let data = pipeline.extract().await.unwrap();
        pipeline.transform(&data).await.unwrap();

        let prompts = client.prompts.lock().await;
        assert!(prompts[0].contains("Full Name: \"\""));
        assert!(prompts[0].contains("Username: \"ghost\""));
        assert!(prompts[1].contains("Username: \"\""));
        assert!(prompts.iter().all(|p| !p.contains("null")));
    }

    #[tokio::test]
    async fn test_transform_stops_when_cancelled() {
        let storage = MockStorage::with_file(INPUT, CSV);
        let client = MockClient::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (events, mut rx) = EventSender::channel();
        let pipeline = pipeline(storage.clone(), client.clone(), config("Full Name", "Username"))
            .with_cancellation(cancel)
            .with_events(events);

        let data = pipeline.extract().await.unwrap();
        let err = pipeline.transform(&data).await.unwrap_err();

        assert!(matches!(err, AnalysisError::Cancelled));
        assert_eq!(client.calls().await, 0);
        assert!(storage.get_file(OUTPUT).await.is_none());

        drop(pipeline);
        let mut last = None;
        while let Some(event) = rx.recv().await {
            last = Some(event);
        }
        assert_eq!(last, Some(PipelineEvent::Progress(ProgressEvent::Stopped)));
    }

    #[tokio::test]
    async fn test_progress_events_in_row_order() {
        let storage = MockStorage::with_file(INPUT, CSV);
        let (events, mut rx) = EventSender::channel();
        let client = MockClient::default().failing_for("pedrinho");
        let pipeline =
            pipeline(storage, client, config("Full Name", "Username")).with_events(events);

        let data = pipeline.extract().await.unwrap();
        pipeline.transform(&data).await.unwrap();
        drop(pipeline);

        let mut started = Vec::new();
        let mut warnings = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                PipelineEvent::Progress(ProgressEvent::RowStarted { index, .. }) => {
                    started.push(index)
                }
                PipelineEvent::Progress(ProgressEvent::RowFailed { index, .. }) => {
                    warnings.push(index)
                }
                _ => {}
            }
        }
        assert_eq!(started, vec![0, 1, 2]);
        assert_eq!(warnings, vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_row_delay_applies_after_every_row() {
        let storage = MockStorage::with_file(INPUT, CSV);
        let client = MockClient::default().failing_for("joao10");
        let pipeline = AnalysisPipeline::new(storage, client, config("Full Name", "Username"))
            .with_row_delay(Duration::from_secs(3));

        let data = pipeline.extract().await.unwrap();
        let started = tokio::time::Instant::now();
        pipeline.transform(&data).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(9));
    }
}
