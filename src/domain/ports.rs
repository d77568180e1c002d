use crate::domain::model::{Credential, Dataset, FlattenedResult, RunSummary};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Text-completion collaborator: one prompt in, raw reply text out.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// 以金鑰建立推論客戶端；金鑰被拒絕時回傳 `AnalysisError::Config`
pub trait InferenceConnector: Send + Sync {
    type Client: InferenceClient + 'static;

    fn connect(&self, credential: &Credential) -> Result<Self::Client>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Dataset>;
    async fn transform(&self, data: &Dataset) -> Result<Vec<FlattenedResult>>;
    async fn load(&self, data: Dataset, results: Vec<FlattenedResult>) -> Result<RunSummary>;
}
