pub mod adapters;
pub mod app;
#[cfg(feature = "cli")]
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{cli::LocalStorage, toml_config::TomlConfig, CliConfig};

pub use adapters::{GeminiClient, GeminiConnector};
pub use app::pipelines::analysis_pipeline::AnalysisPipeline;
pub use crate::core::engine::{run_analysis, AnalysisEngine, AnalysisHandle};
pub use crate::core::events::{CancellationToken, EventSender, PipelineEvent, ProgressEvent, RunOutcome};
pub use domain::model::{AnalysisSettings, Credential, PipelineConfig, RunSummary};
pub use utils::error::{AnalysisError, Result};
