pub mod cli;
pub mod toml_config;

use crate::core::loader::{self, SUPPORTED_EXTENSIONS};
use crate::domain::model::{AnalysisSettings, Credential, PipelineConfig};
use crate::utils::error::{AnalysisError, Result};
use crate::utils::validation::{
    validate_file_extension, validate_non_empty_string, validate_path, validate_range,
    validate_required_field, validate_url, Validate,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use toml_config::{TomlConfig, MAX_ROW_DELAY_MS};

/// 未提供 `--api-key` 與設定檔金鑰時讀取的環境變數
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Parser)]
#[command(name = "persona-scope")]
#[command(about = "Infer gender, origin, language and persona for each user in a spreadsheet")]
pub struct CliConfig {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Analyze every row of a table and write `<name>_output.csv` next to it
    Analyze(AnalyzeArgs),
    /// Print the column names of a table
    Headers {
        /// Path to a .csv or spreadsheet file
        input: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
pub struct AnalyzeArgs {
    /// Path to a .csv or spreadsheet file
    #[arg(short, long)]
    pub input: PathBuf,

    #[arg(long, help = "Column holding the full name")]
    pub fullname_column: Option<String>,

    #[arg(long, help = "Column holding the username")]
    pub username_column: Option<String>,

    #[arg(long, value_parser = parse_credential, help = "Gemini API key (falls back to the config file, then GEMINI_API_KEY)")]
    pub api_key: Option<Credential>,

    #[arg(short, long, help = "TOML config file")]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub endpoint: Option<String>,

    #[arg(long, help = "Pause after each row, in milliseconds")]
    pub delay_ms: Option<u64>,

    #[arg(long, help = "Per-request timeout in seconds (default: none)")]
    pub timeout_secs: Option<u64>,
}

fn parse_credential(value: &str) -> std::result::Result<Credential, String> {
    Ok(Credential::new(value))
}

impl AnalyzeArgs {
    /// 讀取 `--config` 指定的設定檔
    pub fn load_toml(&self) -> Result<Option<TomlConfig>> {
        match &self.config {
            Some(path) => {
                let config = TomlConfig::from_file(path)?;
                config.validate()?;
                tracing::info!("📝 Loaded config file: {}", path.display());
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    /// 依優先序合併：命令列 > 設定檔 > 環境變數 / 表頭建議 > 預設值
    pub fn resolve(&self, file: Option<&TomlConfig>) -> Result<(PipelineConfig, AnalysisSettings)> {
        let env_key = std::env::var(API_KEY_ENV).ok().map(Credential::new);
        let credential = resolve_credential(self.api_key.clone(), file, env_key)?;

        let (fullname_column, username_column) = self.resolve_columns(file)?;

        let mut settings = file.map(TomlConfig::settings).unwrap_or_default();
        if let Some(model) = &self.model {
            settings.model = model.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            settings.endpoint = endpoint.clone();
        }
        if let Some(delay) = self.delay_ms {
            settings.row_delay = Duration::from_millis(delay);
        }
        if let Some(timeout) = self.timeout_secs {
            settings.timeout = Some(Duration::from_secs(timeout));
        }

        let config = PipelineConfig {
            credential,
            input_path: self.input.clone(),
            fullname_column,
            username_column,
        };
        Ok((config, settings))
    }

    fn resolve_columns(&self, file: Option<&TomlConfig>) -> Result<(String, String)> {
        let file_columns = file.map(|f| &f.columns);
        let mut fullname = self
            .fullname_column
            .clone()
            .or_else(|| file_columns.and_then(|c| c.fullname.clone()));
        let mut username = self
            .username_column
            .clone()
            .or_else(|| file_columns.and_then(|c| c.username.clone()));

        if fullname.is_none() || username.is_none() {
            let headers = loader::peek_headers(&self.input)?;
            let (suggested_fullname, suggested_username) = loader::suggest_columns(&headers);
            fullname = fullname.or(suggested_fullname);
            username = username.or(suggested_username);
            tracing::debug!("Column defaults picked from headers: {:?}", headers);
        }

        let fullname = validate_required_field("fullname_column", &fullname)?;
        let username = validate_required_field("username_column", &username)?;
        Ok((fullname.clone(), username.clone()))
    }
}

fn resolve_credential(
    flag: Option<Credential>,
    file: Option<&TomlConfig>,
    env: Option<Credential>,
) -> Result<Credential> {
    flag.or_else(|| file.and_then(TomlConfig::credential))
        .or(env)
        .ok_or_else(|| AnalysisError::MissingConfigError {
            field: "api_key".to_string(),
        })
}

impl Validate for AnalyzeArgs {
    fn validate(&self) -> Result<()> {
        validate_input_path(&self.input)?;

        if let Some(column) = &self.fullname_column {
            validate_non_empty_string("fullname_column", column)?;
        }
        if let Some(column) = &self.username_column {
            validate_non_empty_string("username_column", column)?;
        }
        if let Some(model) = &self.model {
            validate_non_empty_string("model", model)?;
        }
        if let Some(endpoint) = &self.endpoint {
            validate_url("endpoint", endpoint)?;
        }
        if let Some(delay) = self.delay_ms {
            validate_range("delay_ms", delay, 0, MAX_ROW_DELAY_MS)?;
        }
        if let Some(timeout) = self.timeout_secs {
            validate_range("timeout_secs", timeout, 1, 3600)?;
        }
        Ok(())
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        match &self.command {
            Command::Analyze(args) => args.validate(),
            Command::Headers { input } => validate_input_path(input),
        }
    }
}

fn validate_input_path(input: &Path) -> Result<()> {
    validate_path("input", &input.to_string_lossy())?;
    validate_file_extension("input", input, &SUPPORTED_EXTENSIONS)
}
