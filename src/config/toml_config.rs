use crate::domain::model::{AnalysisSettings, Credential};
use crate::utils::error::{AnalysisError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_range, validate_url, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 每列間隔上限 (10 分鐘)
pub const MAX_ROW_DELAY_MS: u64 = 600_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub model: ModelConfig,
    pub pipeline: PipelineSection,
    pub columns: ColumnsConfig,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: Option<String>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: Option<u64>,
}

// api_key 不可出現在日誌中
impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub row_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnsConfig {
    pub fullname: Option<String>,
    pub username: Option<String>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(AnalysisError::Io)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| AnalysisError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${GEMINI_API_KEY})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| AnalysisError::ConfigValidationError {
            field: "env_substitution".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures<'_>| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        if let Some(endpoint) = &self.model.endpoint {
            validate_url("model.endpoint", endpoint)?;
        }
        if let Some(name) = &self.model.name {
            validate_non_empty_string("model.name", name)?;
        }
        if let Some(timeout) = self.model.timeout_seconds {
            validate_range("model.timeout_seconds", timeout, 1, 3600)?;
        }
        if let Some(delay) = self.pipeline.row_delay_ms {
            validate_range("pipeline.row_delay_ms", delay, 0, MAX_ROW_DELAY_MS)?;
        }
        Ok(())
    }

    /// API 金鑰；`${VAR}` 未被替換時視為未設定
    pub fn credential(&self) -> Option<Credential> {
        self.model
            .api_key
            .as_deref()
            .filter(|key| !(key.starts_with("${") && key.ends_with('}')))
            .map(Credential::new)
    }

    /// 將檔案中的設定套用到預設值上
    pub fn settings(&self) -> AnalysisSettings {
        let mut settings = AnalysisSettings::default();
        if let Some(name) = &self.model.name {
            settings.model = name.clone();
        }
        if let Some(endpoint) = &self.model.endpoint {
            settings.endpoint = endpoint.clone();
        }
        settings.timeout = self.model.timeout_seconds.map(Duration::from_secs);
        if let Some(delay) = self.pipeline.row_delay_ms {
            settings.row_delay = Duration::from_millis(delay);
        }
        settings
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{DEFAULT_MODEL, DEFAULT_ROW_DELAY};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[model]
name = "gemini-2.5-flash"
endpoint = "https://example.com/v1beta"
api_key = "abc123"
timeout_seconds = 60

[pipeline]
row_delay_ms = 1500

[columns]
fullname = "Name"
username = "Handle"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_ok());

        let settings = config.settings();
        assert_eq!(settings.model, "gemini-2.5-flash");
        assert_eq!(settings.endpoint, "https://example.com/v1beta");
        assert_eq!(settings.timeout, Some(Duration::from_secs(60)));
        assert_eq!(settings.row_delay, Duration::from_millis(1500));
        assert_eq!(config.columns.username.as_deref(), Some("Handle"));
        assert_eq!(config.credential().unwrap().expose(), "abc123");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        let settings = config.settings();
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.row_delay, DEFAULT_ROW_DELAY);
        assert_eq!(settings.timeout, None);
        assert!(config.credential().is_none());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("PERSONA_SCOPE_TEST_KEY", "from-env");

        let toml_content = r#"
[model]
api_key = "${PERSONA_SCOPE_TEST_KEY}"
"#;
        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.credential().unwrap().expose(), "from-env");

        std::env::remove_var("PERSONA_SCOPE_TEST_KEY");
    }

    #[test]
    fn test_unset_env_var_means_no_credential() {
        let toml_content = r#"
[model]
api_key = "${PERSONA_SCOPE_SURELY_UNSET_VAR}"
"#;
        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert!(config.credential().is_none());
    }

    #[test]
    fn test_config_validation() {
        let bad_endpoint = TomlConfig::from_toml_str("[model]\nendpoint = \"invalid-url\"\n").unwrap();
        assert!(bad_endpoint.validate().is_err());

        let bad_delay = TomlConfig::from_toml_str("[pipeline]\nrow_delay_ms = 999999999\n").unwrap();
        assert!(bad_delay.validate().is_err());
    }

    #[test]
    fn test_debug_hides_api_key() {
        let config = TomlConfig::from_toml_str("[model]\napi_key = \"top-secret\"\n").unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("top-secret"));
    }

    #[test]
    fn test_invalid_toml() {
        let err = TomlConfig::from_toml_str("[model\nname = 1").unwrap_err();
        assert!(matches!(err, AnalysisError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[columns]\nfullname = \"Full Name\"\n")
            .unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.columns.fullname.as_deref(), Some("Full Name"));
    }
}
