use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    SpreadsheetError(#[from] calamine::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field} ('{value}'): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Column Error: Please ensure {} exist in the file (available: {})", quoted(.missing), .available.join(", "))]
    ColumnError {
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error("Failed to load {path}: {reason}")]
    LoadError { path: String, reason: String },

    #[error("Unsupported input format: {path}")]
    UnsupportedFormat { path: String },

    #[error("Inference API returned {status}: {message}")]
    InferenceStatus { status: u16, message: String },

    #[error("Malformed model response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Analysis stopped by user")]
    Cancelled,
}

fn quoted(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("'{}'", n))
        .collect::<Vec<_>>()
        .join(" and ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Inference,
    Storage,
    Cancellation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// 命令列的退出碼
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Low | Self::High => 1,
            Self::Medium => 2,
            Self::Critical => 3,
        }
    }
}

impl AnalysisError {
    pub fn load(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::LoadError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => ErrorCategory::Configuration,
            Self::ColumnError { .. }
            | Self::LoadError { .. }
            | Self::UnsupportedFormat { .. }
            | Self::CsvError(_)
            | Self::SpreadsheetError(_) => ErrorCategory::Input,
            Self::ApiError(_)
            | Self::InferenceStatus { .. }
            | Self::MalformedResponse { .. }
            | Self::SerializationError(_) => ErrorCategory::Inference,
            Self::Io(_) => ErrorCategory::Storage,
            Self::Cancelled => ErrorCategory::Cancellation,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Cancellation => ErrorSeverity::Low,
            // 單列推論失敗不會中止整個流程
            ErrorCategory::Inference => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Input => ErrorSeverity::High,
            ErrorCategory::Storage => ErrorSeverity::Critical,
        }
    }

    /// 單列錯誤：記錄在輸出中，流程繼續
    pub fn is_row_level(&self) -> bool {
        self.category() == ErrorCategory::Inference
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::ConfigError { message } => format!("Configuration problem: {}", message),
            Self::MissingConfigError { field } => {
                format!("Required setting '{}' was not provided", field)
            }
            Self::InvalidConfigValueError { field, reason, .. } => {
                format!("Setting '{}' is invalid: {}", field, reason)
            }
            Self::ColumnError { .. } | Self::Cancelled => self.to_string(),
            Self::LoadError { path, reason } => {
                format!("Could not read '{}': {}", path, reason)
            }
            Self::UnsupportedFormat { path } => {
                format!("'{}' is not a .csv or spreadsheet file", path)
            }
            Self::Io(e) => format!("A critical error occurred: {}", e),
            _ => format!("A critical error occurred: {}", self),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Check the API key and settings (flags, config file, GEMINI_API_KEY)"
            }
            ErrorCategory::Input => {
                "Check the input file and use `persona-scope headers <file>` to list its columns"
            }
            ErrorCategory::Inference => "Check network access and the model endpoint, then rerun",
            ErrorCategory::Storage => "Check that the input directory is writable",
            ErrorCategory::Cancellation => "Rerun the analysis when ready",
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
