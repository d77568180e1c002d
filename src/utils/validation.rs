use crate::utils::error::{AnalysisError, Result};
use std::collections::HashSet;
use std::path::Path;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(AnalysisError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(AnalysisError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(AnalysisError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(AnalysisError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(AnalysisError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_file_extension(
    field_name: &str,
    file: &Path,
    allowed_extensions: &[&str],
) -> Result<()> {
    let allowed_set: HashSet<&str> = allowed_extensions.iter().copied().collect();
    let display = file.display().to_string();

    match file.extension().and_then(|ext| ext.to_str()) {
        Some(extension) if allowed_set.contains(extension.to_ascii_lowercase().as_str()) => Ok(()),
        Some(extension) => Err(AnalysisError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: display,
            reason: format!(
                "Unsupported file extension: {}. Allowed extensions: {}",
                extension,
                allowed_extensions.join(", ")
            ),
        }),
        None => Err(AnalysisError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: display,
            reason: "File has no extension or invalid filename".to_string(),
        }),
    }
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| AnalysisError::MissingConfigError {
            field: field_name.to_string(),
        })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AnalysisError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(AnalysisError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("model.endpoint", "https://example.com").is_ok());
        assert!(validate_url("model.endpoint", "http://localhost:8080/v1").is_ok());
        assert!(validate_url("model.endpoint", "").is_err());
        assert!(validate_url("model.endpoint", "invalid-url").is_err());
        assert!(validate_url("model.endpoint", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_file_extension() {
        let allowed = ["csv", "xlsx"];
        assert!(validate_file_extension("input", Path::new("users.csv"), &allowed).is_ok());
        assert!(validate_file_extension("input", Path::new("USERS.XLSX"), &allowed).is_ok());
        assert!(validate_file_extension("input", Path::new("users.txt"), &allowed).is_err());
        assert!(validate_file_extension("input", Path::new("users"), &allowed).is_err());
    }

    #[test]
    fn test_validate_required_and_non_empty() {
        let present = Some("x".to_string());
        let absent: Option<String> = None;
        assert!(validate_required_field("columns.fullname", &present).is_ok());
        assert!(matches!(
            validate_required_field("columns.fullname", &absent),
            Err(AnalysisError::MissingConfigError { .. })
        ));
        assert!(validate_non_empty_string("columns.username", "   ").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("pipeline.row_delay_ms", 3000u64, 0, 600_000).is_ok());
        assert!(validate_range("pipeline.row_delay_ms", 700_000u64, 0, 600_000).is_err());
    }
}
