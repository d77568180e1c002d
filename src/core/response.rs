//! Prompt construction and parsing of the model's reply into an
//! [`InferenceResult`].

use crate::domain::model::{InferenceResult, Prediction, ATTRIBUTE_NAMES};
use crate::utils::error::{AnalysisError, Result};
use serde_json::Value;

/// 組合單列的分析提示
pub fn build_prompt(full_name: &str, username: &str) -> String {
    format!(
        r#"Analyze the following social media user data:
Full Name: "{full_name}"
Username: "{username}"
As a world-class cultural and demographic analyst, infer the following metrics.
Your response MUST be a single, valid JSON object. Each prediction must include a 'value' and a 'confidence' score between 0.0 and 1.0.
JSON structure:
{{
"predicted_gender": {{"value": "Male", "Female", or "Unisex/Unknown", "confidence": float}},
"predicted_origin": {{"value": "Likely ethno-geographic origin", "confidence": float}},
"deduced_language": {{"value": "Language detected in names", "confidence": float}},
"user_persona": {{"value": "Inferred interest or category", "confidence": float}}
}}
"#
    )
}

/// Removes ```` ```json ```` / ```` ``` ```` markers anywhere in the reply and
/// trims the result.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Strict parse: all four attributes must be objects with a string `value`
/// and a numeric `confidence` in `[0.0, 1.0]`. Extra top-level keys are ignored.
pub fn parse_response(raw: &str) -> Result<InferenceResult> {
    let cleaned = strip_code_fences(raw);
    let json: Value = serde_json::from_str(&cleaned)?;

    let object = json
        .as_object()
        .ok_or_else(|| AnalysisError::malformed("expected a JSON object"))?;

    let attribute = |name: &str| -> Result<Prediction> {
        let entry = object
            .get(name)
            .ok_or_else(|| AnalysisError::malformed(format!("missing key '{}'", name)))?;
        parse_prediction(name, entry)
    };

    Ok(InferenceResult {
        predicted_gender: attribute(ATTRIBUTE_NAMES[0])?,
        predicted_origin: attribute(ATTRIBUTE_NAMES[1])?,
        deduced_language: attribute(ATTRIBUTE_NAMES[2])?,
        user_persona: attribute(ATTRIBUTE_NAMES[3])?,
    })
}

fn parse_prediction(name: &str, entry: &Value) -> Result<Prediction> {
    let fields = entry
        .as_object()
        .ok_or_else(|| AnalysisError::malformed(format!("'{}' is not an object", name)))?;

    let value = fields
        .get("value")
        .and_then(Value::as_str)
        .ok_or_else(|| AnalysisError::malformed(format!("'{}.value' must be a string", name)))?;

    let confidence = fields
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            AnalysisError::malformed(format!("'{}.confidence' must be a number", name))
        })?;

    if !(0.0..=1.0).contains(&confidence) {
        return Err(AnalysisError::malformed(format!(
            "'{}.confidence' out of range: {}",
            name, confidence
        )));
    }

    Ok(Prediction {
        value: value.to_string(),
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "predicted_gender": {"value": "Female", "confidence": 0.92},
        "predicted_origin": {"value": "Nigeria", "confidence": 0.6},
        "deduced_language": {"value": "Yoruba", "confidence": 0.55},
        "user_persona": {"value": "Tech enthusiast", "confidence": 1}
    }"#;

    #[test]
    fn test_build_prompt_embeds_names() {
        let prompt = build_prompt("Ada Lovelace", "ada_l");
        assert!(prompt.contains("Full Name: \"Ada Lovelace\""));
        assert!(prompt.contains("Username: \"ada_l\""));
        for name in ATTRIBUTE_NAMES {
            assert!(prompt.contains(name));
        }
    }

    #[test]
    fn test_build_prompt_with_empty_cells() {
        let prompt = build_prompt("", "");
        assert!(prompt.contains("Full Name: \"\""));
        assert!(prompt.contains("Username: \"\""));
        assert!(!prompt.contains("null"));
        assert!(!prompt.contains("NaN"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```  "), "{}");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }

    #[test]
    fn test_parse_valid_response() {
        let result = parse_response(VALID).unwrap();
        assert_eq!(result.predicted_gender.value, "Female");
        assert_eq!(result.predicted_gender.confidence, 0.92);
        assert_eq!(result.user_persona.confidence, 1.0);
    }

    #[test]
    fn test_parse_fenced_response() {
        let fenced = format!("```json\n{}\n```", VALID);
        assert!(parse_response(&fenced).is_ok());
    }

    #[test]
    fn test_parse_ignores_extra_keys() {
        let extra = VALID.replacen('{', "{\"notes\": \"n/a\",", 1);
        assert!(parse_response(&extra).is_ok());
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = parse_response("Sorry, I cannot help with that.").unwrap_err();
        assert!(matches!(err, AnalysisError::SerializationError(_)));
        assert!(err.is_row_level());
    }

    #[test]
    fn test_parse_missing_attribute() {
        let json = r#"{
            "predicted_gender": {"value": "Male", "confidence": 0.5},
            "predicted_origin": {"value": "Peru", "confidence": 0.5},
            "deduced_language": {"value": "Spanish", "confidence": 0.5}
        }"#;
        let err = parse_response(json).unwrap_err();
        assert!(err.to_string().contains("user_persona"));
    }

    #[test]
    fn test_parse_wrong_types() {
        let string_confidence = VALID.replace("0.92", "\"0.92\"");
        assert!(parse_response(&string_confidence).is_err());

        let null_value = VALID.replace("\"Nigeria\"", "null");
        assert!(parse_response(&null_value).is_err());

        assert!(parse_response("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_parse_out_of_range_confidence() {
        let too_high = VALID.replace("0.92", "1.5");
        let err = parse_response(&too_high).unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let negative = VALID.replace("0.6", "-0.1");
        assert!(parse_response(&negative).is_err());
    }
}
