use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 推論回應中的四個屬性名稱，依輸出欄位順序排列
pub const ATTRIBUTE_NAMES: [&str; 4] = [
    "predicted_gender",
    "predicted_origin",
    "deduced_language",
    "user_persona",
];

/// 失敗列使用的欄位名稱
pub const ERROR_COLUMN: &str = "error";

/// 輸出檔名後綴
pub const OUTPUT_SUFFIX: &str = "_output";

/// One record of the input table. Cells are stored positionally and
/// resolved to column names through the owning [`Dataset`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRow {
    pub cells: Vec<String>,
}

impl InputRow {
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }
}

/// 已載入的表格資料：有序標頭加上依原始順序排列的資料列
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<InputRow>,
}

impl Dataset {
    pub fn new(headers: Vec<String>, rows: Vec<InputRow>) -> Self {
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Returns the cell at `(row, column)`, or an empty string when the
    /// column is unknown or the row is short.
    pub fn value<'a>(&'a self, row: &'a InputRow, column: &str) -> &'a str {
        self.column_index(column)
            .and_then(|idx| row.cell(idx))
            .unwrap_or("")
    }

    /// 回傳不存在於標頭中的欄位名稱
    pub fn missing_columns<'c>(&self, columns: &[&'c str]) -> Vec<&'c str> {
        columns
            .iter()
            .copied()
            .filter(|c| self.column_index(c).is_none())
            .collect()
    }
}

/// A single inferred attribute with the model's confidence in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub value: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub predicted_gender: Prediction,
    pub predicted_origin: Prediction,
    pub deduced_language: Prediction,
    pub user_persona: Prediction,
}

impl InferenceResult {
    /// 依 [`ATTRIBUTE_NAMES`] 的順序列出屬性
    pub fn attributes(&self) -> [(&'static str, &Prediction); 4] {
        [
            (ATTRIBUTE_NAMES[0], &self.predicted_gender),
            (ATTRIBUTE_NAMES[1], &self.predicted_origin),
            (ATTRIBUTE_NAMES[2], &self.deduced_language),
            (ATTRIBUTE_NAMES[3], &self.user_persona),
        ]
    }
}

/// Per-row derived fields. Either every attribute is present or only the
/// error is; the enum makes a mixed row unrepresentable.
#[derive(Debug, Clone, PartialEq)]
pub enum FlattenedResult {
    Analyzed(InferenceResult),
    Failed { error: String },
}

impl FlattenedResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// 攤平成 (欄位名稱, 值) 配對
    pub fn fields(&self) -> Vec<(String, String)> {
        match self {
            Self::Analyzed(result) => result
                .attributes()
                .iter()
                .flat_map(|(name, prediction)| {
                    [
                        (format!("{}_value", name), prediction.value.clone()),
                        (
                            format!("{}_confidence", name),
                            prediction.confidence.to_string(),
                        ),
                    ]
                })
                .collect(),
            Self::Failed { error } => vec![(ERROR_COLUMN.to_string(), error.clone())],
        }
    }
}

/// 輸出表格：原始欄位 + 推論欄位，逐列對齊
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl OutputTable {
    /// Concatenates `dataset` with `results` column-wise. Derived columns are
    /// ordered by first appearance; cells a row does not carry stay empty.
    pub fn assemble(dataset: &Dataset, results: &[FlattenedResult]) -> Self {
        let flattened: Vec<Vec<(String, String)>> =
            results.iter().map(FlattenedResult::fields).collect();

        let mut derived: Vec<String> = Vec::new();
        for fields in &flattened {
            for (name, _) in fields {
                if !derived.contains(name) {
                    derived.push(name.clone());
                }
            }
        }

        let width = dataset.headers.len();
        let rows = dataset
            .rows
            .iter()
            .zip(flattened.iter())
            .map(|(row, fields)| {
                let mut out: Vec<String> = (0..width)
                    .map(|i| row.cell(i).unwrap_or("").to_string())
                    .collect();
                out.extend(derived.iter().map(|column| {
                    fields
                        .iter()
                        .find(|(name, _)| name == column)
                        .map(|(_, value)| value.clone())
                        .unwrap_or_default()
                }));
                out
            })
            .collect();

        let mut headers = dataset.headers.clone();
        headers.extend(derived);

        Self { headers, rows }
    }

    pub fn to_csv(&self) -> crate::utils::error::Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| crate::utils::error::AnalysisError::Io(e.into_error()))
    }
}

/// API 金鑰。Debug 與 Display 皆不輸出內容
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Inputs for one run, fixed before the pipeline starts.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub credential: Credential,
    pub input_path: PathBuf,
    pub fullname_column: String,
    pub username_column: String,
}

impl PipelineConfig {
    /// `<input_dir>/<input_stem>_output.csv`
    pub fn output_path(&self) -> PathBuf {
        output_path_for(&self.input_path)
    }
}

pub fn output_path_for(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = format!("{}{}.csv", stem, OUTPUT_SUFFIX);
    match input.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_ROW_DELAY: Duration = Duration::from_secs(3);

/// Model and pacing settings shared by every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisSettings {
    pub model: String,
    pub endpoint: String,
    /// 單次請求逾時；預設不設限
    pub timeout: Option<Duration>,
    pub row_delay: Duration,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: None,
            row_delay: DEFAULT_ROW_DELAY,
        }
    }
}

/// 完成後的統計
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub output_path: PathBuf,
    pub total_rows: usize,
    pub failed_rows: usize,
}
