//! Tabular loader: CSV and spreadsheet input into a [`Dataset`].

use crate::domain::model::{Dataset, InputRow};
use crate::utils::error::{AnalysisError, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use csv::ReaderBuilder;
use std::io::Cursor;
use std::path::Path;

pub const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["csv", "xlsx", "xlsm", "xlsb", "xls", "ods"];

/// 視為缺值的儲存格內容，載入後成為空字串
pub const MISSING_VALUE_MARKERS: [&str; 18] = [
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Spreadsheet,
}

impl InputFormat {
    /// 依副檔名判斷格式
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some(ext) if SPREADSHEET_EXTENSIONS.contains(&ext) => Ok(Self::Spreadsheet),
            _ => Err(AnalysisError::UnsupportedFormat {
                path: path.display().to_string(),
            }),
        }
    }
}

/// Reads the whole table at `path`.
pub fn load(path: &Path) -> Result<Dataset> {
    let format = InputFormat::from_path(path)?;
    let bytes = std::fs::read(path).map_err(|e| AnalysisError::load(path.display().to_string(), e))?;
    load_bytes(&bytes, format, &path.display().to_string())
}

/// Parses already-read file contents. `origin` only labels errors.
pub fn load_bytes(bytes: &[u8], format: InputFormat, origin: &str) -> Result<Dataset> {
    let dataset = match format {
        InputFormat::Csv => parse_csv(bytes, origin)?,
        InputFormat::Spreadsheet => parse_spreadsheet(bytes, origin)?,
    };
    tracing::debug!(
        "Loaded {} rows x {} columns from {}",
        dataset.len(),
        dataset.headers.len(),
        origin
    );
    Ok(dataset)
}

/// Column names of the table at `path`, without reading the data rows.
pub fn peek_headers(path: &Path) -> Result<Vec<String>> {
    let origin = path.display().to_string();
    match InputFormat::from_path(path)? {
        InputFormat::Csv => {
            let mut reader = ReaderBuilder::new()
                .has_headers(false)
                .from_path(path)
                .map_err(|e| AnalysisError::load(origin.clone(), e))?;
            let mut record = csv::StringRecord::new();
            let found = reader
                .read_record(&mut record)
                .map_err(|e| AnalysisError::load(origin.clone(), e))?;
            if !found {
                return Err(AnalysisError::load(origin, "no header row"));
            }
            Ok(normalize_headers(record.iter().map(str::to_string).collect()))
        }
        InputFormat::Spreadsheet => {
            let bytes = std::fs::read(path).map_err(|e| AnalysisError::load(origin.clone(), e))?;
            let range = first_sheet(&bytes, &origin)?;
            let header = range
                .rows()
                .next()
                .ok_or_else(|| AnalysisError::load(origin, "no header row"))?;
            Ok(normalize_headers(header.iter().map(cell_to_string).collect()))
        }
    }
}

/// 預設欄位建議：(全名欄, 使用者名稱欄)
pub fn suggest_columns(headers: &[String]) -> (Option<String>, Option<String>) {
    let pick = |candidates: &[&str]| {
        candidates
            .iter()
            .find(|c| headers.iter().any(|h| h == *c))
            .map(|c| c.to_string())
    };
    (pick(&["Full Name", "Fullname"]), pick(&["Username"]))
}

fn parse_csv(bytes: &[u8], origin: &str) -> Result<Dataset> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record.map_err(|e| AnalysisError::load(origin, e))?,
        None => return Err(AnalysisError::load(origin, "no header row")),
    };
    let headers = normalize_headers(header.iter().map(str::to_string).collect());
    let width = headers.len();

    let mut rows = Vec::new();
    for (index, record) in records.enumerate() {
        let record = record.map_err(|e| AnalysisError::load(origin, e))?;
        if record.len() > width {
            return Err(AnalysisError::load(
                origin,
                format!(
                    "row {} has {} fields but the header has {}",
                    index + 1,
                    record.len(),
                    width
                ),
            ));
        }
        let mut cells: Vec<String> = record.iter().map(|c| data_cell(c.to_string())).collect();
        cells.resize(width, String::new());
        rows.push(InputRow::new(cells));
    }

    Ok(Dataset::new(headers, rows))
}

fn parse_spreadsheet(bytes: &[u8], origin: &str) -> Result<Dataset> {
    let range = first_sheet(bytes, origin)?;
    let mut sheet_rows = range.rows();

    let header = sheet_rows
        .next()
        .ok_or_else(|| AnalysisError::load(origin, "no header row"))?;
    let headers = normalize_headers(header.iter().map(cell_to_string).collect());
    let width = headers.len();

    let mut rows: Vec<InputRow> = sheet_rows
        .map(|row| {
            let mut cells: Vec<String> = row
                .iter()
                .take(width)
                .map(|c| data_cell(cell_to_string(c)))
                .collect();
            cells.resize(width, String::new());
            InputRow::new(cells)
        })
        .collect();

    while rows
        .last()
        .is_some_and(|row| row.cells.iter().all(String::is_empty))
    {
        rows.pop();
    }

    Ok(Dataset::new(headers, rows))
}

fn first_sheet(bytes: &[u8], origin: &str) -> Result<calamine::Range<Data>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| AnalysisError::load(origin, e))?;
    workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AnalysisError::load(origin, "workbook has no worksheets"))?
        .map_err(|e| AnalysisError::load(origin, e))
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

fn data_cell(text: String) -> String {
    if MISSING_VALUE_MARKERS.contains(&text.as_str()) {
        String::new()
    } else {
        text
    }
}

/// Blank names become `Unnamed: <index>`; repeats get `.1`, `.2`, ... suffixes.
fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut headers: Vec<String> = Vec::with_capacity(raw.len());
    for (index, name) in raw.into_iter().enumerate() {
        let base = if name.trim().is_empty() {
            format!("Unnamed: {}", index)
        } else {
            name
        };
        let mut candidate = base.clone();
        let mut suffix = 1;
        while headers.contains(&candidate) {
            candidate = format!("{}.{}", base, suffix);
            suffix += 1;
        }
        headers.push(candidate);
    }
    headers
}
