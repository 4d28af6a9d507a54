//! Content extraction for uploaded files.
//!
//! The declared media type picks one strategy per kind. Anything unrecognized
//! is read as UTF-8 text, so an unknown binary format reaches the model as
//! garbled text rather than failing the request.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, ColorType};
use serde_json::{Map, Value};
use std::io::Cursor;
use tracing::{debug, warn};

/// Images wider than this are downscaled before being sent to the model.
const MAX_IMAGE_WIDTH: u32 = 1024;
const JPEG_QUALITY: u8 = 80;

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("failed to process image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to open spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("spreadsheet has no sheets")]
    EmptyWorkbook,

    #[error("failed to load PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("failed to read Word document: {0}")]
    Word(String),

    #[error("failed to serialize rows: {0}")]
    Json(#[from] serde_json::Error),
}

/// Extraction strategy, chosen from the declared media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Csv,
    Spreadsheet,
    Pdf,
    WordDocument,
    Text,
}

impl MediaKind {
    /// Classify a declared media type. Parameters such as `; charset=utf-8` are ignored.
    pub fn from_media_type(media_type: &str) -> Self {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            m if m.starts_with("image/") => Self::Image,
            "text/csv" => Self::Csv,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.ms-excel" => Self::Spreadsheet,
            "application/pdf" => Self::Pdf,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/msword" => Self::WordDocument,
            _ => Self::Text,
        }
    }
}

/// What gets sent to the model: text, or an image embedded as a data URL.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentContent {
    Text(String),
    Image { data_url: String },
}

/// Extract model input from raw file bytes.
pub fn extract(kind: MediaKind, data: &[u8]) -> Result<DocumentContent, ExtractionError> {
    debug!("Extracting {:?} content from {} bytes", kind, data.len());

    let content = match kind {
        MediaKind::Image => DocumentContent::Image {
            data_url: image_to_data_url(data)?,
        },
        MediaKind::Csv => DocumentContent::Text(csv_to_json_lines(data)?),
        MediaKind::Spreadsheet => DocumentContent::Text(first_sheet_to_json(data)?),
        MediaKind::Pdf => DocumentContent::Text(pdf_to_text(data)?),
        MediaKind::WordDocument => DocumentContent::Text(word_to_text(data)?),
        MediaKind::Text => DocumentContent::Text(String::from_utf8_lossy(data).into_owned()),
    };

    Ok(content)
}

// ============================================================================
// Images
// ============================================================================

/// Downscale to at most [`MAX_IMAGE_WIDTH`] wide, re-encode as JPEG, embed as a data URL.
fn image_to_data_url(data: &[u8]) -> Result<String, ExtractionError> {
    let mut img = image::load_from_memory(data)?;

    if img.width() > MAX_IMAGE_WIDTH {
        // Height bound is open so only the width constrains the aspect-preserving resize.
        img = img.resize(MAX_IMAGE_WIDTH, u32::MAX, FilterType::Triangle);
    }

    let rgb = img.to_rgb8();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ColorType::Rgb8,
    )?;

    debug!(
        "Re-encoded image to {}x{} JPEG ({} bytes)",
        rgb.width(),
        rgb.height(),
        jpeg.len()
    );

    Ok(format!("data:image/jpeg;base64,{}", BASE64.encode(&jpeg)))
}

// ============================================================================
// Tabular data
// ============================================================================

/// Header-keyed CSV rows, one JSON object per line.
fn csv_to_json_lines(data: &[u8]) -> Result<String, ExtractionError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(data);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let mut lines = Vec::new();
    for result in reader.records() {
        let record = result?;
        let mut row = Map::new();
        for (idx, field) in record.iter().enumerate() {
            let key = headers
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("_{}", idx));
            row.insert(key, Value::String(field.to_string()));
        }
        lines.push(serde_json::to_string(&row)?);
    }

    Ok(lines.join("\n"))
}

/// First worksheet of an xlsx/xls workbook as a JSON array of header-keyed rows.
fn first_sheet_to_json(data: &[u8]) -> Result<String, ExtractionError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(data))?;

    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(ExtractionError::EmptyWorkbook)?;

    let range = workbook.worksheet_range(&first)?;
    let rows = range_to_rows(&range);
    debug!("Sheet '{}': {} data rows", first, rows.len());

    Ok(serde_json::to_string(&rows)?)
}

/// First row = headers. Empty cells are omitted and blank rows skipped.
fn range_to_rows(range: &Range<Data>) -> Vec<Value> {
    let mut row_iter = range.rows();

    let headers: Vec<String> = match row_iter.next() {
        Some(header_row) => header_row
            .iter()
            .enumerate()
            .map(|(idx, cell)| match cell_to_string(cell) {
                h if h.is_empty() => format!("__EMPTY_{}", idx),
                h => h,
            })
            .collect(),
        None => return Vec::new(),
    };

    let mut rows = Vec::new();
    for row in row_iter {
        let mut object = Map::new();
        for (idx, cell) in row.iter().enumerate() {
            if let (Some(key), Some(value)) = (headers.get(idx), cell_to_json(cell)) {
                object.insert(key.clone(), value);
            }
        }
        if !object.is_empty() {
            rows.push(Value::Object(object));
        }
    }

    rows
}

fn cell_to_json(cell: &Data) -> Option<Value> {
    match cell {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(Value::String(s.clone())),
        Data::Int(i) => Some(Value::from(*i)),
        Data::Float(f) => {
            // Whole numbers (e.g. 19900502) stay integers
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                Some(Value::from(*f as i64))
            } else {
                Some(serde_json::json!(f))
            }
        }
        Data::Bool(b) => Some(Value::Bool(*b)),
        other => Some(Value::String(cell_to_string(other))),
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => number_to_string(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_string(dt.as_f64()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{:?}", e),
    }
}

/// Largest serial Excel can display as a date, 9999-12-31.
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// Whole numbers without a trailing `.0`.
fn number_to_string(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

/// Convert an Excel serial date number to `YYYY-MM-DD` (plus time when present).
///
/// Serial 25569 is 1970-01-01. Excel counts a nonexistent 1900-02-29 as serial 60,
/// so serials below it are one day behind. Values outside Excel's date range are
/// kept as plain numbers.
fn excel_serial_to_string(serial: f64) -> String {
    if !(0.0..=MAX_EXCEL_SERIAL).contains(&serial) {
        return number_to_string(serial);
    }

    let mut days = serial.floor() as i64;
    let mut secs_of_day = ((serial - days as f64) * 86400.0).round() as i64;
    if secs_of_day >= 86400 {
        days += 1;
        secs_of_day = 0;
    }

    let adjusted_days = if days < 60 { days + 1 } else { days };
    let (year, month, day) = civil_from_days(adjusted_days - 25569);

    if secs_of_day == 0 {
        format!("{:04}-{:02}-{:02}", year, month, day)
    } else {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            year,
            month,
            day,
            secs_of_day / 3600,
            (secs_of_day % 3600) / 60,
            secs_of_day % 60
        )
    }
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
///
/// Closed form over 400-year eras with years starting in March.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

// ============================================================================
// Documents
// ============================================================================

/// Plain text of every page, in page order.
fn pdf_to_text(data: &[u8]) -> Result<String, ExtractionError> {
    use lopdf::Document;

    let doc = Document::load_from(Cursor::new(data))?;

    let mut text = String::new();
    for (page_num, _) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(content) => {
                text.push_str(&content);
                text.push('\n');
            }
            Err(e) => warn!("Skipping PDF page {}: {}", page_num, e),
        }
    }

    Ok(text)
}

/// Raw paragraph text of a .docx, including text inside tables.
fn word_to_text(data: &[u8]) -> Result<String, ExtractionError> {
    use docx_rs::DocumentChild;

    let docx = docx_rs::read_docx(data).map_err(|e| ExtractionError::Word(format!("{:?}", e)))?;

    let mut text = String::new();
    for child in &docx.document.children {
        match child {
            DocumentChild::Paragraph(p) => push_paragraph(&mut text, p),
            DocumentChild::Table(t) => push_table(&mut text, t),
            _ => {}
        }
    }

    Ok(text)
}

fn push_paragraph(out: &mut String, paragraph: &docx_rs::Paragraph) {
    push_runs(out, &paragraph.children);
    out.push('\n');
}

/// Run text, including runs nested in hyperlinks.
fn push_runs(out: &mut String, children: &[docx_rs::ParagraphChild]) {
    use docx_rs::{ParagraphChild, RunChild};

    for child in children {
        match child {
            ParagraphChild::Run(run) => {
                for run_child in &run.children {
                    if let RunChild::Text(t) = run_child {
                        out.push_str(&t.text);
                    }
                }
            }
            ParagraphChild::Hyperlink(link) => push_runs(out, &link.children),
            _ => {}
        }
    }
}

#[allow(irrefutable_let_patterns)]
fn push_table(out: &mut String, table: &docx_rs::Table) {
    use docx_rs::{TableCellContent, TableChild, TableRowChild};

    for row in &table.rows {
        let TableChild::TableRow(row) = row else {
            continue;
        };
        for cell in &row.cells {
            let TableRowChild::TableCell(cell) = cell else {
                continue;
            };
            for content in &cell.children {
                match content {
                    TableCellContent::Paragraph(p) => push_paragraph(out, p),
                    TableCellContent::Table(t) => push_table(out, t),
                    #[allow(unreachable_patterns)]
                    _ => {}
                }
            }
        }
    }
}
