use crate::error::ExtractError;
use crate::models::{ExtractedText, ExtractionMethod};
use calamine::Reader;
use std::io::Write;

/// Extract spreadsheet content as chunkable text, one section per sheet:
/// `Sheet: name`, the header row, then `header: value` pairs per data
/// row so tabular semantics survive chunking.
///
/// The workbook reader wants a path, so the bytes pass through a named
/// temp file. The handle owns the file; it is removed on every exit
/// path, including errors.
pub fn extract_workbook(bytes: &[u8]) -> Result<ExtractedText, ExtractError> {
    let mut tmp = tempfile::Builder::new()
        .prefix("workbook-")
        .suffix(".xlsx")
        .tempfile()?;
    tmp.write_all(bytes)?;
    tmp.flush()?;

    let mut workbook = calamine::open_workbook_auto(tmp.path())
        .map_err(|error| ExtractError::Failed(format!("workbook open: {error}")))?;

    let names = workbook.sheet_names().to_owned();
    if names.is_empty() {
        return Err(ExtractError::NoExtractableContent);
    }

    let mut sections = Vec::new();
    for name in &names {
        let range = match workbook.worksheet_range(name) {
            Ok(range) => range,
            Err(_) => continue,
        };
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();
        let section = linearize_sheet(name, &rows);
        if !section.trim().is_empty() {
            sections.push(section);
        }
    }

    if sections.is_empty() {
        return Err(ExtractError::NoExtractableContent);
    }

    let sheet_count = sections.len() as u32;
    Ok(ExtractedText {
        content: sections.join("\n\n"),
        method: ExtractionMethod::Spreadsheet,
        confidence: None,
        section_count: Some(sheet_count),
    })
}

/// Linearize one sheet. The first non-empty row is treated as the header
/// and every later row becomes `header: value` pairs, skipping empty
/// cells.
pub(crate) fn linearize_sheet(name: &str, rows: &[Vec<String>]) -> String {
    let mut data_rows = rows
        .iter()
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()));

    let Some(header) = data_rows.next() else {
        return String::new();
    };

    let mut out = format!("Sheet: {name}\n");
    out.push_str(
        &header
            .iter()
            .map(|cell| cell.trim())
            .collect::<Vec<_>>()
            .join(" | "),
    );
    out.push('\n');

    for row in data_rows {
        let pairs: Vec<String> = header
            .iter()
            .zip(row.iter())
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(key, value)| {
                if key.trim().is_empty() {
                    value.trim().to_string()
                } else {
                    format!("{}: {}", key.trim(), value.trim())
                }
            })
            .collect();
        if pairs.is_empty() {
            continue;
        }
        out.push_str(&pairs.join(", "));
        out.push('\n');
    }

    out
}

fn cell_to_string(cell: &calamine::DataType) -> String {
    use calamine::DataType as D;
    match cell {
        D::Empty => String::new(),
        D::String(value) => value.replace("\r\n", " ").replace(['\r', '\n'], " "),
        D::Float(value) => {
            if value.fract() == 0.0 {
                format!("{}", *value as i64)
            } else {
                value.to_string()
            }
        }
        D::Int(value) => value.to_string(),
        D::Bool(value) => {
            if *value {
                "TRUE".to_string()
            } else {
                "FALSE".to_string()
            }
        }
        D::Error(error) => format!("#ERR:{error:?}"),
        other => format!("{other}"),
    }
}
