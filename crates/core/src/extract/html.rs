use super::text::decode_bytes;
use crate::error::ExtractError;
use crate::models::{ExtractedText, ExtractionMethod};
use regex::Regex;

/// HTML to text: drop script/style/comment content, turn block-level
/// boundaries into line breaks, strip the remaining tags, decode the
/// common entities.
pub fn extract_html(bytes: &[u8]) -> Result<ExtractedText, ExtractError> {
    let (raw, _had_errors) = decode_bytes(bytes);
    let content = strip_tags(&raw)?;
    if content.trim().is_empty() {
        return Err(ExtractError::NoExtractableContent);
    }
    Ok(ExtractedText {
        content,
        method: ExtractionMethod::Html,
        confidence: None,
        section_count: None,
    })
}

fn strip_tags(html: &str) -> Result<String, ExtractError> {
    let without_scripts = Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)\s*>")?
        .replace_all(html, " ");
    let without_comments = Regex::new(r"(?s)<!--.*?-->")?.replace_all(&without_scripts, " ");
    let with_breaks = Regex::new(
        r"(?i)</?(p|div|br|li|ul|ol|tr|td|th|table|h[1-6]|section|article|header|footer|blockquote)\b[^>]*>",
    )?
    .replace_all(&without_comments, "\n");
    let stripped = Regex::new(r"(?s)<[^>]*>")?.replace_all(&with_breaks, " ");

    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    // Collapse runs of spaces while keeping line structure.
    let mut out = String::with_capacity(decoded.len());
    for line in decoded.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            out.push_str(&collapsed);
            out.push('\n');
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_and_styles_are_dropped() {
        let html = br#"<html><head><style>.x { color: red }</style>
<script>var tracking = "beacon";</script></head>
<body><h1>Deployment guide</h1><p>Roll out to the staging ring first.</p></body></html>"#;

        let extracted = extract_html(html).unwrap();
        assert!(extracted.content.contains("Deployment guide"));
        assert!(extracted.content.contains("staging ring"));
        assert!(!extracted.content.contains("beacon"));
        assert!(!extracted.content.contains("color"));
    }

    #[test]
    fn block_tags_become_line_breaks() {
        let extracted = extract_html(b"<p>first</p><p>second</p>").unwrap();
        let lines: Vec<&str> = extracted.content.lines().collect();
        assert_eq!(lines, vec!["first", "second"]);
    }

    #[test]
    fn entities_are_decoded() {
        let extracted = extract_html(b"<p>a &amp; b &lt;= c</p>").unwrap();
        assert!(extracted.content.contains("a & b <= c"));
    }

    #[test]
    fn markup_only_input_has_no_content() {
        assert!(matches!(
            extract_html(b"<div><span></span></div>"),
            Err(ExtractError::NoExtractableContent)
        ));
    }
}
