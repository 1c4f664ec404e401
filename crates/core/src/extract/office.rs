use super::ExtractorConfig;
use crate::error::ExtractError;
use crate::models::{ExtractedText, ExtractionMethod};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use tracing::debug;

/// Zip-bomb guard for a single decompressed XML part.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|error| ExtractError::Failed(format!("not an office archive: {error}")))
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|error| ExtractError::Failed(format!("missing archive part {name}: {error}")))?;
    read_bounded(entry, name)
}

fn read_bounded(entry: impl Read, name: &str) -> Result<Vec<u8>, ExtractError> {
    let mut out = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Failed(format!(
            "archive part {name} exceeds {MAX_XML_ENTRY_BYTES} bytes"
        )));
    }
    Ok(out)
}

/// Word-processing XML: paragraph text from `word/document.xml`.
pub fn extract_word(bytes: &[u8]) -> Result<ExtractedText, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let document_xml = read_entry(&mut archive, "word/document.xml")?;

    // Text runs are read untrimmed: `xml:space="preserve"` runs carry
    // significant leading/trailing whitespace.
    let mut reader = Reader::from_reader(document_xml.as_slice());

    let mut content = String::new();
    let mut in_text_run = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(element) => match element.local_name().as_ref() {
                b"t" => in_text_run = true,
                b"br" => content.push('\n'),
                b"tab" => content.push('\t'),
                _ => {}
            },
            Event::Empty(element) => match element.local_name().as_ref() {
                b"br" => content.push('\n'),
                b"tab" => content.push('\t'),
                _ => {}
            },
            Event::End(element) => match element.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => content.push('\n'),
                _ => {}
            },
            Event::Text(text) => {
                if in_text_run {
                    content.push_str(text.unescape().unwrap_or_default().as_ref());
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if content.trim().is_empty() {
        return Err(ExtractError::NoExtractableContent);
    }

    Ok(ExtractedText {
        content,
        method: ExtractionMethod::WordXml,
        confidence: None,
        section_count: None,
    })
}

/// Presentation XML. Three strategies in strict order, first one clearing
/// the minimum-content bar wins:
/// 1. structural walk of each slide's shape tree (placeholders, floating
///    text boxes, grouped shapes, table cells),
/// 2. raw tag-text scrape of the slide parts,
/// 3. raw tag-text scrape of every XML part in the archive.
pub fn extract_presentation(
    bytes: &[u8],
    config: &ExtractorConfig,
) -> Result<ExtractedText, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let slides = slide_part_names(&archive);
    if slides.is_empty() {
        return Err(ExtractError::Failed(
            "presentation archive has no slide parts".to_string(),
        ));
    }

    let structural: Result<String, ExtractError> = slides
        .iter()
        .map(|name| {
            let xml = read_entry(&mut archive, name)?;
            walk_slide_tree(&xml, config.max_walk_depth)
        })
        .collect::<Result<Vec<_>, _>>()
        .map(|parts| join_sections(&parts));

    match structural {
        Ok(content) if content.trim().len() >= config.min_content_chars => {
            return Ok(ExtractedText {
                content,
                method: ExtractionMethod::SlideTree,
                confidence: None,
                section_count: Some(slides.len() as u32),
            });
        }
        Ok(_) => debug!("structural slide parse below threshold, scraping slide parts"),
        Err(error) => debug!(%error, "structural slide parse failed, scraping slide parts"),
    }

    let scraped = scrape_parts(&mut archive, &slides)?;
    if scraped.trim().len() >= config.min_content_chars {
        return Ok(ExtractedText {
            content: scraped,
            method: ExtractionMethod::SlideXmlScrape,
            confidence: None,
            section_count: Some(slides.len() as u32),
        });
    }

    debug!("slide part scrape below threshold, scraping whole archive");
    let all_parts: Vec<String> = archive
        .file_names()
        .filter(|name| name.ends_with(".xml"))
        .map(|name| name.to_string())
        .collect();
    let scraped = scrape_parts(&mut archive, &all_parts)?;
    if scraped.trim().is_empty() {
        return Err(ExtractError::NoExtractableContent);
    }

    Ok(ExtractedText {
        content: scraped,
        method: ExtractionMethod::ArchiveScrape,
        confidence: None,
        section_count: Some(slides.len() as u32),
    })
}

fn slide_part_names(archive: &Archive<'_>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with("ppt/slides/slide") && name.ends_with(".xml"))
        .map(|name| name.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Walk one slide's nested shape tree, collecting text-run leaves.
/// Every `a:t` under a `txBody` counts, so floating text boxes and table
/// cells are included, not just title/body placeholders. Depth is bounded
/// because the tree comes from an untrusted file.
fn walk_slide_tree(xml: &[u8], max_depth: usize) -> Result<String, ExtractError> {
    let mut reader = Reader::from_reader(xml);

    let mut content = String::new();
    let mut depth = 0usize;
    let mut text_body_depth = 0usize;
    let mut in_text_run = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(element) => {
                depth += 1;
                if depth > max_depth {
                    return Err(ExtractError::Failed(format!(
                        "slide object tree deeper than {max_depth}"
                    )));
                }
                match element.local_name().as_ref() {
                    b"txBody" => text_body_depth += 1,
                    b"t" if text_body_depth > 0 => in_text_run = true,
                    _ => {}
                }
            }
            Event::End(element) => {
                depth = depth.saturating_sub(1);
                match element.local_name().as_ref() {
                    b"txBody" => text_body_depth = text_body_depth.saturating_sub(1),
                    b"t" => in_text_run = false,
                    b"p" if text_body_depth > 0 => content.push('\n'),
                    _ => {}
                }
            }
            Event::Text(text) => {
                if in_text_run {
                    content.push_str(text.unescape().unwrap_or_default().as_ref());
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(content)
}

/// Lenient tag-text scrape: every text node in the named parts, no
/// structure assumed.
fn scrape_parts(archive: &mut Archive<'_>, names: &[String]) -> Result<String, ExtractError> {
    let mut sections = Vec::new();
    for name in names {
        let xml = read_entry(archive, name)?;
        let mut reader = Reader::from_reader(xml.as_slice());
        let reader_config = reader.config_mut();
        reader_config.trim_text(true);
        reader_config.check_end_names = false;

        let mut section = String::new();
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Text(text)) => {
                    let value = text.unescape().unwrap_or_default();
                    if !value.trim().is_empty() {
                        if !section.is_empty() {
                            section.push(' ');
                        }
                        section.push_str(value.trim());
                    }
                }
                Ok(Event::Eof) => break,
                Err(_) => break,
                _ => {}
            }
            buf.clear();
        }
        if !section.is_empty() {
            sections.push(section);
        }
    }
    Ok(join_sections(&sections))
}

fn join_sections(sections: &[String]) -> String {
    sections
        .iter()
        .filter(|section| !section.trim().is_empty())
        .map(|section| section.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}
