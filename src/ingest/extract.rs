use std::fmt;
use std::io::{Cursor, Read};
use std::panic::{self, AssertUnwindSafe};

use anyhow::anyhow;
use tracing::{debug, info, instrument};

use super::document::UploadedDocument;
use crate::error::ExtractError;

/// Document kinds the file turn understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Pdf,
    Presentation,
    Csv,
    PlainText,
}

impl DocumentKind {
    pub const SUPPORTED: &'static str =
        "PDF (.pdf), PowerPoint (.pptx, .ppt), CSV (.csv), plain text (.txt)";

    /// Short tag stored alongside document summaries.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Presentation => "PPT",
            Self::Csv => "CSV",
            Self::PlainText => "TXT",
        }
    }

    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/pdf" => Some(Self::Pdf),
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            | "application/vnd.ms-powerpoint" => Some(Self::Presentation),
            "text/csv" | "application/csv" => Some(Self::Csv),
            "text/plain" => Some(Self::PlainText),
            _ => None,
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        let (_, ext) = lower.rsplit_once('.')?;
        match ext {
            "pdf" => Some(Self::Pdf),
            "pptx" | "ppt" => Some(Self::Presentation),
            "csv" => Some(Self::Csv),
            "txt" => Some(Self::PlainText),
            _ => None,
        }
    }

    /// Declared media type first, file name suffix as the fallback.
    pub fn classify(document: &UploadedDocument) -> Result<Self, ExtractError> {
        Self::from_media_type(&document.media_type)
            .or_else(|| Self::from_file_name(&document.name))
            .ok_or_else(|| ExtractError::UnsupportedType {
                name: document.name.clone(),
                media_type: document.media_type.clone(),
                supported: Self::SUPPORTED,
            })
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub kind: DocumentKind,
    pub name: String,
    pub text: String,
}

/// Decodes a document into plain text. The document (and its bytes) is consumed.
#[instrument(skip_all, fields(document = %document.name, media_type = %document.media_type))]
pub fn extract(document: UploadedDocument) -> Result<ExtractedText, ExtractError> {
    let kind = DocumentKind::classify(&document)?;
    let (name, bytes) = document.into_bytes(kind.tag())?;
    info!(
        kind = kind.tag(),
        bytes = bytes.len(),
        digest = %short_digest(&bytes),
        "extracting document"
    );

    let decoded = match kind {
        DocumentKind::Pdf => decode_pdf(&bytes),
        DocumentKind::Presentation => decode_presentation(bytes),
        DocumentKind::Csv => decode_csv(&bytes),
        DocumentKind::PlainText => decode_plain_text(bytes),
    };
    let text =
        decoded.map_err(|source| ExtractError::parse_failure(name.clone(), kind.tag(), source))?;

    if text.trim().is_empty() {
        return Err(ExtractError::EmptyContent { name });
    }

    debug!(chars = text.chars().count(), "document text extracted");
    Ok(ExtractedText { kind, name, text })
}

/// Runs `extract` on the blocking pool; decoder panics become parse failures.
pub async fn extract_blocking(document: UploadedDocument) -> Result<ExtractedText, ExtractError> {
    let name = document.name.clone();
    let kind = DocumentKind::classify(&document)?;
    match tokio::task::spawn_blocking(move || extract(document)).await {
        Ok(result) => result,
        Err(join_err) => Err(ExtractError::parse_failure(
            name,
            kind.tag(),
            anyhow!("decoder aborted: {join_err}"),
        )),
    }
}

fn short_digest(bytes: &[u8]) -> String {
    let hex = blake3::hash(bytes).to_hex();
    hex.as_str()[..16].to_string()
}

fn decode_pdf(bytes: &[u8]) -> anyhow::Result<String> {
    let extracted = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes)
    }))
    .map_err(|_| anyhow!("PDF decoder panicked"))?
    .map_err(|err| anyhow!("{err}"))?;

    Ok(extracted
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

fn decode_presentation(bytes: Vec<u8>) -> anyhow::Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| anyhow!("not a PowerPoint (OOXML) archive: {err}"))?;

    let mut slides: Vec<(usize, String)> = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        let Some(number) = name
            .strip_prefix("ppt/slides/slide")
            .and_then(|rest| rest.strip_suffix(".xml"))
            .and_then(|n| n.parse::<usize>().ok())
        else {
            continue;
        };

        let mut xml = String::new();
        entry.read_to_string(&mut xml)?;
        let text = slide_text(&xml);
        if !text.is_empty() {
            slides.push((number, text));
        }
    }

    slides.sort_by_key(|(number, _)| *number);
    Ok(slides
        .into_iter()
        .map(|(number, text)| format!("--- Slide {number} ---\n{text}"))
        .collect::<Vec<_>>()
        .join("\n\n"))
}

/// Collects `<a:t>` runs, one output line per `<a:p>` paragraph.
fn slide_text(xml: &str) -> String {
    let mut paragraphs = Vec::new();

    for paragraph in xml.split("</a:p>") {
        let mut line = String::new();
        let mut rest = paragraph;
        while let Some(pos) = rest.find("<a:t") {
            let after = &rest[pos + 4..];
            // skip <a:tab>, <a:tbl>, <a:txBody> and friends
            if !(after.starts_with('>') || after.starts_with(' ')) {
                rest = after;
                continue;
            }
            let Some(open_end) = after.find('>') else {
                break;
            };
            if after[..open_end].ends_with('/') {
                rest = &after[open_end + 1..];
                continue;
            }
            let body = &after[open_end + 1..];
            let Some(close) = body.find("</a:t>") else {
                break;
            };
            line.push_str(&unescape_xml(&body[..close]));
            rest = &body[close + 6..];
        }

        let trimmed = line.trim();
        if !trimmed.is_empty() {
            paragraphs.push(trimmed.to_string());
        }
    }

    paragraphs.join("\n")
}

fn unescape_xml(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_csv(bytes: &[u8]) -> anyhow::Result<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        lines.push(
            record
                .iter()
                .map(str::trim)
                .collect::<Vec<_>>()
                .join(" | "),
        );
    }

    Ok(lines.join("\n"))
}

fn decode_plain_text(bytes: Vec<u8>) -> anyhow::Result<String> {
    let text = String::from_utf8(bytes).map_err(|err| anyhow!("text is not valid UTF-8: {err}"))?;
    Ok(text.trim_start_matches('\u{feff}').to_string())
}


#[cfg(test)]
mod tests {
    use super::test_pdf::pdf_with_lines;
    use super::*;
    use std::io::Write;

    fn pptx(slides: &[(usize, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        writer
            .start_file("[Content_Types].xml", options)
            .expect("start file");
        writer.write_all(b"<Types/>").expect("write");
        for (number, body) in slides {
            writer
                .start_file(format!("ppt/slides/slide{number}.xml"), options)
                .expect("start slide");
            writer.write_all(body.as_bytes()).expect("write slide");
        }
        writer
            .start_file("ppt/slides/_rels/slide1.xml.rels", options)
            .expect("start rels");
        writer.write_all(b"<Relationships/>").expect("write rels");
        writer.finish().expect("finish zip").into_inner()
    }

    fn slide_xml(paragraphs: &[&[&str]]) -> String {
        let body: String = paragraphs
            .iter()
            .map(|runs| {
                let runs: String = runs
                    .iter()
                    .map(|run| format!(r#"<a:r><a:rPr lang="en-US"/><a:t>{run}</a:t></a:r>"#))
                    .collect();
                format!("<a:p><a:pPr/>{runs}</a:p>")
            })
            .collect();
        format!(r#"<p:sld><p:cSld><p:spTree><p:sp><p:txBody><a:bodyPr/>{body}</p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#)
    }

    fn blank_pdf() -> Vec<u8> {
        pdf_with_lines(&[])
    }

    #[test]
    fn classification_prefers_media_type() {
        let doc = UploadedDocument::from_bytes("deck.txt", "application/pdf", Vec::new());
        assert_eq!(DocumentKind::classify(&doc).unwrap(), DocumentKind::Pdf);

        let doc = UploadedDocument::from_bytes("export.CSV", "application/vnd.ms-excel", Vec::new());
        assert_eq!(DocumentKind::classify(&doc).unwrap(), DocumentKind::Csv);

        let doc = UploadedDocument::from_bytes("notes", "text/plain; charset=utf-8", Vec::new());
        assert_eq!(DocumentKind::classify(&doc).unwrap(), DocumentKind::PlainText);
    }

    #[test]
    fn unsupported_types_are_named() {
        let doc = UploadedDocument::from_bytes("diagram.png", "image/png", vec![0x89, b'P']);
        match extract(doc) {
            Err(ExtractError::UnsupportedType {
                media_type,
                supported,
                ..
            }) => {
                assert_eq!(media_type, "image/png");
                assert!(supported.contains("PDF"));
            }
            other => panic!("expected UnsupportedType, got {other:?}"),
        }
    }

    #[test]
    fn plain_text_passes_through() {
        let doc = UploadedDocument::from_bytes("a.txt", "text/plain", "\u{feff}hello\nworld");
        let extracted = extract(doc).expect("text");
        assert_eq!(extracted.kind, DocumentKind::PlainText);
        assert_eq!(extracted.text, "hello\nworld");
    }

    #[test]
    fn invalid_utf8_is_a_parse_failure() {
        let doc = UploadedDocument::from_bytes("a.txt", "text/plain", vec![0xff, 0xfe, 0x41]);
        assert!(matches!(
            extract(doc),
            Err(ExtractError::ParseFailure { kind: "TXT", .. })
        ));
    }

    #[test]
    fn whitespace_only_text_is_empty_content() {
        let doc = UploadedDocument::from_bytes("blank.txt", "text/plain", " \n\t \n");
        assert!(matches!(
            extract(doc),
            Err(ExtractError::EmptyContent { name }) if name == "blank.txt"
        ));
    }

    #[test]
    fn csv_rows_become_lines() {
        let doc = UploadedDocument::from_bytes(
            "people.csv",
            "text/csv",
            "name,age\nAda,36\n,\n\"Lovelace, A\",37,extra\n",
        );
        let extracted = extract(doc).expect("csv");
        assert_eq!(extracted.text, "name | age\nAda | 36\nLovelace, A | 37 | extra");
    }

    #[test]
    fn presentation_slides_are_ordered() {
        let slide_two = slide_xml(&[&["Second", " slide"]]);
        let slide_ten = slide_xml(&[&["Tenth"]]);
        let slide_one = slide_xml(&[&["Title &amp; intro"], &["Bullet ", "one"]]);
        let bytes = pptx(&[(10, &slide_ten), (2, &slide_two), (1, &slide_one)]);

        let doc = UploadedDocument::from_bytes(
            "deck.pptx",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            bytes,
        );
        let extracted = extract(doc).expect("pptx");
        assert_eq!(extracted.kind.tag(), "PPT");
        assert_eq!(
            extracted.text,
            "--- Slide 1 ---\nTitle & intro\nBullet one\n\n--- Slide 2 ---\nSecond slide\n\n--- Slide 10 ---\nTenth"
        );
    }

    #[test]
    fn presentation_without_text_is_empty_content() {
        let bytes = pptx(&[(1, "<p:sld><a:p><a:pPr/></a:p></p:sld>")]);
        let doc = UploadedDocument::from_bytes("empty.pptx", "", bytes);
        assert!(matches!(extract(doc), Err(ExtractError::EmptyContent { .. })));
    }

    #[test]
    fn legacy_binary_ppt_is_a_parse_failure() {
        let doc = UploadedDocument::from_bytes(
            "old.ppt",
            "application/vnd.ms-powerpoint",
            vec![0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1],
        );
        assert!(matches!(
            extract(doc),
            Err(ExtractError::ParseFailure { kind: "PPT", .. })
        ));
    }

    #[test]
    fn image_only_pdf_is_empty_content() {
        let doc = UploadedDocument::from_bytes("scan.pdf", "application/pdf", blank_pdf());
        assert!(matches!(
            extract(doc),
            Err(ExtractError::EmptyContent { name }) if name == "scan.pdf"
        ));
    }

    #[test]
    fn pdf_text_lines_are_trimmed_and_joined() {
        let bytes = pdf_with_lines(&["Hello world", "Second line"]);
        let doc = UploadedDocument::from_bytes("report.pdf", "application/pdf", bytes);

        let extracted = extract(doc).expect("pdf text");
        assert_eq!(extracted.kind, DocumentKind::Pdf);
        assert_eq!(extracted.name, "report.pdf");
        assert_eq!(extracted.text, "Hello world\nSecond line");
    }

    #[test]
    fn garbage_pdf_is_a_parse_failure() {
        let doc = UploadedDocument::from_bytes("broken.pdf", "application/pdf", b"not a pdf".to_vec());
        assert!(matches!(
            extract(doc),
            Err(ExtractError::ParseFailure { kind: "PDF", .. })
        ));
    }

    #[test]
    fn slide_text_skips_non_run_tags() {
        let xml = r#"<a:p><a:r><a:t>Tab</a:t></a:r><a:tab/><a:r><a:t xml:space="preserve">bed</a:t></a:r></a:p><a:tbl><a:tr><a:tc><a:txBody><a:p><a:r><a:t>cell</a:t></a:r></a:p></a:txBody></a:tc></a:tr></a:tbl>"#;
        assert_eq!(slide_text(xml), "Tabbed\ncell");
    }

    #[test]
    fn entities_are_unescaped() {
        assert_eq!(unescape_xml("a &lt;b&gt; &#65;&#x42; &bogus; &"), "a <b> AB &bogus; &");
    }

    #[tokio::test]
    async fn blocking_extraction_matches_inline() {
        let doc = UploadedDocument::from_bytes("a.txt", "text/plain", "on the pool");
        let extracted = extract_blocking(doc).await.expect("extract");
        assert_eq!(extracted.text, "on the pool");
    }
}
