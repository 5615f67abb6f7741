//! Text extraction: turn an uploaded document into plain text.
//!
//! ## Supported formats
//!
//! | Extension | Source of text |
//! |-----------|----------------|
//! | `.txt`, `.md` | file contents (Markdown kept as written) |
//! | `.pdf` | pdfium text layer of every page, one page per block |
//! | `.docx` | `<w:t>` runs of `word/document.xml`, one paragraph per line |
//!
//! Scanned PDFs without a text layer come back as [`StudyAidError::EmptyDocument`]
//! rather than an empty string, so the caller never sends a prompt with
//! nothing to ground it.
//!
//! ## Why spawn_blocking?
//!
//! pdfium and the zip reader are synchronous and CPU-bound on large files.
//! Running them on the blocking pool keeps Tokio worker threads free for
//! the provider calls of other requests.

use crate::error::StudyAidError;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Document kinds the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    PlainText,
    Markdown,
}

impl DocumentFormat {
    /// Classify by lower-cased extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::PlainText),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    /// Classify a path, failing with `UnsupportedFormat`.
    pub fn from_path(path: &Path) -> Result<Self, StudyAidError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::from_extension(ext).ok_or_else(|| StudyAidError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension: if ext.is_empty() {
                "(none)".to_string()
            } else {
                format!(".{ext}")
            },
        })
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::PlainText => "txt",
            Self::Markdown => "md",
        }
    }
}

/// Extract the text of the document at `path`.
///
/// # Errors
/// `UnsupportedFormat`, `FileNotFound`, `PermissionDenied`,
/// `ExtractionFailed`, or `EmptyDocument` when only whitespace came out.
pub async fn extract_text(path: impl AsRef<Path>) -> Result<String, StudyAidError> {
    let path = path.as_ref().to_path_buf();
    let format = DocumentFormat::from_path(&path)?;
    check_readable(&path)?;

    let text = tokio::task::spawn_blocking(move || extract_blocking(&path, format))
        .await
        .map_err(|e| StudyAidError::Internal(format!("Extraction task panicked: {}", e)))??;

    if text.trim().is_empty() {
        return Err(StudyAidError::EmptyDocument);
    }
    info!("Extracted {} chars ({:?})", text.chars().count(), format);
    Ok(text)
}

/// Extract text from an in-memory upload named `file_name`.
///
/// The bytes are spooled to a temp file that is removed when this returns,
/// whatever the outcome.
pub async fn extract_from_bytes(bytes: &[u8], file_name: &str) -> Result<String, StudyAidError> {
    let format = DocumentFormat::from_path(Path::new(file_name))?;

    let mut spool = tempfile::Builder::new()
        .prefix("studyaid-")
        .suffix(&format!(".{}", format.extension()))
        .tempfile()
        .map_err(|e| StudyAidError::Internal(format!("Failed to create temp file: {}", e)))?;
    spool
        .write_all(bytes)
        .and_then(|_| spool.flush())
        .map_err(|e| StudyAidError::Internal(format!("Failed to write temp file: {}", e)))?;
    debug!("Spooled upload '{}' ({} bytes)", file_name, bytes.len());

    extract_text(spool.path()).await
}

fn check_readable(path: &Path) -> Result<(), StudyAidError> {
    if !path.exists() {
        return Err(StudyAidError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    match File::open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(StudyAidError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(e) => Err(failed(path, e)),
    }
}

fn failed(path: &Path, detail: impl ToString) -> StudyAidError {
    StudyAidError::ExtractionFailed {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

fn extract_blocking(path: &Path, format: DocumentFormat) -> Result<String, StudyAidError> {
    match format {
        DocumentFormat::PlainText | DocumentFormat::Markdown => read_plain(path),
        DocumentFormat::Pdf => read_pdf(path),
        DocumentFormat::Docx => read_docx(path),
    }
}

// ── Plain text ────────────────────────────────────────────────────────────

fn read_plain(path: &Path) -> Result<String, StudyAidError> {
    let bytes = std::fs::read(path).map_err(|e| failed(path, e))?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(e) => {
            warn!("{} is not valid UTF-8; replacing invalid sequences", path.display());
            Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
        }
    }
}

// ── PDF ───────────────────────────────────────────────────────────────────

/// Bind to pdfium: `PDFIUM_LIB_PATH` when set, otherwise the system loader.
pub(crate) fn bind_pdfium() -> Result<Pdfium, StudyAidError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(lib) if !lib.trim().is_empty() => {
            let lib = PathBuf::from(lib);
            let lib = if lib.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&lib)
            } else {
                lib
            };
            Pdfium::bind_to_library(&lib)
                .map_err(|e| StudyAidError::PdfiumBindingFailed(format!("{}: {}", lib.display(), e)))?
        }
        _ => Pdfium::bind_to_system_library()
            .map_err(|e| StudyAidError::PdfiumBindingFailed(e.to_string()))?,
    };
    Ok(Pdfium::new(bindings))
}

fn read_pdf(path: &Path) -> Result<String, StudyAidError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium.load_pdf_from_file(path, None).map_err(|e| {
        let detail = format!("{:?}", e);
        if detail.contains("Password") || detail.contains("password") {
            failed(path, "document is password protected")
        } else {
            failed(path, detail)
        }
    })?;

    let pages = document.pages();
    debug!("PDF loaded: {} pages", pages.len());

    let mut blocks = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| failed(path, format!("page {}: {:?}", idx + 1, e)))?;
        blocks.push(text.all());
    }
    Ok(blocks.join("\n"))
}

// ── DOCX ──────────────────────────────────────────────────────────────────

const DOCX_BODY: &str = "word/document.xml";

/// A text run, an inline tab, a break or the end of a paragraph.
///
/// `<w:tab .../>` with attributes is a tab-stop definition inside
/// `<w:tabs>`, not content, so only the bare form counts.
static DOCX_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|<w:(tab)\s*/>|<w:(?:br|cr)(?:\s[^>]*)?/>|</w:p>")
        .unwrap()
});

/// Predefined entities plus decimal and hex character references.
static XML_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(?:#x([0-9A-Fa-f]+)|#([0-9]+)|(lt|gt|quot|apos|amp));").unwrap());

fn read_docx(path: &Path) -> Result<String, StudyAidError> {
    let file = File::open(path).map_err(|e| failed(path, e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| failed(path, format!("not a DOCX archive: {}", e)))?;
    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY)
        .map_err(|e| failed(path, format!("{}: {}", DOCX_BODY, e)))?
        .read_to_string(&mut xml)
        .map_err(|e| failed(path, e))?;
    Ok(docx_xml_to_text(&xml))
}

/// Flatten WordprocessingML body XML to text, one paragraph per line.
pub fn docx_xml_to_text(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len() / 4);
    for cap in DOCX_TOKEN.captures_iter(xml) {
        if let Some(run) = cap.get(1) {
            out.push_str(&unescape_xml(run.as_str()));
        } else if cap.get(2).is_some() {
            out.push('\t');
        } else {
            out.push('\n');
        }
    }
    out.trim_end().to_string()
}

fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    XML_ENTITY
        .replace_all(s, |cap: &regex::Captures<'_>| {
            let code = match (cap.get(1), cap.get(2)) {
                (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
                (_, Some(dec)) => dec.as_str().parse::<u32>().ok(),
                _ => {
                    return match cap.get(3).map(|m| m.as_str()) {
                        Some("lt") => "<",
                        Some("gt") => ">",
                        Some("quot") => "\"",
                        Some("apos") => "'",
                        _ => "&",
                    }
                    .to_string()
                }
            };
            // Overflowing or surrogate references stay as written.
            code.and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| cap[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn named(suffix: &str, contents: &[u8]) -> NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        f.write_all(contents).unwrap();
        f.flush().unwrap();
        f
    }

    fn docx_with_body(body: &str) -> NamedTempFile {
        let f = tempfile::Builder::new().suffix(".docx").tempfile().unwrap();
        let mut zip = zip::ZipWriter::new(f.reopen().unwrap());
        zip.start_file(DOCX_BODY, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(body.as_bytes()).unwrap();
        zip.finish().unwrap();
        f
    }

    #[test]
    fn format_detection() {
        assert_eq!(DocumentFormat::from_extension("PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("md"), Some(DocumentFormat::Markdown));
        assert_eq!(DocumentFormat::from_extension("docx"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension("doc"), None);
    }

    #[test]
    fn unsupported_extension_reports_it() {
        match DocumentFormat::from_path(Path::new("notes.pptx")) {
            Err(StudyAidError::UnsupportedFormat { extension, .. }) => {
                assert_eq!(extension, ".pptx")
            }
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
        assert!(DocumentFormat::from_path(Path::new("README")).is_err());
    }

    #[tokio::test]
    async fn reads_plain_text() {
        let f = named(".txt", b"Cats are mammals.\nDogs are mammals.\n");
        let text = extract_text(f.path()).await.unwrap();
        assert_eq!(text, "Cats are mammals.\nDogs are mammals.\n");
    }

    #[tokio::test]
    async fn markdown_kept_verbatim() {
        let f = named(".md", b"# Cells\n\n* **Mitochondria** make ATP\n");
        let text = extract_text(f.path()).await.unwrap();
        assert!(text.starts_with("# Cells"));
        assert!(text.contains("**Mitochondria**"));
    }

    #[tokio::test]
    async fn whitespace_only_is_empty_document() {
        let f = named(".txt", b"  \n\t\n");
        assert!(matches!(
            extract_text(f.path()).await,
            Err(StudyAidError::EmptyDocument)
        ));
    }

    #[tokio::test]
    async fn missing_file() {
        assert!(matches!(
            extract_text("/definitely/not/here.txt").await,
            Err(StudyAidError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let f = named(".txt", b"caf\xe9 au lait");
        let text = extract_text(f.path()).await.unwrap();
        assert!(text.starts_with("caf"));
        assert!(text.ends_with("au lait"));
    }

    #[test]
    fn docx_runs_and_paragraphs() {
        let xml = r#"<w:document><w:body>
            <w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr>
              <w:r><w:t>Cats are </w:t></w:r><w:r><w:t xml:space="preserve">mammals.</w:t></w:r></w:p>
            <w:p><w:r><w:t>Tom &amp; Jerry</w:t><w:tab/><w:t>&lt;1&gt;</w:t></w:r></w:p>
            <w:tbl><w:tr><w:tc><w:p><w:r><w:t>cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
            <w:p><w:r><w:t>it&#8217;s &#x2014; ok</w:t></w:r></w:p>
            <w:p><w:r><w:t>a</w:t><w:br w:type="page"/><w:t>b</w:t><w:cr/><w:t>c</w:t></w:r></w:p>
        </w:body></w:document>"#;
        assert_eq!(
            docx_xml_to_text(xml),
            "Cats are mammals.\nTom & Jerry\t<1>\ncell\nit\u{2019}s \u{2014} ok\na\nb\nc"
        );
    }

    #[test]
    fn xml_entities_decode_in_one_pass() {
        assert_eq!(
            unescape_xml("&amp;lt; &#65;&#x42; &#xD800; &#99999999999;"),
            "&lt; AB &#xD800; &#99999999999;"
        );
        assert_eq!(unescape_xml("&quot;hi&apos;"), "\"hi'");
    }

    #[tokio::test]
    async fn reads_docx_archive() {
        let f = docx_with_body(
            "<w:document><w:body><w:p><w:r><w:t>Photosynthesis</w:t></w:r></w:p>\
             <w:p><w:r><w:t>converts light</w:t></w:r></w:p></w:body></w:document>",
        );
        let text = extract_text(f.path()).await.unwrap();
        assert_eq!(text, "Photosynthesis\nconverts light");
    }

    #[tokio::test]
    async fn corrupt_docx_is_extraction_failure() {
        let f = named(".docx", b"this is not a zip file");
        assert!(matches!(
            extract_text(f.path()).await,
            Err(StudyAidError::ExtractionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn upload_bytes_are_spooled() {
        let text = extract_from_bytes(b"Dogs are mammals.", "lecture.TXT")
            .await
            .unwrap();
        assert_eq!(text, "Dogs are mammals.");
    }

    #[tokio::test]
    async fn upload_with_unsupported_name_rejected_before_spooling() {
        assert!(matches!(
            extract_from_bytes(b"x", "slides.pptx").await,
            Err(StudyAidError::UnsupportedFormat { .. })
        ));
    }
}
