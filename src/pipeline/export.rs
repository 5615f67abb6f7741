//! Question export: lay text out on A4 pages and save it as a PDF.
//!
//! Layout is computed first by the pure [`paginate`] function, then drawn
//! with pdfium's built-in Helvetica faces, so page breaks can be tested
//! without a pdfium library present.
//!
//! The format is deliberately plain: a bold title on the first page, then
//! 11 pt body lines 15 pt apart, wrapped at [`WRAP_COLUMNS`] characters.
//! A line that would fall below the bottom margin starts a new page.

use crate::error::StudyAidError;
use crate::pipeline::extract::bind_pdfium;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, warn};

/// A4 height in PDF points.
const PAGE_HEIGHT: f32 = 841.89;
const MARGIN: f32 = 50.0;
const TITLE_SIZE: f32 = 16.0;
const BODY_SIZE: f32 = 11.0;
const LINE_HEIGHT: f32 = 15.0;
/// Gap between the title baseline and the first body line.
const TITLE_GAP: f32 = 50.0;

/// Body lines are wrapped at this many characters.
pub const WRAP_COLUMNS: usize = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Title,
    Body,
}

/// One line of text at its baseline position on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub x: f32,
    pub y: f32,
    pub style: LineStyle,
    pub text: String,
}

/// Word-wrap `text` at `columns` characters.
///
/// Existing line breaks are kept, blank lines included. A word longer than
/// `columns` is split across lines.
pub fn wrap_lines(text: &str, columns: usize) -> Vec<String> {
    let columns = columns.max(1);
    let mut out = Vec::new();

    for raw in text.lines() {
        let mut line = String::new();
        let mut line_len = 0usize;

        for word in raw.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > columns {
                if line_len > 0 {
                    out.push(std::mem::take(&mut line));
                    line_len = 0;
                }
                let rest = word.split_off(columns);
                out.push(word.into_iter().collect());
                word = rest;
            }

            let needed = if line_len == 0 { word.len() } else { line_len + 1 + word.len() };
            if needed > columns {
                out.push(std::mem::take(&mut line));
                line_len = 0;
            }
            if line_len > 0 {
                line.push(' ');
                line_len += 1;
            }
            line.extend(word.iter());
            line_len += word.len();
        }
        out.push(line);
    }
    out
}

/// Assign every wrapped line of `text` a page and baseline.
///
/// The title sits at the top of the first page; body text starts below it
/// and continues at the top margin of each following page.
pub fn paginate(title: &str, text: &str) -> Vec<Vec<PlacedLine>> {
    let mut pages = Vec::new();
    let mut page = Vec::new();
    let mut y = PAGE_HEIGHT - MARGIN;

    if !title.trim().is_empty() {
        page.push(PlacedLine {
            x: MARGIN,
            y,
            style: LineStyle::Title,
            text: title.trim().to_string(),
        });
        y -= TITLE_GAP;
    }

    for line in wrap_lines(text.trim_end(), WRAP_COLUMNS) {
        if y < MARGIN {
            pages.push(std::mem::take(&mut page));
            y = PAGE_HEIGHT - MARGIN;
        }
        if !line.is_empty() {
            page.push(PlacedLine {
                x: MARGIN,
                y,
                style: LineStyle::Body,
                text: line,
            });
        }
        y -= LINE_HEIGHT;
    }
    pages.push(page);
    pages
}

/// Render `text` under `title` to PDF bytes.
///
/// Runs on the blocking pool; pdfium calls are synchronous.
pub async fn render_questions_pdf(text: &str, title: &str) -> Result<Vec<u8>, StudyAidError> {
    let pages = paginate(title, text);
    tokio::task::spawn_blocking(move || render_blocking(&pages))
        .await
        .map_err(|e| StudyAidError::Internal(format!("Export task panicked: {}", e)))?
}

/// Render to `path`, returning the number of bytes written.
///
/// Atomic: the PDF is written to a sibling temp file and renamed into place.
pub async fn export_questions_to_file(
    text: &str,
    title: &str,
    path: impl AsRef<Path>,
) -> Result<usize, StudyAidError> {
    let bytes = render_questions_pdf(text, title).await?;
    write_atomically(path.as_ref(), &bytes).await?;
    Ok(bytes.len())
}

/// Write via `<path>.pdf.tmp` and rename; the temp file never outlives a failure.
async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StudyAidError> {
    let write_err = |e| StudyAidError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let tmp_path = path.with_extension("pdf.tmp");
    let written = match tokio::fs::write(&tmp_path, bytes).await {
        Ok(()) => tokio::fs::rename(&tmp_path, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", tmp_path.display(), cleanup);
            }
        }
        return Err(write_err(e));
    }
    Ok(())
}

fn render_blocking(pages: &[Vec<PlacedLine>]) -> Result<Vec<u8>, StudyAidError> {
    let pdfium = bind_pdfium()?;
    let export_err = |e: PdfiumError| StudyAidError::ExportFailed(format!("{:?}", e));

    let mut document = pdfium.create_new_pdf().map_err(export_err)?;
    let title_font = document.fonts_mut().helvetica_bold();
    let body_font = document.fonts_mut().helvetica();

    for lines in pages {
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4())
            .map_err(export_err)?;
        for line in lines {
            let (font, size) = match line.style {
                LineStyle::Title => (title_font, TITLE_SIZE),
                LineStyle::Body => (body_font, BODY_SIZE),
            };
            page.objects_mut()
                .create_text_object(
                    PdfPoints::new(line.x),
                    PdfPoints::new(line.y),
                    &line.text,
                    font,
                    PdfPoints::new(size),
                )
                .map_err(export_err)?;
        }
    }

    let bytes = document.save_to_bytes().map_err(export_err)?;
    debug!("Exported {} page(s), {} bytes", pages.len(), bytes.len());
    Ok(bytes)
}
