//! EPUB to kepub repackaging.
//!
//! Rewrites the container with the `mimetype` entry first and stored, and
//! wraps every content document's body in the column divs Kobo readers
//! expect. Span-level sentence injection is not performed.

use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{ConvertError, Converter};

pub const EPUB_MIMETYPE: &str = "application/epub+zip";

const MIMETYPE_ENTRY: &str = "mimetype";
const WRAPPER_OPEN: &str = r#"<div id="book-columns"><div id="book-inner">"#;
const WRAPPER_CLOSE: &str = "</div></div>";

/// Upper bound on buffer preallocation from an entry's declared size.
const MAX_PREALLOC: u64 = 16 << 20;

static RE_BODY_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<body\b[^>]*>").unwrap());
static RE_BODY_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</body\s*>").unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct EpubConverter;

impl EpubConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Converter for EpubConverter {
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        on_progress: &mut dyn FnMut(u8),
    ) -> Result<(), ConvertError> {
        let file = File::open(input).map_err(|e| ConvertError::ReadInput {
            path: input.to_path_buf(),
            source: e,
        })?;
        let mut archive =
            ZipArchive::new(file).map_err(|e| ConvertError::InvalidArchive(e.to_string()))?;
        check_mimetype(&mut archive)?;
        on_progress(10);

        let out = File::create(output).map_err(|e| ConvertError::WriteOutput {
            path: output.to_path_buf(),
            source: e,
        })?;

        if let Err(e) = repackage(&mut archive, out, on_progress) {
            if let Err(rm) = std::fs::remove_file(output) {
                log::warn!("Failed to remove partial output: {}", rm);
            }
            return Err(e);
        }

        on_progress(100);
        Ok(())
    }
}

fn check_mimetype<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<(), ConvertError> {
    let mut entry = match archive.by_name(MIMETYPE_ENTRY) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Err(ConvertError::MissingMimetype),
        Err(e) => return Err(e.into()),
    };
    let mut mimetype = String::new();
    entry.read_to_string(&mut mimetype)?;

    let mimetype = mimetype.trim();
    if mimetype != EPUB_MIMETYPE {
        return Err(ConvertError::WrongMimetype(mimetype.to_string()));
    }
    Ok(())
}

fn repackage<R: Read + Seek, W: Write + Seek>(
    archive: &mut ZipArchive<R>,
    out: W,
    on_progress: &mut dyn FnMut(u8),
) -> Result<(), ConvertError> {
    let mut writer = ZipWriter::new(out);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    writer.start_file(MIMETYPE_ENTRY, stored)?;
    writer.write_all(EPUB_MIMETYPE.as_bytes())?;

    let total = archive.len();
    for index in 0..total {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();

        if name == MIMETYPE_ENTRY {
            // already written
        } else if entry.is_dir() {
            writer.add_directory(name.as_str(), deflated)?;
        } else {
            let mut bytes = Vec::with_capacity(prealloc_len(entry.size()));
            entry.read_to_end(&mut bytes)?;
            if is_content_document(&name) {
                bytes = wrap_content(bytes);
            }
            writer.start_file(name.as_str(), deflated)?;
            writer.write_all(&bytes)?;
        }

        on_progress(entry_progress(index + 1, total));
    }

    writer.finish()?;
    Ok(())
}

/// Declared sizes come from the archive header and are not trusted.
fn prealloc_len(declared: u64) -> usize {
    usize::try_from(declared.min(MAX_PREALLOC)).unwrap_or(0)
}

/// Maps entries processed onto (10, 95].
fn entry_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 95;
    }
    (10 + done * 85 / total).min(95) as u8
}

fn is_content_document(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".xhtml") || lower.ends_with(".html") || lower.ends_with(".htm")
}

fn wrap_content(bytes: Vec<u8>) -> Vec<u8> {
    match String::from_utf8(bytes) {
        Ok(text) => match wrap_body(&text) {
            Some(wrapped) => wrapped.into_bytes(),
            None => text.into_bytes(),
        },
        Err(e) => e.into_bytes(),
    }
}

/// Wraps the contents of `<body>` in the column divs. Returns `None` when the
/// document has no body or is already wrapped.
pub fn wrap_body(html: &str) -> Option<String> {
    if html.contains(r#"id="book-columns""#) {
        return None;
    }
    let open = RE_BODY_OPEN.find(html)?;
    let close = RE_BODY_CLOSE.find_iter(html).last()?;
    if close.start() < open.end() {
        return None;
    }

    let mut wrapped = String::with_capacity(html.len() + WRAPPER_OPEN.len() + WRAPPER_CLOSE.len());
    wrapped.push_str(&html[..open.end()]);
    wrapped.push_str(WRAPPER_OPEN);
    wrapped.push_str(&html[open.end()..close.start()]);
    wrapped.push_str(WRAPPER_CLOSE);
    wrapped.push_str(&html[close.start()..]);
    Some(wrapped)
}
