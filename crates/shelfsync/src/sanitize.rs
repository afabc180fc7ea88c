//! Filename cleaning for converted books, plus helpers that keep span
//! attributes free of full filesystem paths.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// Extension every converted book is uploaded with.
pub const KEPUB_EXTENSION: &str = ".kepub.epub";

const EPUB_EXTENSION: &str = ".epub";

static RE_UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).unwrap());

/// Produces the destination filename for a converted book.
///
/// Characters that are unsafe in filenames (`< > : " / \ | ? *` and ASCII
/// control characters) become `_`. A trailing `.epub` (any case) is replaced
/// with `.kepub.epub`; any other name simply gets `.kepub.epub` appended, so
/// `book.txt` becomes `book.txt.kepub.epub`.
pub fn clean_filename(filename: &str) -> String {
    let clean = RE_UNSAFE_CHARS.replace_all(filename, "_");

    let stem = match clean.len().checked_sub(EPUB_EXTENSION.len()) {
        Some(split)
            if clean.is_char_boundary(split)
                && clean[split..].eq_ignore_ascii_case(EPUB_EXTENSION) =>
        {
            &clean[..split]
        }
        _ => &clean[..],
    };

    format!("{stem}{KEPUB_EXTENSION}")
}

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields: reveals the file name, not the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}
