//! # Linked Files
//!
//! Pages reference attachments and other binaries through plain `<a href>`
//! links in their storage body. When file ingestion is enabled each such link
//! with an allow-listed extension becomes its own content item.
//!
//! ```text
//! <a href="/wiki/download/attachments/42/Q3%20plan.pdf?version=2#p4">
//!          │                                   │          │       │
//!          │ resolved against base_url          │          │       └ dropped
//!          │                                   │          └ kept in the URL
//!          │                                   └ extension match (pdf)
//!          ▼
//! https://acme.atlassian.net/wiki/download/attachments/42/Q3%20plan.pdf?version=2
//! ```

use scraper::{Html, Selector};
use url::Url;

/// Extracts the absolute URLs of allow-listed files linked from `html`.
///
/// Relative links resolve against `base_url`. The query string is kept on the
/// returned URL but ignored for the extension match. Results are unique and
/// keep document order. An empty allow-list matches nothing.
pub fn extract_file_urls(html: &str, allowed_extensions: &[String], base_url: &str) -> Vec<String> {
    if allowed_extensions.is_empty() {
        return Vec::new();
    }
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let allowed: Vec<String> = allowed_extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    let document = Html::parse_fragment(html);
    let mut urls: Vec<String> = Vec::new();

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            continue;
        }

        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        resolved.set_fragment(None);

        let matches = path_extension(resolved.path())
            .map(|ext| allowed.iter().any(|a| *a == ext))
            .unwrap_or(false);
        if !matches {
            continue;
        }

        let url = resolved.to_string();
        if !urls.contains(&url) {
            urls.push(url);
        }
    }

    urls
}

/// Decoded last path segment of a file URL, without query or fragment.
pub fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()?
        .to_string();
    match urlencoding::decode(&segment) {
        Ok(decoded) => Some(decoded.into_owned()),
        Err(_) => Some(segment),
    }
}

/// MIME type for a file name, by extension.
pub fn mime_type_for(file_name: &str) -> &'static str {
    let ext = path_extension(file_name).unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Lowercased extension of the last segment of a path.
fn path_extension(path: &str) -> Option<String> {
    let last = path.rsplit('/').next()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}
