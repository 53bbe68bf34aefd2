//! # Content Keys
//!
//! Every item the connector hands downstream is addressed by a key. Two
//! spellings exist and both are built here so they never drift apart:
//!
//! ```text
//! diff key       {space}/{page}             submitted to file-diff, scoped by
//!                {space}/{page}_{file}      partialKey = tenant name
//!
//! ingestion key  {tenant}/{diff key}        stored on the content item,
//!                                           used for lookup and deletion
//! ```
//!
//! The diff endpoint answers in diff keys; [`ingestion_key`] turns them into
//! the keys content was actually registered under.

use crate::EXTERNAL_ID_PREFIX;

/// Separator between a page id and a linked file name.
pub const FILE_SEPARATOR: char = '_';

/// Diff key of a page.
pub fn page_diff_key(space_key: &str, page_id: &str) -> String {
    format!("{}/{}", space_key, page_id)
}

/// Diff key of a file linked from a page.
pub fn file_diff_key(space_key: &str, page_id: &str, file_name: &str) -> String {
    format!("{}/{}{}{}", space_key, page_id, FILE_SEPARATOR, file_name)
}

/// Ingestion key for a diff key.
pub fn ingestion_key(tenant: &str, diff_key: &str) -> String {
    format!("{}/{}", tenant, diff_key)
}

/// External id stored on the scope of a space.
pub fn space_external_id(tenant: &str, space_key: &str) -> String {
    format!("{}:{}:{}", EXTERNAL_ID_PREFIX, tenant, space_key)
}

/// Recovers the owning page id from a diff key.
///
/// Takes everything after the first `/` and cuts it at the first `_`. Keys
/// without a `/` are treated as bare page ids.
pub fn page_id_from_key(key: &str) -> &str {
    let after_slash = match key.find('/') {
        Some(idx) => &key[idx + 1..],
        None => key,
    };
    match after_slash.find(FILE_SEPARATOR) {
        Some(idx) => &after_slash[..idx],
        None => after_slash,
    }
}

/// Page ids of a batch of diff keys, deduplicated in first-seen order.
pub fn page_ids_from_keys<S: AsRef<str>>(keys: &[S]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut ids = Vec::new();
    for key in keys {
        let id = page_id_from_key(key.as_ref());
        if seen.insert(id.to_string()) {
            ids.push(id.to_string());
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        assert_eq!(page_diff_key("ENG", "123"), "ENG/123");
        assert_eq!(file_diff_key("ENG", "123", "design.pdf"), "ENG/123_design.pdf");
        assert_eq!(ingestion_key("acme", "ENG/123"), "acme/ENG/123");
        assert_eq!(space_external_id("acme", "ENG"), "confc:acme:ENG");
    }

    #[test]
    fn test_page_id_from_key() {
        assert_eq!(page_id_from_key("ENG/123"), "123");
        assert_eq!(page_id_from_key("ENG/123_report_v2.pdf"), "123");
        assert_eq!(page_id_from_key("456"), "456");
    }

    #[test]
    fn test_page_ids_from_keys_collapses_files() {
        let keys = vec![
            "ENG/1",
            "ENG/1_a.pdf",
            "ENG/2_b.docx",
            "OPS/3",
            "ENG/2",
        ];
        assert_eq!(page_ids_from_keys(&keys), vec!["1", "2", "3"]);
    }
}
