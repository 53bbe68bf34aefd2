//! Trigger label handling.

/// Returns the labels of a page with both trigger labels removed.
///
/// ## Example
/// ```rust
/// use confluence_core::labels::extract_labels;
///
/// let labels = vec!["ai-ingest".to_string(), "hr".to_string()];
/// assert_eq!(extract_labels(&labels, "ai-ingest", "ai-ingest-all"), vec!["hr"]);
/// ```
pub fn extract_labels(labels: &[String], single_label: &str, all_label: &str) -> Vec<String> {
    labels
        .iter()
        .filter(|l| l.as_str() != single_label && l.as_str() != all_label)
        .cloned()
        .collect()
}

/// Returns true if `labels` contains `label`.
pub fn has_label(labels: &[String], label: &str) -> bool {
    labels.iter().any(|l| l == label)
}
