//! What a run hands back to its caller.

use serde::{Deserialize, Serialize};

/// Result of one extraction run.
///
/// `records_extracted == metrics_inserted + metrics_dropped` always holds.
/// "Inserted" counts upserts, so a re-run over the same document reports the
/// same number even though no new rows appear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub document_id: String,
    pub company_profile_id: String,
    /// Metrics written (inserted or overwritten).
    pub metrics_inserted: usize,
    /// Records skipped because their value could not be resolved.
    pub metrics_dropped: usize,
    /// Records the model returned for the financial section.
    pub records_extracted: usize,
    /// 1-based page where the financial section starts.
    pub section_start_page: usize,
    /// Whether the "financial highlights" heading was found.
    pub section_matched: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialises_as_flat_json() {
        let s = RunSummary {
            document_id: "d".into(),
            company_profile_id: "p".into(),
            metrics_inserted: 3,
            metrics_dropped: 1,
            records_extracted: 4,
            section_start_page: 5,
            section_matched: true,
        };
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["metrics_inserted"], 3);
        assert_eq!(v["section_start_page"], 5);
        assert_eq!(v["section_matched"], true);
    }
}
