//! Locate the pages that hold the financial-highlights table.
//!
//! Financial tables are usually followed by continuation pages, so a match
//! pulls in the next two pages as well. Reports without the literal heading
//! still tend to carry their numbers near the end, hence the tail fallback.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Pages taken starting at the matched heading (the heading page included).
const SECTION_WINDOW: usize = 3;
/// Pages taken from the end of the document when no heading matches.
const TAIL_PAGES: usize = 2;
const PAGE_JOIN: &str = "\n\n";

static RE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)financial\s+highlights").unwrap());

/// Candidate text for the financial extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub text: String,
    /// 1-based page number of the first page included.
    pub start_page: usize,
    /// `true` when the heading was found, `false` for the tail fallback.
    pub matched: bool,
}

impl Section {
    /// First line of the section, where the table header usually sits.
    pub fn header_line(&self) -> &str {
        self.text.lines().next().unwrap_or("")
    }
}

/// Find the financial-highlights section in page-ordered text.
pub fn locate_financial_section(pages: &[String]) -> Section {
    if let Some(idx) = pages.iter().position(|p| RE_HEADING.is_match(p)) {
        let end = (idx + SECTION_WINDOW).min(pages.len());
        return Section {
            text: join_pages(&pages[idx..end]),
            start_page: idx + 1,
            matched: true,
        };
    }

    let start = pages.len().saturating_sub(TAIL_PAGES);
    Section {
        text: join_pages(&pages[start..]),
        start_page: start + 1,
        matched: false,
    }
}

/// Text handed to the company-profile extraction: the first `n` pages.
pub fn company_text(pages: &[String], n: usize) -> String {
    join_pages(&pages[..n.min(pages.len())])
}

fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .filter(|p| !p.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(PAGE_JOIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_heading_takes_three_pages() {
        let p = pages(&["cover", "intro", "FINANCIAL  Highlights (in KRW bn)", "t2", "t3", "t4"]);
        let s = locate_financial_section(&p);
        assert!(s.matched);
        assert_eq!(s.start_page, 3);
        assert_eq!(s.text, "FINANCIAL  Highlights (in KRW bn)\n\nt2\n\nt3");
        assert_eq!(s.header_line(), "FINANCIAL  Highlights (in KRW bn)");
    }

    #[test]
    fn test_heading_near_end_is_bounded() {
        let p = pages(&["cover", "a", "Financial highlights"]);
        let s = locate_financial_section(&p);
        assert_eq!(s.start_page, 3);
        assert_eq!(s.text, "Financial highlights");
    }

    #[test]
    fn test_first_match_wins() {
        let p = pages(&["financial highlights one", "financial highlights two"]);
        assert_eq!(locate_financial_section(&p).start_page, 1);
    }

    #[test]
    fn test_fallback_to_tail() {
        let p = pages(&["a", "b", "c", "d"]);
        let s = locate_financial_section(&p);
        assert!(!s.matched);
        assert_eq!(s.start_page, 3);
        assert_eq!(s.text, "c\n\nd");
    }

    #[test]
    fn test_fallback_short_documents() {
        let one = locate_financial_section(&pages(&["only"]));
        assert_eq!((one.start_page, one.text.as_str()), (1, "only"));

        let none = locate_financial_section(&[]);
        assert_eq!((none.start_page, none.text.as_str()), (1, ""));
        assert_eq!(none.header_line(), "");
    }

    #[test]
    fn test_empty_pages_are_skipped_in_join() {
        let p = pages(&["Financial Highlights", "", "t3"]);
        assert_eq!(locate_financial_section(&p).text, "Financial Highlights\n\nt3");
    }

    #[test]
    fn test_company_text() {
        let p = pages(&["p1", "p2", "p3"]);
        assert_eq!(company_text(&p, 2), "p1\n\np2");
        assert_eq!(company_text(&p, 10), "p1\n\np2\n\np3");
        assert_eq!(company_text(&[], 2), "");
    }
}
