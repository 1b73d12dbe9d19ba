//! Bounded renderings of accumulated text
//!
//! All lengths are in characters. The accumulated text itself is never
//! truncated; only what gets shown is.

use crate::constants::aggregator::{FULL_OUTPUT_LABEL, STILL_PROCESSING_MARKER, TRUNCATED_MARKER};

/// Display bounds shared by both projections
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionLimits {
    pub cap: usize,
    pub newline_retain_ratio: f64,
}

impl ProjectionLimits {
    /// Number of leading characters to keep, or `None` when the text fits
    ///
    /// Prefers cutting just after the last newline before the cap when that
    /// keeps at least `newline_retain_ratio` of the cap.
    pub fn cut_point(&self, text: &str) -> Option<usize> {
        if text.chars().count() <= self.cap {
            return None;
        }

        let min_keep = (self.cap as f64 * self.newline_retain_ratio).ceil() as usize;
        let last_newline = text
            .chars()
            .take(self.cap)
            .enumerate()
            .filter(|(_, c)| *c == '\n')
            .map(|(i, _)| i)
            .last();

        match last_newline {
            Some(i) if i >= min_keep => Some(i + 1),
            _ => Some(self.cap),
        }
    }

    fn head<'a>(&self, text: &'a str) -> Option<&'a str> {
        let cut = self.cut_point(text)?;
        let end = text
            .char_indices()
            .nth(cut)
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        Some(&text[..end])
    }

    /// In-progress rendering: the head plus a "still processing" marker
    pub fn display(&self, text: &str) -> String {
        match self.head(text) {
            Some(head) => format!("{}{}", head, STILL_PROCESSING_MARKER),
            None => text.to_string(),
        }
    }

    /// Final rendering with a permanent link to the full output
    pub fn final_text(&self, text: &str, link: Option<&str>) -> String {
        let mut rendered = match self.head(text) {
            Some(head) => format!("{}{}", head, TRUNCATED_MARKER),
            None => text.to_string(),
        };
        if let Some(url) = link {
            rendered.push_str("\n\n");
            rendered.push_str(&link_markup(url));
        }
        rendered
    }
}

/// `<url|View full output>`
pub fn link_markup(url: &str) -> String {
    format!("<{}|{}>", url, FULL_OUTPUT_LABEL)
}

/// Public page of a plan
pub fn plan_url(base: &str, plan_id: &str) -> String {
    format!("{}/plans/{}", base.trim_end_matches('/'), plan_id)
}

/// Notice posted when a turn completes without any text
pub fn completion_notice(url: &str) -> String {
    format!("Plan complete. {}", link_markup(url))
}
