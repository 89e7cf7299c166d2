//! Candidate filtering
//!
//! Both filters are pure: they inspect a [`TaskItem`] and decide whether it
//! qualifies for claiming. Keyword matching applies to every task kind; the
//! dispatch window is only consulted for production tasks.

use chrono::NaiveDateTime;

use crate::models::TaskItem;

/// Timestamp layout used by `dispatchTime` and window bounds
pub const DISPATCH_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a dispatch timestamp, returning `None` for anything malformed
pub fn parse_dispatch_time(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), DISPATCH_TIME_FORMAT).ok()
}

// ============================================================================
// Keyword Filter
// ============================================================================

/// Case-insensitive include/exclude substring filter over an item's brief
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl KeywordFilter {
    /// Build a filter; keywords are lowercased and empty entries dropped
    ///
    /// Surrounding whitespace is significant: `" 9"` only matches a `9`
    /// preceded by a space.
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self {
            include: normalize(include),
            exclude: normalize(exclude),
        }
    }

    pub fn include(&self) -> &[String] {
        &self.include
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    /// Whether the filter would accept every brief
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Decide whether a brief qualifies
    ///
    /// Exclusion wins over inclusion. With no include keywords every brief
    /// that survives exclusion passes.
    ///
    /// # Examples
    ///
    /// ```
    /// use autoclaim::claimer::filter::KeywordFilter;
    ///
    /// let filter = KeywordFilter::new(vec!["algebra".into()], vec![]);
    /// assert!(filter.matches("Algebra review for grade 9"));
    /// assert!(!filter.matches("Geometry drill"));
    /// ```
    pub fn matches(&self, brief: &str) -> bool {
        let brief = brief.to_lowercase();

        if self.exclude.iter().any(|kw| brief.contains(kw.as_str())) {
            return false;
        }

        self.include.is_empty() || self.include.iter().any(|kw| brief.contains(kw.as_str()))
    }

    pub fn accepts(&self, item: &TaskItem) -> bool {
        self.matches(&item.brief)
    }
}

fn normalize(keywords: Vec<String>) -> Vec<String> {
    keywords
        .into_iter()
        .map(|kw| kw.to_lowercase())
        .filter(|kw| !kw.is_empty())
        .collect()
}

// ============================================================================
// Dispatch Window
// ============================================================================

/// Inclusive dispatch-time window
///
/// Bounds are kept as given; a bound that does not parse is skipped at
/// evaluation time, so a window with two malformed bounds only rejects items
/// whose own timestamp is missing or malformed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchWindow {
    start: Option<String>,
    end: Option<String>,
}

impl DispatchWindow {
    /// Build a window; empty strings mean "no bound"
    pub fn new(start: &str, end: &str) -> Self {
        let bound = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };

        Self {
            start: bound(start),
            end: bound(end),
        }
    }

    pub fn start(&self) -> Option<&str> {
        self.start.as_deref()
    }

    pub fn end(&self) -> Option<&str> {
        self.end.as_deref()
    }

    /// No bounds configured
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Decide whether a dispatch timestamp falls inside the window
    pub fn accepts_time(&self, dispatch_time: &str) -> bool {
        if self.is_unbounded() {
            return true;
        }

        if dispatch_time.trim().is_empty() {
            return false;
        }

        let Some(at) = parse_dispatch_time(dispatch_time) else {
            return false;
        };

        if let Some(start) = self.start.as_deref().and_then(parse_dispatch_time) {
            if at < start {
                return false;
            }
        }

        if let Some(end) = self.end.as_deref().and_then(parse_dispatch_time) {
            if at > end {
                return false;
            }
        }

        true
    }

    pub fn accepts(&self, item: &TaskItem) -> bool {
        self.accepts_time(&item.dispatch_time)
    }
}
