//! Fragment location with tiered matching and confidence scoring.
//!
//! Strategies are tried in cost order with early exit: exact (byte-for-byte,
//! confidence 1.0), whitespace-normalized (fixed confidence below 1.0), then
//! similarity scan (length-normalized Levenshtein ratio over every window of
//! equal line count; the deliberate slow path). The line hint seeds the scan
//! so a fragment near its hinted position is found without walking the whole
//! file from the top.

use std::cmp::Ordering;

/// Confidence assigned to a whitespace-normalized match.
pub const NORMALIZED_CONFIDENCE: f64 = 0.9;

/// Matches below this confidence, or carrying issues, require confirmation
/// before being applied silently.
pub const AUTO_APPLY_CONFIDENCE: f64 = 0.9;

/// Minimum similarity ratio for a window to count as a candidate.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Candidates below this floor are discarded during best-match selection.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

/// Which strategy produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Exact,
    Normalized,
    Similarity,
}

/// A located occurrence of a fragment, with diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    /// First matched line (zero-based).
    pub start_line: usize,
    /// Last matched line (zero-based, inclusive).
    pub end_line: usize,
    /// Confidence in [0, 1]. Exact = 1.0, Normalized = fixed, Similarity = ratio.
    pub confidence: f64,
    pub strategy: MatchStrategy,
    /// The actual file content at the matched window.
    pub actual: String,
    /// Human-readable notes about how the match deviates from the request.
    pub issues: Vec<String>,
}

impl MatchCandidate {
    /// True when this match should not be applied without surfacing a
    /// warning to the caller first.
    pub fn requires_confirmation(&self) -> bool {
        self.confidence < AUTO_APPLY_CONFIDENCE || !self.issues.is_empty()
    }
}

/// Tunable thresholds for the matcher. All defaults are the named constants
/// above; callers adjust them per call site rather than patching literals.
#[derive(Debug, Clone, Copy)]
pub struct MatchOptions {
    pub similarity_threshold: f64,
    pub min_confidence: f64,
    /// Fold ASCII case during normalized comparison.
    pub fold_case: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            fold_case: false,
        }
    }
}

/// Locates fragments inside a line buffer.
#[derive(Debug, Clone, Default)]
pub struct ContentMatcher {
    options: MatchOptions,
}

impl ContentMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: MatchOptions) -> Self {
        Self { options }
    }

    /// Find the best match for `fragment`, or `None` when nothing clears the
    /// confidence floor. Ties on confidence break toward the earliest line.
    pub fn locate(
        &self,
        lines: &[String],
        fragment: &str,
        hint: Option<usize>,
    ) -> Option<MatchCandidate> {
        self.candidates(lines, fragment, hint)
            .into_iter()
            .find(|c| c.confidence >= self.options.min_confidence)
    }

    /// All candidates the cascade produces, ranked best-first. Exact and
    /// normalized matches return a single candidate (early exit); only the
    /// similarity scan can yield several.
    pub fn candidates(
        &self,
        lines: &[String],
        fragment: &str,
        hint: Option<usize>,
    ) -> Vec<MatchCandidate> {
        let target: Vec<&str> = fragment.lines().collect();
        if target.is_empty() || target.len() > lines.len() {
            return Vec::new();
        }

        if let Some(candidate) = self.find_exact(lines, &target, hint) {
            return vec![candidate];
        }
        if let Some(candidate) = self.find_normalized(lines, &target, hint) {
            return vec![candidate];
        }
        self.find_similar(lines, fragment, target.len())
    }

    /// Byte-for-byte contiguous match. First hit wins; the scan starts at the
    /// hinted window and wraps to the top, so a good hint terminates early.
    fn find_exact(
        &self,
        lines: &[String],
        target: &[&str],
        hint: Option<usize>,
    ) -> Option<MatchCandidate> {
        let start = scan_positions(lines.len(), target.len(), hint).find(|&pos| {
            target
                .iter()
                .enumerate()
                .all(|(offset, expected)| lines[pos + offset] == *expected)
        })?;

        Some(MatchCandidate {
            start_line: start,
            end_line: start + target.len() - 1,
            confidence: 1.0,
            strategy: MatchStrategy::Exact,
            actual: lines[start..start + target.len()].join("\n"),
            issues: Vec::new(),
        })
    }

    /// Whitespace-insensitive match: per-line trim plus indentation and
    /// interior-run collapse, optional case folding.
    fn find_normalized(
        &self,
        lines: &[String],
        target: &[&str],
        hint: Option<usize>,
    ) -> Option<MatchCandidate> {
        let fold = self.options.fold_case;
        let normalized_target: Vec<String> =
            target.iter().map(|l| normalize_line(l, fold)).collect();

        let start = scan_positions(lines.len(), target.len(), hint).find(|&pos| {
            normalized_target
                .iter()
                .enumerate()
                .all(|(offset, expected)| normalize_line(&lines[pos + offset], fold) == *expected)
        })?;

        let actual = lines[start..start + target.len()].join("\n");
        let mut issues = Vec::new();
        if actual != target.join("\n") {
            issues.push("content differs in whitespace/formatting".to_string());
        }

        Some(MatchCandidate {
            start_line: start,
            end_line: start + target.len() - 1,
            confidence: NORMALIZED_CONFIDENCE,
            strategy: MatchStrategy::Normalized,
            actual,
            issues,
        })
    }

    /// Similarity scan over every window of equal line count. O(windows ×
    /// fragment length); only reached when the cheap strategies fail.
    fn find_similar(
        &self,
        lines: &[String],
        fragment: &str,
        window_len: usize,
    ) -> Vec<MatchCandidate> {
        let mut candidates = Vec::new();

        for pos in 0..=(lines.len() - window_len) {
            let window = lines[pos..pos + window_len].join("\n");
            let ratio = strsim::normalized_levenshtein(fragment, &window);
            if ratio >= self.options.similarity_threshold {
                candidates.push(MatchCandidate {
                    start_line: pos,
                    end_line: pos + window_len - 1,
                    confidence: ratio,
                    strategy: MatchStrategy::Similarity,
                    actual: window,
                    issues: vec![format!(
                        "content differs from requested fragment (similarity {ratio:.2})"
                    )],
                });
            }
        }

        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then(a.start_line.cmp(&b.start_line))
        });
        candidates
    }
}

/// Window start positions, beginning at the hinted position and wrapping to
/// the top of the file.
fn scan_positions(
    line_count: usize,
    window_len: usize,
    hint: Option<usize>,
) -> impl Iterator<Item = usize> {
    let last = line_count - window_len;
    let first = hint.unwrap_or(0).min(last);
    (first..=last).chain(0..first)
}

/// Collapse a line to its whitespace-canonical form: trim both ends and fold
/// every interior whitespace run (tabs included) to a single space.
fn normalize_line(line: &str, fold_case: bool) -> String {
    let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
    if fold_case {
        collapsed.to_ascii_lowercase()
    } else {
        collapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn buffer(content: &str) -> Vec<String> {
        content.lines().map(String::from).collect()
    }

    #[test]
    fn exact_match_wins_with_full_confidence() {
        let lines = buffer("function t(){\n  return 42;\n}");
        let matcher = ContentMatcher::new();
        let m = matcher.locate(&lines, "  return 42;", None).unwrap();

        assert_eq!(m.strategy, MatchStrategy::Exact);
        assert_eq!(m.confidence, 1.0);
        assert_eq!((m.start_line, m.end_line), (1, 1));
        assert!(m.issues.is_empty());
        assert!(!m.requires_confirmation());
    }

    #[test]
    fn exact_multi_line_match() {
        let lines = buffer("a\nb\nc\nd");
        let matcher = ContentMatcher::new();
        let m = matcher.locate(&lines, "b\nc", None).unwrap();
        assert_eq!((m.start_line, m.end_line), (1, 2));
        assert_eq!(m.actual, "b\nc");
    }

    #[test]
    fn hint_selects_later_duplicate() {
        let lines = buffer("x = 1\nfiller\nfiller\nx = 1\ntail");
        let matcher = ContentMatcher::new();

        let near_top = matcher.locate(&lines, "x = 1", Some(0)).unwrap();
        assert_eq!(near_top.start_line, 0);

        let near_bottom = matcher.locate(&lines, "x = 1", Some(3)).unwrap();
        assert_eq!(near_bottom.start_line, 3);
    }

    #[test]
    fn hint_wraps_back_to_top() {
        let lines = buffer("needle\nother\nother");
        let matcher = ContentMatcher::new();
        let m = matcher.locate(&lines, "needle", Some(2)).unwrap();
        assert_eq!(m.start_line, 0);
        assert_eq!(m.strategy, MatchStrategy::Exact);
    }

    #[test]
    fn normalized_match_flags_whitespace_difference() {
        let lines = buffer("function t(){\n\treturn 42;\n}");
        let matcher = ContentMatcher::new();
        let m = matcher.locate(&lines, "  return 42;", None).unwrap();

        assert_eq!(m.strategy, MatchStrategy::Normalized);
        assert_eq!(m.confidence, NORMALIZED_CONFIDENCE);
        assert_eq!(m.actual, "\treturn 42;");
        assert!(m.issues[0].contains("whitespace"));
        assert!(m.requires_confirmation());
    }

    #[test]
    fn similarity_match_for_drifted_content() {
        let lines = buffer("fn compute() {\n    let total = sum + 1;\n}");
        let matcher = ContentMatcher::new();
        let m = matcher
            .locate(&lines, "    let total = sum + 2;", None)
            .unwrap();

        assert_eq!(m.strategy, MatchStrategy::Similarity);
        assert!(m.confidence >= DEFAULT_SIMILARITY_THRESHOLD);
        assert!(m.confidence < 1.0);
        assert_eq!(m.start_line, 1);
        assert!(m.requires_confirmation());
    }

    #[test]
    fn confidence_ordering_across_strategies() {
        let matcher = ContentMatcher::new();

        let exact = matcher
            .locate(&buffer("let x = 1;"), "let x = 1;", None)
            .unwrap();
        let normalized = matcher
            .locate(&buffer("let  x  = 1;"), "let x = 1;", None)
            .unwrap();
        let similar = matcher
            .locate(&buffer("let x = 199;"), "let x = 1;", None)
            .unwrap();

        assert!(exact.confidence > normalized.confidence);
        assert!(normalized.confidence > similar.confidence);
    }

    #[test]
    fn similarity_ties_break_toward_earliest_line() {
        let lines = buffer("let y = 12;\nmiddle line here\nlet y = 12;");
        let matcher = ContentMatcher::new();
        let candidates = matcher.candidates(&lines, "let y = 1;", None);

        assert!(candidates.len() >= 2);
        assert_eq!(candidates[0].start_line, 0);
        assert!((candidates[0].confidence - candidates[1].confidence).abs() < f64::EPSILON);
    }

    #[test]
    fn nothing_found_below_floor() {
        let lines = buffer("completely unrelated content");
        let matcher = ContentMatcher::new();
        assert!(matcher.locate(&lines, "fn main() {}", None).is_none());
    }

    #[test]
    fn fragment_longer_than_file_is_rejected() {
        let lines = buffer("one line");
        let matcher = ContentMatcher::new();
        assert!(matcher.locate(&lines, "a\nb\nc", None).is_none());
        assert!(matcher.candidates(&lines, "a\nb\nc", None).is_empty());
    }

    #[test]
    fn custom_threshold_is_honored() {
        let lines = buffer("abcdefgh");
        let matcher = ContentMatcher::with_options(MatchOptions {
            similarity_threshold: 0.5,
            min_confidence: 0.5,
            fold_case: false,
        });
        let m = matcher.locate(&lines, "abcdexyz", None).unwrap();
        assert_eq!(m.strategy, MatchStrategy::Similarity);
        assert!(m.confidence >= 0.5);
    }

    #[test]
    fn case_folding_only_when_enabled() {
        let lines = buffer("SELECT id FROM users;");
        let strict = ContentMatcher::new();
        assert!(strict
            .locate(&lines, "select id from users;", None)
            .map(|m| m.strategy != MatchStrategy::Normalized)
            .unwrap_or(true));

        let folding = ContentMatcher::with_options(MatchOptions {
            fold_case: true,
            ..MatchOptions::default()
        });
        let m = folding.locate(&lines, "select id from users;", None).unwrap();
        assert_eq!(m.strategy, MatchStrategy::Normalized);
    }

    proptest! {
        #[test]
        fn confidence_is_always_bounded(
            fragment in "[ab \n]{1,30}",
            content in "[ab \n]{1,120}",
            hint in 0usize..200,
        ) {
            let lines: Vec<String> = content.lines().map(String::from).collect();
            let matcher = ContentMatcher::new();
            for candidate in matcher.candidates(&lines, &fragment, Some(hint)) {
                prop_assert!((0.0..=1.0).contains(&candidate.confidence));
                prop_assert!(candidate.start_line <= candidate.end_line);
                prop_assert!(candidate.end_line < lines.len());
            }
        }
    }
}
