//! Advisory structural-balance checking for edited regions.
//!
//! After an edit is composed, the replaced region is scanned for
//! brace/paren/bracket, quote, and block-comment imbalance that the edit
//! itself introduced. A hunk that merely crosses an existing imbalance (the
//! matching brace lives outside the edited region) is not reported: only the
//! delta between the before and after fragments counts. Warnings never block
//! application: the rest of the file may well supply the missing delimiter.
//!
//! Tracking is parity-based, not a lexer: a quote inside an open string of
//! the other kind does not toggle nesting, escapes are honored, and content
//! inside comments is ignored. For structured-data files (by extension) the
//! whole resulting file is additionally run through a real parse, and a
//! failure is reported as a warning, not an error.

use std::path::Path;

/// Coarse file classification by extension; drives which checks make sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Structured data with a real parser available (`.json`, `.jsonc`).
    Json,
    /// Code-like files where quote parity is meaningful.
    Source,
    /// Everything else; apostrophes in prose make single-quote parity noise.
    Plain,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "json" | "jsonc" => FileKind::Json,
            "rs" | "c" | "h" | "cpp" | "hpp" | "cc" | "java" | "js" | "jsx" | "ts" | "tsx"
            | "go" | "py" | "rb" | "cs" | "php" | "swift" | "kt" | "scala" | "css" | "scss"
            | "sh" | "toml" | "yaml" | "yml" => FileKind::Source,
            _ => FileKind::Plain,
        }
    }
}

/// Net delimiter counts for one fragment.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct DelimiterCounts {
    braces: i64,
    parens: i64,
    brackets: i64,
    double_quotes: u64,
    single_quotes: u64,
    block_comments: i64,
}

/// Emits advisory warnings about structural damage introduced by an edit.
pub struct StructuralValidator;

impl StructuralValidator {
    /// Compare delimiter balance before vs after the edit; report only
    /// imbalance the edit itself introduced. Never blocks.
    pub fn check(before: &str, after: &str, kind: FileKind) -> Vec<String> {
        let b = scan(before);
        let a = scan(after);
        let mut warnings = Vec::new();

        pair_delta(&mut warnings, b.braces, a.braces, "brace", "{", "}");
        pair_delta(&mut warnings, b.parens, a.parens, "parenthesis", "(", ")");
        pair_delta(&mut warnings, b.brackets, a.brackets, "bracket", "[", "]");
        pair_delta(
            &mut warnings,
            b.block_comments,
            a.block_comments,
            "block comment",
            "/*",
            "*/",
        );

        if a.double_quotes % 2 != b.double_quotes % 2 {
            warnings.push(
                "edit changes double-quote balance in the edited region".to_string(),
            );
        }
        if kind != FileKind::Plain && a.single_quotes % 2 != b.single_quotes % 2 {
            warnings.push(
                "edit changes single-quote balance in the edited region".to_string(),
            );
        }

        warnings
    }

    /// Whole-file check for structured-data formats. Only JSON has a real
    /// parser wired up; other kinds return no warnings here.
    pub fn check_file(content: &str, kind: FileKind) -> Vec<String> {
        match kind {
            FileKind::Json => match serde_json::from_str::<serde_json::Value>(content) {
                Ok(_) => Vec::new(),
                Err(e) => vec![format!("resulting file is not valid JSON: {e}")],
            },
            _ => Vec::new(),
        }
    }
}

fn pair_delta(
    warnings: &mut Vec<String>,
    before: i64,
    after: i64,
    name: &str,
    open: &str,
    close: &str,
) {
    let delta = after - before;
    if delta > 0 {
        warnings.push(format!(
            "edit introduces {delta} unmatched opening {name}{} '{open}'",
            if delta == 1 { "" } else { "s" }
        ));
    } else if delta < 0 {
        warnings.push(format!(
            "edit introduces {} unmatched closing {name}{} '{close}'",
            -delta,
            if delta == -1 { "" } else { "s" }
        ));
    }
}

/// Single pass over the fragment with parity-level string/comment awareness.
fn scan(fragment: &str) -> DelimiterCounts {
    let mut counts = DelimiterCounts::default();
    let mut chars = fragment.chars().peekable();
    let mut in_string: Option<char> = None;
    let mut in_block_comment = false;
    let mut in_line_comment = false;

    while let Some(c) = chars.next() {
        if in_line_comment {
            if c == '\n' {
                in_line_comment = false;
            }
            continue;
        }

        if in_block_comment {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                counts.block_comments -= 1;
                in_block_comment = false;
            }
            continue;
        }

        if let Some(quote) = in_string {
            if c == '\\' {
                chars.next();
            } else if c == quote {
                match quote {
                    '"' => counts.double_quotes += 1,
                    _ => counts.single_quotes += 1,
                }
                in_string = None;
            }
            continue;
        }

        match c {
            '{' => counts.braces += 1,
            '}' => counts.braces -= 1,
            '(' => counts.parens += 1,
            ')' => counts.parens -= 1,
            '[' => counts.brackets += 1,
            ']' => counts.brackets -= 1,
            '"' => {
                counts.double_quotes += 1;
                in_string = Some('"');
            }
            '\'' => {
                counts.single_quotes += 1;
                in_string = Some('\'');
            }
            '/' => match chars.peek() {
                Some('/') => {
                    chars.next();
                    in_line_comment = true;
                }
                Some('*') => {
                    chars.next();
                    counts.block_comments += 1;
                    in_block_comment = true;
                }
                _ => {}
            },
            _ => {}
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_edit_is_silent() {
        let before = "fn a() {\n    call();\n}";
        let after = "fn a() {\n    other();\n}";
        assert!(StructuralValidator::check(before, after, FileKind::Source).is_empty());
    }

    #[test]
    fn removed_closing_brace_is_reported() {
        let before = "if (x) {\n    y();\n}";
        let after = "if (x) {\n    y();";
        let warnings = StructuralValidator::check(before, after, FileKind::Source);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("opening brace"));
    }

    #[test]
    fn added_stray_closing_paren_is_reported() {
        let warnings = StructuralValidator::check("x = f(y);", "x = f(y));", FileKind::Source);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("closing parenthesis"));
    }

    #[test]
    fn preexisting_imbalance_is_not_reported() {
        // The hunk crosses a block boundary in both versions; the matching
        // brace lives outside the edited region.
        let before = "    return 1;\n}";
        let after = "    return 2;\n}";
        assert!(StructuralValidator::check(before, after, FileKind::Source).is_empty());
    }

    #[test]
    fn braces_inside_strings_do_not_count() {
        let before = r#"let s = "{";"#;
        let after = r#"let s = "{{{";"#;
        assert!(StructuralValidator::check(before, after, FileKind::Source).is_empty());
    }

    #[test]
    fn quote_inside_other_quote_kind_does_not_toggle() {
        let before = r#"let s = "it's fine";"#;
        let after = r#"let s = "it's still fine";"#;
        assert!(StructuralValidator::check(before, after, FileKind::Source).is_empty());
    }

    #[test]
    fn unterminated_string_is_reported() {
        let warnings =
            StructuralValidator::check(r#"let s = "done";"#, r#"let s = "done;"#, FileKind::Source);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("double-quote"));
    }

    #[test]
    fn single_quote_parity_ignored_in_plain_text() {
        let warnings = StructuralValidator::check("the cat", "the cat's toy", FileKind::Plain);
        assert!(warnings.is_empty());
    }

    #[test]
    fn delimiters_inside_comments_are_ignored() {
        let before = "code();";
        let after = "code();\n// note: unmatched { here\n/* and ( there */";
        assert!(StructuralValidator::check(before, after, FileKind::Source).is_empty());
    }

    #[test]
    fn unclosed_block_comment_is_reported() {
        let warnings = StructuralValidator::check("x();", "x();\n/* comment", FileKind::Source);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("block comment"));
    }

    #[test]
    fn json_parse_failure_is_a_warning_not_an_error() {
        let warnings = StructuralValidator::check_file(r#"{"a": 1,}"#, FileKind::Json);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("not valid JSON"));

        assert!(StructuralValidator::check_file(r#"{"a": 1}"#, FileKind::Json).is_empty());
    }

    #[test]
    fn file_kind_from_extension() {
        assert_eq!(FileKind::from_path(Path::new("a/b.json")), FileKind::Json);
        assert_eq!(FileKind::from_path(Path::new("a/b.rs")), FileKind::Source);
        assert_eq!(FileKind::from_path(Path::new("notes.txt")), FileKind::Plain);
        assert_eq!(FileKind::from_path(Path::new("README")), FileKind::Plain);
    }
}
