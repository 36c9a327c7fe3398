//! Pure text transformations applied by the stage processors.
//!
//! No I/O, no shared state. Lengths are measured in characters, not bytes.

use std::collections::HashMap;

use crate::protocol::{ReportRequest, WordFrequency};

/// How many entries the frequency table keeps.
pub const TOP_WORDS: usize = 10;

const RULE: &str = "============================================================";

/// Number of whitespace-separated tokens in `text`.
pub fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

/// Number of characters in `text`.
pub fn char_len(text: &str) -> u64 {
    text.chars().count() as u64
}

/// Result of [`clean`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cleaned {
    /// Normalised text.
    pub text: String,
    /// Input length in characters.
    pub original_length: u64,
    /// Output length in characters.
    pub cleaned_length: u64,
}

/// Lowercase, replace everything outside `[a-z0-9'\s]` with a space, and
/// collapse whitespace runs to single spaces.
pub fn clean(text: &str) -> Cleaned {
    let filtered: String = text
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '\'' {
                c
            } else {
                ' '
            }
        })
        .collect();

    let cleaned = filtered.split_whitespace().collect::<Vec<_>>().join(" ");

    Cleaned {
        original_length: char_len(text),
        cleaned_length: char_len(&cleaned),
        text: cleaned,
    }
}

/// Result of [`analyze`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    /// Most frequent tokens, at most [`TOP_WORDS`].
    pub top_words: Vec<WordFrequency>,
    /// Token count.
    pub total_words: u64,
    /// Distinct token count.
    pub unique_words: u64,
}

/// Tokenize on whitespace and count frequencies.
///
/// The table is ordered by count, descending; equal counts keep the order in
/// which the tokens first appeared.
pub fn analyze(text: &str) -> Analysis {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<(&str, u64)> = Vec::new();
    let mut total = 0u64;

    for token in text.split_whitespace() {
        total += 1;
        match index.get(token) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(token, counts.len());
                counts.push((token, 1));
            }
        }
    }

    let unique = counts.len() as u64;
    // stable: ties stay in first-occurrence order
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    Analysis {
        top_words: counts
            .into_iter()
            .take(TOP_WORDS)
            .map(|(word, count)| WordFrequency::new(word, count))
            .collect(),
        total_words: total,
        unique_words: unique,
    }
}

/// Render every line of the report above the timing footer.
pub fn render_report_body(request: &ReportRequest) -> String {
    let mut lines = vec![
        RULE.to_string(),
        "TEXT ANALYSIS REPORT".to_string(),
        RULE.to_string(),
        format!("Request ID: {}", request.request_id),
        "\nSTATISTICS:".to_string(),
        format!("  Total Words: {}", request.total_words),
        format!("  Unique Words: {}", request.unique_words),
        format!("  Original Length: {} chars", request.original_length),
        format!("  Cleaned Length: {} chars", request.cleaned_length),
    ];

    if !request.word_frequencies.is_empty() {
        lines.push(format!(
            "\nTOP {} MOST FREQUENT WORDS:",
            request.word_frequencies.len()
        ));
        for (i, wf) in request.word_frequencies.iter().enumerate() {
            lines.push(format!("  {}. '{}' - {} times", i + 1, wf.word, wf.count));
        }
    }

    lines.join("\n")
}

/// Append the timing footer to a body from [`render_report_body`].
///
/// `processing_secs` is printed with millisecond precision.
pub fn finish_report(body: String, processing_secs: f64) -> String {
    let mut report = body;
    report.push_str(&format!(
        "\n\nReport generated in {processing_secs:.3} seconds\n{RULE}"
    ));
    report
}

/// Render the fixed-format report in one go.
pub fn render_report(request: &ReportRequest, processing_secs: f64) -> String {
    finish_report(render_report_body(request), processing_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAT_TEXT: &str = "the cat sat on the mat the cat ran";

    #[test]
    fn test_clean_lowercases_and_strips_punctuation() {
        let out = clean("Hello, World!  It's   42 degrees.");
        assert_eq!(out.text, "hello world it's 42 degrees");
        assert_eq!(out.original_length, 33);
        assert_eq!(out.cleaned_length, out.text.chars().count() as u64);
    }

    #[test]
    fn test_clean_collapses_newlines_and_tabs() {
        let out = clean("  a\t\tb\n\nc  ");
        assert_eq!(out.text, "a b c");
    }

    #[test]
    fn test_clean_replaces_non_ascii_letters() {
        // 'É' lowercases to 'é', which is outside [a-z]
        let out = clean("Café Été");
        assert_eq!(out.text, "caf t");
        assert_eq!(out.original_length, 8);
    }

    #[test]
    fn test_clean_empty_input() {
        let out = clean("");
        assert_eq!(out.text, "");
        assert_eq!(out.original_length, 0);
        assert_eq!(out.cleaned_length, 0);
    }

    #[test]
    fn test_analyze_cat_fixture() {
        let tokens: Vec<&str> = CAT_TEXT.split_whitespace().collect();
        let distinct: std::collections::HashSet<&str> = tokens.iter().copied().collect();

        let a = analyze(CAT_TEXT);
        assert_eq!(a.total_words, 9);
        assert_eq!(a.unique_words, distinct.len() as u64);
        assert_eq!(a.unique_words, 6);
        assert_eq!(a.top_words[0], WordFrequency::new("the", 3));
        assert_eq!(a.top_words[1], WordFrequency::new("cat", 2));
        // remaining singletons keep first-occurrence order
        let rest: Vec<&str> = a.top_words[2..].iter().map(|w| w.word.as_str()).collect();
        assert_eq!(rest, vec!["sat", "on", "mat", "ran"]);
    }

    #[test]
    fn test_analyze_ties_break_by_first_occurrence() {
        let a = analyze("b a b a c");
        assert_eq!(a.top_words[0].word, "b");
        assert_eq!(a.top_words[1].word, "a");
        assert_eq!(a.top_words[2].word, "c");
    }

    #[test]
    fn test_analyze_caps_table_at_ten() {
        let text: String = (0..25).map(|i| format!("w{i} ")).collect();
        let a = analyze(&text);
        assert_eq!(a.top_words.len(), TOP_WORDS);
        assert_eq!(a.unique_words, 25);
        assert_eq!(a.top_words[0].word, "w0");
    }

    #[test]
    fn test_analyze_empty_text() {
        let a = analyze("   ");
        assert_eq!(a.total_words, 0);
        assert_eq!(a.unique_words, 0);
        assert!(a.top_words.is_empty());
    }

    #[test]
    fn test_render_report_layout() {
        let req = ReportRequest {
            request_id: "abc12345".to_string(),
            word_frequencies: vec![WordFrequency::new("the", 3), WordFrequency::new("cat", 2)],
            total_words: 9,
            unique_words: 6,
            original_length: 40,
            cleaned_length: 34,
        };
        let report = render_report(&req, 0.0126);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], RULE);
        assert_eq!(lines[1], "TEXT ANALYSIS REPORT");
        assert!(report.contains("Request ID: abc12345"));
        assert!(report.contains("  Total Words: 9"));
        assert!(report.contains("  Unique Words: 6"));
        assert!(report.contains("  Original Length: 40 chars"));
        assert!(report.contains("  Cleaned Length: 34 chars"));
        assert!(report.contains("TOP 2 MOST FREQUENT WORDS:"));
        assert!(report.contains("  1. 'the' - 3 times"));
        assert!(report.contains("  2. 'cat' - 2 times"));
        assert!(report.contains("Report generated in 0.013 seconds"));
        assert_eq!(lines.last().copied(), Some(RULE));
    }

    #[test]
    fn test_footer_follows_body_after_blank_line() {
        let req = ReportRequest {
            request_id: "f-1".to_string(),
            word_frequencies: vec![WordFrequency::new("a", 1)],
            total_words: 1,
            unique_words: 1,
            original_length: 1,
            cleaned_length: 1,
        };
        let body = render_report_body(&req);
        assert!(!body.contains("Report generated"));
        let report = finish_report(body.clone(), 0.25);
        assert_eq!(report, render_report(&req, 0.25));
        assert_eq!(
            &report[body.len()..],
            format!("\n\nReport generated in 0.250 seconds\n{RULE}")
        );
    }

    #[test]
    fn test_render_report_omits_table_when_empty() {
        let req = ReportRequest {
            request_id: "r".to_string(),
            word_frequencies: vec![],
            total_words: 0,
            unique_words: 0,
            original_length: 0,
            cleaned_length: 0,
        };
        assert!(!render_report(&req, 0.0).contains("MOST FREQUENT"));
    }

    #[test]
    fn test_word_count_matches_split() {
        assert_eq!(word_count("one  two\nthree"), 3);
        assert_eq!(word_count(""), 0);
    }
}
