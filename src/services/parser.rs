use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;

/// How much of a failed candidate to include in diagnostic logs.
const PREVIEW_LEN: usize = 160;

/// Outcome of a parse attempt, kept internal for logging and metrics.
/// The public contract always returns a plain `Vec<T>`.
enum ParseOutcome<T> {
    Parsed { items: Vec<T>, candidate: usize },
    Fallback,
}

/// Best-effort extraction of a typed array from raw text-model output.
///
/// The generation capability carries no output schema guarantee, so valid
/// JSON is treated as a best-effort property rather than a contract: the
/// function tries progressively more aggressive rewrites of the input and
/// returns `fallback` if none of them parse. It never panics and never
/// returns an error, which keeps a malformed stage output local (an empty
/// flashcard set) instead of failing the whole job.
pub fn parse_generated_array<T: DeserializeOwned>(
    raw: &str,
    fallback: Vec<T>,
    label: &str,
) -> Vec<T> {
    match try_parse(raw, label) {
        ParseOutcome::Parsed { items, candidate } => {
            tracing::debug!(label, candidate, count = items.len(), "parsed generated array");
            items
        }
        ParseOutcome::Fallback => {
            metrics::counter!("generated_array_fallbacks_total").increment(1);
            tracing::warn!(label, "all parse candidates failed, using fallback");
            fallback
        }
    }
}

fn try_parse<T: DeserializeOwned>(raw: &str, label: &str) -> ParseOutcome<T> {
    let span = extract_array_span(raw);
    let sanitized = sanitize(span);
    let requoted = sanitized.replace('\'', "\"");

    // Candidates in order of increasing aggressiveness. The blanket quote
    // replacement is lossy (apostrophes inside prose become quotes), so it
    // only runs once the gentler passes have failed.
    let candidates = [span.to_string(), sanitized, requoted];

    for (i, candidate) in candidates.iter().enumerate() {
        if i > 0 && candidates[..i].contains(candidate) {
            continue;
        }
        if let Ok(items) = serde_json::from_str::<Vec<T>>(candidate) {
            return ParseOutcome::Parsed { items, candidate: i };
        }
        let repaired = repair_structure(candidate);
        if let Ok(items) = serde_json::from_str::<Vec<T>>(&repaired) {
            return ParseOutcome::Parsed { items, candidate: i };
        }
        tracing::warn!(
            label,
            candidate = i,
            preview = %preview(candidate),
            "parse candidate failed"
        );
    }

    ParseOutcome::Fallback
}

/// Pull the most plausible array substring out of surrounding prose:
/// the span from the first `[` to the last `]`. Text models routinely wrap
/// their arrays in explanations ("Here are your flashcards: [...]").
fn extract_array_span(raw: &str) -> &str {
    let trimmed = raw.trim();
    match (trimmed.find('['), trimmed.rfind(']')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Syntactic cleanup of the common ways text models mangle JSON.
fn sanitize(input: &str) -> String {
    let mut text = input.to_string();

    // Code-fence markers, with or without a language tag.
    text = text.replace("```json", " ").replace("```", " ");

    // Smart quotes and non-breaking spaces from models trained on prose.
    text = text
        .replace(['\u{201c}', '\u{201d}', '\u{201e}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{a0}', " ");

    // Single-quoted object keys: {'front': ...} -> {"front": ...}
    text = single_quoted_key_re()
        .replace_all(&text, "\"$1\":")
        .into_owned();

    // Single-quoted string values: : 'text' -> : "text"
    text = single_quoted_value_re()
        .replace_all(&text, ": \"$1\"$2")
        .into_owned();

    // A quoted key immediately followed by a quoted value lost its colon.
    text = missing_colon_re()
        .replace_all(&text, "$1: $2")
        .into_owned();

    // Collapse whitespace runs so the comma/bracket regexes see one shape.
    text = whitespace_re().replace_all(&text, " ").into_owned();

    // Trailing commas before a closing bracket or brace.
    text = trailing_comma_re().replace_all(&text, "$1").into_owned();

    text.trim().to_string()
}

/// Last-resort structural repair: close an unterminated string and any
/// brackets left open by output truncation. A dangling comma or partial
/// token before the cut is dropped.
fn repair_structure(input: &str) -> String {
    let mut out = input.trim_end().to_string();
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in out.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '[' | '{' if !in_string => stack.push(c),
            ']' if !in_string => {
                if stack.last() == Some(&'[') {
                    stack.pop();
                }
            }
            '}' if !in_string => {
                if stack.last() == Some(&'{') {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    if in_string {
        out.push('"');
    }
    while out.ends_with(',') || out.ends_with(':') {
        out.pop();
        while out.ends_with(' ') {
            out.pop();
        }
    }
    while let Some(open) = stack.pop() {
        out.push(if open == '[' { ']' } else { '}' });
    }
    out
}

fn preview(candidate: &str) -> &str {
    match candidate.char_indices().nth(PREVIEW_LEN) {
        Some((i, _)) => &candidate[..i],
        None => candidate,
    }
}

fn single_quoted_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"'([^']*)'\s*:").unwrap())
}

fn single_quoted_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":\s*'([^']*)'\s*([,}\]])").unwrap())
}

fn missing_colon_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([{,]\s*"(?:[^"\\]|\\.)+")\s+(")"#).unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::artifact::Flashcard;

    fn cards(raw: &str) -> Vec<Flashcard> {
        parse_generated_array(raw, Vec::new(), "test")
    }

    #[test]
    fn test_valid_json_parses_exactly() {
        let raw = r#"[{"front": "What is a root canal?", "back": "Endodontic therapy"}]"#;
        let parsed = cards(raw);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].front, "What is a root canal?");
        assert_eq!(parsed[0].back, "Endodontic therapy");
    }

    #[test]
    fn test_array_extracted_from_surrounding_prose() {
        let raw = r#"Here are your flashcards:
            [{"front": "a", "back": "b"}]
            Let me know if you need more!"#;
        assert_eq!(cards(raw).len(), 1);
    }

    #[test]
    fn test_code_fenced_output() {
        let raw = "```json\n[{\"front\": \"a\", \"back\": \"b\"}]\n```";
        assert_eq!(cards(raw).len(), 1);
    }

    #[test]
    fn test_single_quotes_and_trailing_comma() {
        let raw = "[{'front': 'a', 'back': 'b'}, {'front': 'c', 'back': 'd'},]";
        let parsed = cards(raw);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].front, "c");
    }

    #[test]
    fn test_smart_quotes() {
        let raw = "[{\u{201c}front\u{201d}: \u{201c}a\u{201d}, \u{201c}back\u{201d}: \u{201c}b\u{201d}}]";
        assert_eq!(cards(raw).len(), 1);
    }

    #[test]
    fn test_missing_colon_after_key() {
        let raw = r#"[{"front" "a", "back": "b"}]"#;
        let parsed = cards(raw);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].front, "a");
    }

    #[test]
    fn test_truncated_output_repaired() {
        let raw = r#"[{"front": "a", "back": "b"}, {"front": "c", "back": "incomple"#;
        let parsed = cards(raw);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].back, "incomple");
    }

    #[test]
    fn test_empty_input_returns_fallback() {
        assert!(cards("").is_empty());
    }

    #[test]
    fn test_non_json_returns_fallback() {
        assert!(cards("I'm sorry, I can't produce flashcards for that topic.").is_empty());
    }

    #[test]
    fn test_wrong_shape_returns_fallback() {
        // An object, not an array of the target shape.
        assert!(cards(r#"{"front": "a", "back": "b"}"#).is_empty());
    }

    #[test]
    fn test_fallback_value_is_returned() {
        let fallback = vec![Flashcard {
            front: "f".to_string(),
            back: "b".to_string(),
        }];
        let parsed = parse_generated_array("garbage", fallback.clone(), "test");
        assert_eq!(parsed, fallback);
    }

    #[test]
    fn test_never_panics_on_arbitrary_input() {
        for raw in [
            "[",
            "]",
            "[{",
            "[\"",
            "{'",
            "null",
            "[[[[[",
            "\u{a0}\u{2018}\u{201c}",
            "[{\"front\": }]",
        ] {
            let _ = cards(raw);
        }
    }
}
