//! Balanced-brace JSON extraction.
//!
//! Models asked for JSON frequently wrap it in prose ("Sure! Here is the
//! result: {...}\nThanks"). The gateway pulls out the first balanced
//! brace-delimited substring before parsing, so a chatty-but-correct
//! response still satisfies the JSON contract.

/// Return the first balanced `{...}` substring of `text`, if any.
///
/// Nesting is tracked, and braces inside JSON string literals (including
/// escaped quotes) do not count toward the balance. An unbalanced opening
/// brace is skipped and the scan resumes at the next one, so a truncated
/// object earlier in the text cannot mask a complete one after it.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(text, start) {
            return Some(&text[start..=end]);
        }
        search_from = start + 1;
    }
    None
}

/// Byte index of the `}` closing the object opened at `start`, or None if
/// the object never balances.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.bytes().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
