//! Tolerant JSON extraction from model replies.

/// Find and parse the first balanced `{…}` object in `text`.
///
/// Model replies routinely wrap their JSON in prose or markdown fences; a
/// bracket-depth scan (string- and escape-aware) locates the object without
/// caring about any of that. Returns `None` when no parseable object exists,
/// in which case callers fall back to their rule-based defaults.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..start + offset + 1];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}
