//! Offline phrase table for when every translation service is unreachable.
//!
//! Covers only the handful of greetings a caller is likely to open with; the
//! chain returning nothing for real content is handled upstream by passing
//! the source text through unchanged.

const HINDI: &[(&str, &str)] = &[
    ("hello", "नमस्ते"),
    ("hello world", "नमस्ते दुनिया"),
    ("how are you", "आप कैसे हैं"),
    ("thank you", "धन्यवाद"),
    ("goodbye", "अलविदा"),
    ("yes", "हाँ"),
    ("no", "नहीं"),
];

const BENGALI: &[(&str, &str)] = &[
    ("hello", "নমস্কার"),
    ("hello world", "নমস্কার পৃথিবী"),
    ("how are you", "আপনি কেমন আছেন"),
    ("thank you", "ধন্যবাদ"),
    ("goodbye", "বিদায়"),
];

fn table_for(language: &str) -> Option<&'static [(&'static str, &'static str)]> {
    match language {
        "hi" => Some(HINDI),
        "bn" => Some(BENGALI),
        _ => None,
    }
}

/// Look up a common phrase. English→table when translating out of the pivot,
/// table→English when translating into it; `None` when uncovered.
pub fn offline_translate(text: &str, source: &str, target: &str) -> Option<String> {
    let needle = text.trim().to_lowercase();

    if source == "en" {
        let table = table_for(target)?;
        return table
            .iter()
            .find(|(en, _)| *en == needle)
            .map(|(_, local)| local.to_string());
    }

    if target == "en" {
        let table = table_for(source)?;
        let trimmed = text.trim();
        return table
            .iter()
            .find(|(_, local)| *local == trimmed)
            .map(|(en, _)| en.to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_to_hindi_greeting() {
        assert_eq!(offline_translate("Hello", "en", "hi").unwrap(), "नमस्ते");
        assert_eq!(offline_translate("thank you", "en", "hi").unwrap(), "धन्यवाद");
    }

    #[test]
    fn test_hindi_to_english_reverse_lookup() {
        assert_eq!(offline_translate("नमस्ते", "hi", "en").unwrap(), "hello");
    }

    #[test]
    fn test_uncovered_text_returns_none() {
        assert!(offline_translate("my cotton has whiteflies", "en", "hi").is_none());
        assert!(offline_translate("hello", "en", "ta").is_none());
    }
}
