//! Language-code normalisation.

/// Provider codes carrying a region suffix, mapped to the base code the
/// translation chain and transcript artifacts use.
const PROVIDER_CODE_MAP: &[(&str, &str)] = &[
    ("en-us", "en"),
    ("en-gb", "en"),
    ("en-au", "en"),
    ("en-ca", "en"),
    ("en-in", "en"),
    ("hi-in", "hi"),
    ("bn-in", "bn"),
    ("te-in", "te"),
    ("mr-in", "mr"),
    ("ta-in", "ta"),
    ("gu-in", "gu"),
    ("ur-in", "ur"),
    ("kn-in", "kn"),
    ("or-in", "or"),
    ("pa-in", "pa"),
    ("as-in", "as"),
    ("ml-in", "ml"),
    ("es-es", "es"),
    ("es-mx", "es"),
    ("fr-fr", "fr"),
    ("fr-ca", "fr"),
    ("de-de", "de"),
    ("it-it", "it"),
    ("pt-br", "pt"),
    ("pt-pt", "pt"),
    ("ru-ru", "ru"),
    ("ja-jp", "ja"),
    ("ko-kr", "ko"),
    ("zh-cn", "zh"),
    ("zh-tw", "zh"),
    ("ar-xa", "ar"),
    ("nl-nl", "nl"),
    ("sv-se", "sv"),
];

/// Normalise a recognition language code to its base form: `hi-IN` → `hi`.
/// Unknown codes keep their base segment, lowercased.
pub fn normalize_language_code(code: &str) -> String {
    let lowered = code.to_ascii_lowercase();
    if let Some((_, base)) = PROVIDER_CODE_MAP.iter().find(|(k, _)| *k == lowered) {
        return (*base).to_string();
    }
    match lowered.split_once('-') {
        Some((base, _)) => base.to_string(),
        None => lowered,
    }
}
