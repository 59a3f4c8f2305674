//! Sentence-aware text chunking for translation payload budgets.

/// Sentence terminators, including the Devanagari danda forms heard on this
/// channel.
const SENTENCE_ENDINGS: &[char] = &['.', '!', '?', '।', '॥', '|'];

/// Split `text` into chunks of at most `max_size` bytes, preferring sentence
/// boundaries, then word boundaries, then a forced byte split for
/// pathological tokens. Joining the chunks with single spaces preserves every
/// sentence's content.
pub fn split_into_chunks(text: &str, max_size: usize) -> Vec<String> {
    if text.len() <= max_size {
        return vec![text.to_string()];
    }

    let sentences = split_sentences(text);
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for sentence in sentences {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        if current.len() + sentence.len() + 1 <= max_size {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
            continue;
        }
        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if sentence.len() > max_size {
            chunks.extend(split_words(sentence, max_size, &mut current));
        } else {
            current = sentence.to_string();
        }
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    if chunks.is_empty() {
        // Force split as a last resort.
        chunks = force_split(text, max_size);
    }

    tracing::debug!(chunks = chunks.len(), max_size, "text split for translation");
    chunks
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if SENTENCE_ENDINGS.contains(&ch) || ch == '\n' {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }
    sentences
}

// Fills complete word chunks; whatever fits of the tail is left in `current`
// for the caller to keep accumulating into.
fn split_words(sentence: &str, max_size: usize, current: &mut String) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut acc = String::new();
    for word in sentence.split_whitespace() {
        if word.len() > max_size {
            if !acc.is_empty() {
                chunks.push(std::mem::take(&mut acc));
            }
            chunks.extend(force_split(word, max_size));
            continue;
        }
        if acc.len() + word.len() + 1 > max_size {
            chunks.push(std::mem::take(&mut acc));
        }
        if !acc.is_empty() {
            acc.push(' ');
        }
        acc.push_str(word);
    }
    *current = acc;
    chunks
}

// Byte-budget split on char boundaries.
fn force_split(text: &str, max_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut acc = String::new();
    for ch in text.chars() {
        if acc.len() + ch.len_utf8() > max_size && !acc.is_empty() {
            chunks.push(std::mem::take(&mut acc));
        }
        acc.push(ch);
    }
    if !acc.is_empty() {
        chunks.push(acc);
    }
    chunks
}
