//! Heuristic language detection.
//!
//! Non-Latin scripts are identified by Unicode block. Latin-script text is
//! scored by counting common function words per language; a language wins
//! only with at least [`MIN_STOPWORD_HITS`] hits and strictly more than
//! English. Anything inconclusive is reported as English.

/// Tag returned when detection is inconclusive.
pub const CANONICAL_LANGUAGE: &str = "en";

const MIN_STOPWORD_HITS: usize = 2;

/// (tag, function words). English must stay first.
const STOPWORDS: &[(&str, &[&str])] = &[
    (
        "en",
        &[
            "the", "and", "is", "are", "was", "for", "with", "this", "that", "of", "to", "in",
            "my", "you", "it", "on",
        ],
    ),
    (
        "tl",
        &[
            "ang", "ng", "mga", "sa", "ko", "ako", "ay", "na", "ito", "para", "lang", "po",
            "hindi", "ba", "siya", "namin", "bumili", "kumain",
        ],
    ),
    (
        "es",
        &[
            "el", "la", "los", "las", "de", "que", "y", "en", "un", "una", "por", "con", "para",
            "es", "mi", "compré",
        ],
    ),
    (
        "fr",
        &[
            "le", "la", "les", "des", "est", "et", "un", "une", "pour", "avec", "je", "du",
            "dans", "mon", "pas",
        ],
    ),
    (
        "de",
        &[
            "der", "die", "das", "und", "ist", "ich", "nicht", "ein", "eine", "mit", "für", "auf",
            "mein", "zu",
        ],
    ),
    (
        "id",
        &[
            "yang", "dan", "di", "ini", "itu", "dengan", "untuk", "saya", "tidak", "dari", "ke",
            "membeli",
        ],
    ),
    (
        "pt",
        &[
            "o", "os", "as", "do", "da", "em", "um", "uma", "não", "com", "para", "meu", "eu",
            "você",
        ],
    ),
];

/// Best-effort language tag for `text`. Always returns a tag.
pub fn detect_language(text: &str) -> &'static str {
    if let Some(tag) = detect_script(text) {
        return tag;
    }

    let words: Vec<String> = text
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    if words.is_empty() {
        return CANONICAL_LANGUAGE;
    }

    let scores: Vec<(&'static str, usize)> = STOPWORDS
        .iter()
        .map(|(tag, list)| {
            let hits = words.iter().filter(|w| list.contains(&w.as_str())).count();
            (*tag, hits)
        })
        .collect();
    let english = scores.first().map_or(0, |(_, hits)| *hits);

    let mut best: Option<(&'static str, usize)> = None;
    for &(tag, hits) in scores.iter().skip(1) {
        if hits >= MIN_STOPWORD_HITS && hits > english && best.is_none_or(|(_, b)| hits > b) {
            best = Some((tag, hits));
        }
    }
    best.map_or(CANONICAL_LANGUAGE, |(tag, _)| tag)
}

/// Majority non-Latin script among alphabetic characters, if any.
fn detect_script(text: &str) -> Option<&'static str> {
    let mut counts: [(&'static str, usize); 9] = [
        ("ja", 0),
        ("ko", 0),
        ("zh", 0),
        ("ru", 0),
        ("ar", 0),
        ("th", 0),
        ("hi", 0),
        ("el", 0),
        ("he", 0),
    ];
    let mut letters = 0usize;
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        letters += 1;
        let slot = match c as u32 {
            0x3040..=0x30FF => 0,
            0xAC00..=0xD7AF | 0x1100..=0x11FF => 1,
            0x4E00..=0x9FFF | 0x3400..=0x4DBF => 2,
            0x0400..=0x04FF => 3,
            0x0600..=0x06FF => 4,
            0x0E00..=0x0E7F => 5,
            0x0900..=0x097F => 6,
            0x0370..=0x03FF => 7,
            0x0590..=0x05FF => 8,
            _ => continue,
        };
        counts[slot].1 += 1;
    }
    if letters == 0 {
        return None;
    }

    // Japanese text mixes kana with kanji; any kana decides it.
    if counts[0].1 > 0 {
        return Some("ja");
    }
    let (tag, n) = counts.iter().copied().max_by_key(|(_, n)| *n)?;
    (n * 2 > letters).then_some(tag)
}

/// English name for a tag, for prompts.
pub fn language_name(tag: &str) -> &str {
    match tag {
        "en" => "English",
        "tl" => "Filipino (Tagalog)",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "id" => "Indonesian",
        "pt" => "Portuguese",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" => "Chinese",
        "ru" => "Russian",
        "ar" => "Arabic",
        "th" => "Thai",
        "hi" => "Hindi",
        "el" => "Greek",
        "he" => "Hebrew",
        other => other,
    }
}

/// Primary subtag, lowercased: `"en-US"` → `"en"`.
pub fn primary_subtag(tag: &str) -> String {
    tag.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}
