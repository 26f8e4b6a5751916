use crate::model::BattleOutcome;

/// Phrases searched for in narration, checked in this order.
const PHRASES: [(&str, BattleOutcome); 4] = [
    ("total victory", BattleOutcome::TotalVictory),
    ("narrow victory", BattleOutcome::NarrowVictory),
    ("crushing defeat", BattleOutcome::CrushingDefeat),
    ("narrow defeat", BattleOutcome::NarrowDefeat),
];

/// Outcome named in `text`, or `None` when no known phrase appears.
///
/// Case-insensitive substring match; the first phrase in [`PHRASES`] order
/// wins even if another phrase appears earlier in the text.
pub fn classify_strict(text: &str) -> Option<BattleOutcome> {
    let lowered = text.to_lowercase();
    PHRASES
        .iter()
        .find(|(phrase, _)| lowered.contains(phrase))
        .map(|(_, outcome)| *outcome)
}

/// Like [`classify_strict`] but unrecognized text counts as a narrow victory.
pub fn classify(text: &str) -> BattleOutcome {
    classify_strict(text).unwrap_or(BattleOutcome::NarrowVictory)
}

/// Stored battle description derived from raw narration.
///
/// The narrator leads with an outcome header line; everything up to the first
/// blank line (or the first line break, if there is no blank line) is dropped.
/// The result is trimmed and cut to at most `max_chars` characters.
pub fn clean_narration(text: &str, max_chars: usize) -> String {
    let body = match text.find("\n\n") {
        Some(idx) => &text[idx + 2..],
        None => match text.find('\n') {
            Some(idx) => &text[idx + 1..],
            None => text,
        },
    };

    let body = body.trim();
    // A header with nothing after it is still better than an empty description
    let body = if body.is_empty() { text.trim() } else { body };

    truncate_chars(body, max_chars)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}
