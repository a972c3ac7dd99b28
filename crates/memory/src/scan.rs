use moltyclaw_core::memory::MemoryHit;

/// Longest excerpt returned per matching line, in characters.
pub(crate) const EXCERPT_CHARS: usize = 100;

/// Append case-insensitive line matches from one document until `limit` hits exist.
pub(crate) fn scan_lines(
    source: &str,
    content: &str,
    query_lower: &str,
    limit: usize,
    hits: &mut Vec<MemoryHit>,
) {
    for (idx, line) in content.lines().enumerate() {
        if hits.len() >= limit {
            return;
        }
        if line.to_lowercase().contains(query_lower) {
            hits.push(MemoryHit {
                source: source.to_string(),
                line: idx + 1,
                excerpt: line.trim().chars().take(EXCERPT_CHARS).collect(),
            });
        }
    }
}

/// Daily journal entry line, e.g. `[14:03:59] called the bank`.
pub(crate) fn daily_line(time: &chrono::NaiveTime, text: &str) -> String {
    format!("[{}] {}\n", time.format("%H:%M:%S"), text)
}

/// Long-term memory entry, a markdown bullet on its own paragraph.
pub(crate) fn long_term_entry(text: &str) -> String {
    format!("\n- {text}\n")
}
