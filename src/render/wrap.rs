//! Greedy word wrapping for Markdown paragraphs.

/// Wraps `text` to `width` columns. Hard line breaks in `text` are kept;
/// a word longer than `width` is emitted unsplit on a line of its own.
/// A `width` of 0 disables wrapping.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    wrap_prefixed(text, width, "", "")
}

/// Like [`wrap`], with `first` prepended to the first line and `rest` to
/// every following one. Prefix characters count toward `width`.
pub fn wrap_prefixed(text: &str, width: usize, first: &str, rest: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::from(first);
    let mut line_len = first.chars().count();
    let mut has_word = false;

    for (i, hard_line) in text.split('\n').enumerate() {
        if i > 0 {
            lines.push(std::mem::take(&mut line));
            line.push_str(rest);
            line_len = rest.chars().count();
            has_word = false;
        }
        for word in hard_line.split_whitespace() {
            let word_len = word.chars().count();
            if has_word && width > 0 && line_len + 1 + word_len > width {
                lines.push(std::mem::take(&mut line));
                line.push_str(rest);
                line_len = rest.chars().count();
                has_word = false;
            }
            if has_word {
                line.push(' ');
                line_len += 1;
            }
            line.push_str(word);
            line_len += word_len;
            has_word = true;
        }
    }
    lines.push(line);
    lines
}
