//! Renderers over a [`ResolvedDocument`](crate::merge::ResolvedDocument).

pub mod markdown;
pub mod page;
pub mod style;
pub mod wrap;

pub use markdown::{MarkdownOptions, MarkdownRenderer, to_markdown};
pub use page::{Page, layout, render_pages_html};
pub use style::StyleContext;

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
