/// Comment that marks an output buffer as already carrying the stylesheet.
pub const STYLE_MARKER: &str = "<!-- docxview:styles -->";

const DEFAULT_STYLESHEET: &str = "\
.docxview-page { position: relative; box-sizing: border-box; margin: 0 auto 24px; \
background: #fff; box-shadow: 0 1px 4px rgba(0, 0, 0, 0.3); overflow: hidden; }
.docxview-header, .docxview-footer { position: absolute; left: 0; right: 0; color: #555; }
.docxview-header { top: 0; }
.docxview-footer { bottom: 0; }
.docxview-running-header { text-align: right; color: #888; font-size: 9pt; }
.docxview-body p { margin: 0; }
.docxview-body table { border-collapse: collapse; }
.docxview-body td, .docxview-body th { border: 1px solid #999; padding: 2pt 4pt; vertical-align: top; }
.docxview-marker { display: inline-block; min-width: 1.5em; }
.docxview-notes { border-top: 1px solid #999; margin-top: 12pt; font-size: 9pt; }
.docxview-note p { margin: 0; }
";

/// Stylesheet injection for HTML page output. Injection checks the target
/// buffer for [`STYLE_MARKER`], so repeating it is harmless.
#[derive(Clone, Debug)]
pub struct StyleContext {
    stylesheet: String,
}

impl Default for StyleContext {
    fn default() -> Self {
        Self::new(DEFAULT_STYLESHEET)
    }
}

impl StyleContext {
    pub fn new(stylesheet: impl Into<String>) -> Self {
        Self {
            stylesheet: stylesheet.into(),
        }
    }

    pub fn stylesheet(&self) -> &str {
        &self.stylesheet
    }

    pub fn is_injected(output: &str) -> bool {
        output.contains(STYLE_MARKER)
    }

    /// Appends the stylesheet unless `output` already has it. Returns whether
    /// anything was written.
    pub fn inject(&self, output: &mut String) -> bool {
        if Self::is_injected(output) {
            return false;
        }
        output.push_str(STYLE_MARKER);
        output.push_str("\n<style>\n");
        output.push_str(&self.stylesheet);
        output.push_str("</style>\n");
        true
    }
}
