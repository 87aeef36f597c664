//! Field-code instruction parsing and display-text resolution.

use std::collections::HashMap;

use chrono::{DateTime, Local};

use crate::model::{Block, FieldCode, FieldKind, FieldProperties, ParsedDocument, Run};

/// Placeholder rendered for an uncached PAGE field outside of pagination.
pub const PAGE_MARKER: &str = "[Page]";
pub const NUMPAGES_MARKER: &str = "[Total Pages]";

/// Inputs a field may depend on besides the document itself.
#[derive(Clone, Debug)]
pub struct FieldContext {
    pub now: DateTime<Local>,
}

impl FieldContext {
    pub fn at(now: DateTime<Local>) -> Self {
        Self { now }
    }
}

impl Default for FieldContext {
    fn default() -> Self {
        Self { now: Local::now() }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Token {
    text: String,
    quoted: bool,
}

impl Token {
    fn switch(&self) -> Option<&str> {
        if self.quoted {
            return None;
        }
        self.text.strip_prefix('\\').filter(|s| !s.is_empty())
    }
}

fn tokenize(instruction: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = instruction.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let text: String = chars.by_ref().take_while(|&c| c != '"').collect();
            tokens.push(Token { text, quoted: true });
            continue;
        }
        let mut text = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == '"' || (c == '\\' && !text.is_empty()) {
                break;
            }
            text.push(c);
            chars.next();
        }
        tokens.push(Token { text, quoted: false });
    }
    tokens
}

fn kind_for(name: &str) -> FieldKind {
    match name {
        "PAGE" => FieldKind::Page,
        "NUMPAGES" => FieldKind::NumPages,
        "DATE" | "CREATEDATE" | "SAVEDATE" | "PRINTDATE" => FieldKind::Date,
        "TIME" => FieldKind::Time,
        "FILENAME" => FieldKind::FileName,
        "AUTHOR" => FieldKind::Author,
        "TITLE" => FieldKind::Title,
        "SUBJECT" => FieldKind::Subject,
        "KEYWORDS" => FieldKind::Keywords,
        "HYPERLINK" => FieldKind::Hyperlink,
        "REF" => FieldKind::Ref,
        "PAGEREF" => FieldKind::PageRef,
        "NOTEREF" => FieldKind::NoteRef,
        "TOC" => FieldKind::Toc,
        "SEQ" => FieldKind::Seq,
        "FORMTEXT" => FieldKind::FormText,
        "FORMCHECKBOX" => FieldKind::FormCheckbox,
        "FORMDROPDOWN" => FieldKind::FormDropdown,
        other => FieldKind::Unknown(other.to_string()),
    }
}

/// Classifies a raw instruction such as `HYPERLINK "https://x" \o "tip"`.
/// The returned code has no cached result.
pub fn parse_instruction(instruction: &str) -> FieldCode {
    let instruction = instruction.trim().to_string();
    if instruction.starts_with('=') {
        return FieldCode {
            kind: FieldKind::Formula,
            instruction,
            result: None,
            properties: FieldProperties::default(),
        };
    }

    let tokens = tokenize(&instruction);
    let name = tokens
        .first()
        .map(|t| t.text.to_ascii_uppercase())
        .unwrap_or_default();
    let kind = kind_for(&name);

    let mut properties = FieldProperties::default();
    let mut rest = tokens.iter().skip(1).peekable();
    while let Some(token) = rest.next() {
        match token.switch() {
            Some(key) => {
                let value = rest
                    .next_if(|next| next.switch().is_none())
                    .map(|next| next.text.clone())
                    .unwrap_or_default();
                properties.switches.insert(key.to_string(), value);
            }
            None => properties.args.push(token.text.clone()),
        }
    }

    let first_arg = properties.args.first().cloned();
    match kind {
        FieldKind::Hyperlink => {
            properties.bookmark = properties.switches.get("l").filter(|v| !v.is_empty()).cloned();
            properties.url = match (first_arg, &properties.bookmark) {
                (Some(url), Some(mark)) => Some(format!("{url}#{mark}")),
                (Some(url), None) => Some(url),
                (None, Some(mark)) => Some(format!("#{mark}")),
                (None, None) => None,
            };
        }
        FieldKind::Ref | FieldKind::PageRef | FieldKind::NoteRef => properties.bookmark = first_arg,
        FieldKind::Seq => properties.sequence = first_arg,
        FieldKind::FormText => {
            properties.default_text = tokens.get(1).filter(|t| t.quoted).map(|t| t.text.clone());
        }
        _ => {}
    }

    FieldCode {
        kind,
        instruction,
        result: None,
        properties,
    }
}

/// Resolves display text for fields, carrying SEQ counters across a document.
#[derive(Debug)]
pub struct FieldResolver<'c> {
    ctx: &'c FieldContext,
    sequences: HashMap<String, u32>,
}

impl<'c> FieldResolver<'c> {
    pub fn new(ctx: &'c FieldContext) -> Self {
        Self {
            ctx,
            sequences: HashMap::new(),
        }
    }

    /// A cached result always wins; otherwise the text is computed from the
    /// field kind. Never fails.
    pub fn display_text(&mut self, code: &FieldCode) -> String {
        let sequence = (code.kind == FieldKind::Seq).then(|| self.advance_sequence(code));
        if let Some(result) = &code.result {
            return result.clone();
        }
        let props = &code.properties;
        match &code.kind {
            FieldKind::Page => PAGE_MARKER.into(),
            FieldKind::NumPages => NUMPAGES_MARKER.into(),
            FieldKind::Date => self.ctx.now.format("%-m/%-d/%Y").to_string(),
            FieldKind::Time => self.ctx.now.format("%-H:%M").to_string(),
            FieldKind::FileName => "[Filename]".into(),
            FieldKind::Author => "[Author]".into(),
            FieldKind::Title => "[Title]".into(),
            FieldKind::Subject => "[Subject]".into(),
            FieldKind::Keywords => "[Keywords]".into(),
            FieldKind::Hyperlink => props.url.clone().unwrap_or_else(|| "[Link]".into()),
            FieldKind::Ref | FieldKind::PageRef | FieldKind::NoteRef => {
                format!("[Reference: {}]", code.instruction)
            }
            FieldKind::Toc => String::new(),
            FieldKind::FormText => format!(
                "[{}]",
                props.default_text.as_deref().unwrap_or("_____________")
            ),
            FieldKind::FormCheckbox => "\u{2610}".into(),
            FieldKind::FormDropdown => "[Select Option \u{25bc}]".into(),
            FieldKind::Formula => evaluate_formula(&code.instruction)
                .map(format_number)
                .unwrap_or_else(|| bracketed(&code.instruction)),
            FieldKind::Unknown(_) => bracketed(&code.instruction),
            FieldKind::Seq => sequence.unwrap_or_default(),
        }
    }

    fn advance_sequence(&mut self, code: &FieldCode) -> String {
        let name = code.properties.sequence.clone().unwrap_or_default();
        let switches = &code.properties.switches;
        let counter = self.sequences.entry(name).or_insert(0);
        if let Some(reset) = switches.get("r").and_then(|v| v.parse::<u32>().ok()) {
            *counter = reset;
        } else if !switches.contains_key("c") {
            *counter += 1;
        }
        if switches.contains_key("h") {
            String::new()
        } else {
            counter.to_string()
        }
    }

    fn resolve_run(&mut self, run: &mut Run) {
        let Some(code) = &run.field else { return };
        run.text = self.display_text(code);
        if code.kind == FieldKind::Hyperlink && run.link.is_none() {
            run.link = code.properties.url.clone();
        }
    }

    fn resolve_blocks(&mut self, blocks: &mut [Block]) {
        for block in blocks {
            match block {
                Block::Table(table) => {
                    for cell in table.rows.iter_mut().flat_map(|r| r.cells.iter_mut()) {
                        self.resolve_blocks(&mut cell.blocks);
                    }
                }
                other => {
                    if let Some(p) = other.paragraph_mut() {
                        p.runs.iter_mut().for_each(|run| self.resolve_run(run));
                    }
                }
            }
        }
    }
}

fn bracketed(instruction: &str) -> String {
    if instruction.is_empty() {
        String::new()
    } else {
        format!("[{instruction}]")
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Evaluates `= 2 * (3 + 4)` style arithmetic. Formatting switches are
/// ignored; anything else (bookmarks, `SUM(ABOVE)`) yields `None`.
fn evaluate_formula(instruction: &str) -> Option<f64> {
    let expr = instruction.strip_prefix('=')?;
    let expr = expr.split('\\').next().unwrap_or("");
    let mut parser = Arithmetic {
        chars: expr.chars().filter(|c| !c.is_whitespace()).collect(),
        pos: 0,
    };
    let value = parser.expr()?;
    (parser.pos == parser.chars.len() && value.is_finite()).then_some(value)
}

struct Arithmetic {
    chars: Vec<char>,
    pos: usize,
}

impl Arithmetic {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn expr(&mut self) -> Option<f64> {
        let mut value = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Some(value)
    }

    fn term(&mut self) -> Option<f64> {
        let mut value = self.factor()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            value = if op == '*' { value * rhs } else { value / rhs };
        }
        Some(value)
    }

    fn factor(&mut self) -> Option<f64> {
        match self.peek()? {
            '-' => {
                self.pos += 1;
                self.factor().map(|v| -v)
            }
            '(' => {
                self.pos += 1;
                let value = self.expr()?;
                (self.peek() == Some(')')).then(|| self.pos += 1)?;
                Some(value)
            }
            _ => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
                    self.pos += 1;
                }
                let literal: String = self.chars[start..self.pos].iter().collect();
                literal.parse::<f64>().ok()
            }
        }
    }
}

/// Replaces each field run's text with its display text. Runs in headers,
/// footers and notes are resolved too; SEQ numbering follows document order.
pub fn resolve_fields(mut doc: ParsedDocument, ctx: &FieldContext) -> ParsedDocument {
    let mut resolver = FieldResolver::new(ctx);
    resolver.resolve_blocks(&mut doc.blocks);
    for hf in doc
        .headers
        .variants
        .values_mut()
        .chain(doc.footers.variants.values_mut())
    {
        resolver.resolve_blocks(&mut hf.blocks);
    }
    for note in &mut doc.notes {
        resolver.resolve_blocks(&mut note.blocks);
    }
    doc
}
