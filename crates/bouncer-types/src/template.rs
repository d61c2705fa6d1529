//! Typed message templates.
//!
//! Outbound messages are configured as text with a fixed set of
//! placeholders. Templates are parsed once at config load so a typo such as
//! `{titel}` is rejected up front instead of being sent verbatim.

use std::fmt;

use crate::errors::BouncerError;

/// The placeholders a template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// Display name of the group.
    Title,
    /// Link to the verification help page.
    Help,
    /// Link to the group rules.
    Rules,
}

impl Placeholder {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "title" => Some(Placeholder::Title),
            "help" => Some(Placeholder::Help),
            "rules" => Some(Placeholder::Rules),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Placeholder::Title => "title",
            Placeholder::Help => "help",
            Placeholder::Rules => "rules",
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Placeholder),
}

/// Values substituted into a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateParams<'a> {
    pub title: &'a str,
    pub help: &'a str,
    pub rules: &'a str,
}

impl TemplateParams<'_> {
    fn value(&self, placeholder: Placeholder) -> &str {
        match placeholder {
            Placeholder::Title => self.title,
            Placeholder::Help => self.help,
            Placeholder::Rules => self.rules,
        }
    }
}

/// A parsed message template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    segments: Vec<Segment>,
}

impl MessageTemplate {
    /// Parse a template, accepting only the placeholders in `allowed`.
    ///
    /// Braces that do not enclose a lowercase identifier (for example a
    /// literal `{ }` or `{}`) are kept as text.
    pub fn parse(source: &str, allowed: &[Placeholder]) -> Result<Self, BouncerError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let name_len = after
                .find(|c: char| !(c.is_ascii_lowercase() || c == '_'))
                .unwrap_or(after.len());
            let name = &after[..name_len];

            if name.is_empty() {
                literal.push('{');
                rest = after;
                continue;
            }
            if !after[name_len..].starts_with('}') {
                return Err(BouncerError::Config(format!(
                    "unterminated placeholder '{{{name}' in message template"
                )));
            }

            let placeholder = Placeholder::parse(name)
                .filter(|p| allowed.contains(p))
                .ok_or_else(|| {
                    let names: Vec<String> = allowed.iter().map(|p| p.to_string()).collect();
                    BouncerError::Config(format!(
                        "unknown placeholder '{{{name}}}' in message template (allowed: {})",
                        names.join(", ")
                    ))
                })?;

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Slot(placeholder));
            rest = &after[name_len + 1..];
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Placeholders referenced by this template, in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Slot(p) => Some(*p),
            Segment::Literal(_) => None,
        })
    }

    /// Render the template. Substituted values are HTML-escaped since
    /// messages are sent with HTML markup enabled.
    pub fn render(&self, params: &TemplateParams<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(p) => push_escaped(&mut out, params.value(*p)),
            }
        }
        out
    }
}

fn push_escaped(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
}
