use super::properties::Properties;
use std::fmt::Write;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateToken {
    Text(String),
    Property {
        name: String,
        /// Original placeholder text including braces, used when the property is missing.
        raw: String,
    },
}

/// A parsed message template such as `"Order {OrderId} placed by {@User}"`.
///
/// Parsing never fails: anything that is not a well-formed placeholder is kept
/// as literal text.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageTemplate {
    text: Arc<str>,
    tokens: Arc<[TemplateToken]>,
}

impl MessageTemplate {
    pub fn parse(text: &str) -> Self {
        Self {
            text: Arc::from(text),
            tokens: tokenize(text).into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[TemplateToken] {
        &self.tokens
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|t| match t {
            TemplateToken::Property { name, .. } => Some(name.as_str()),
            TemplateToken::Text(_) => None,
        })
    }

    /// Substitute properties into the template. Missing properties are kept verbatim.
    pub fn render(&self, properties: &Properties) -> String {
        let mut out = String::with_capacity(self.text.len() + 16);
        for token in self.tokens.iter() {
            match token {
                TemplateToken::Text(text) => out.push_str(text),
                TemplateToken::Property { name, raw } => match properties.get(name) {
                    Some(value) => {
                        let _ = write!(out, "{value}");
                    }
                    None => out.push_str(raw),
                },
            }
        }
        out
    }
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self::parse("")
    }
}

impl From<&str> for MessageTemplate {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl From<String> for MessageTemplate {
    fn from(text: String) -> Self {
        Self::parse(&text)
    }
}

fn tokenize(text: &str) -> Vec<TemplateToken> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(pos) = rest.find(['{', '}']) {
        literal.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            literal.push('{');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with("}}") {
            literal.push('}');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            literal.push('}');
            rest = &tail[1..];
            continue;
        }

        // Opening brace: look for the matching close.
        let Some(close) = tail.find('}') else {
            literal.push_str(tail);
            rest = "";
            break;
        };
        let raw = &tail[..=close];
        match parse_property_name(&tail[1..close]) {
            Some(name) => {
                if !literal.is_empty() {
                    tokens.push(TemplateToken::Text(std::mem::take(&mut literal)));
                }
                tokens.push(TemplateToken::Property {
                    name: name.to_string(),
                    raw: raw.to_string(),
                });
            }
            None => literal.push_str(raw),
        }
        rest = &tail[close + 1..];
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        tokens.push(TemplateToken::Text(literal));
    }
    tokens
}

fn parse_property_name(inner: &str) -> Option<&str> {
    let inner = inner
        .strip_prefix('@')
        .or_else(|| inner.strip_prefix('$'))
        .unwrap_or(inner);
    let end = inner.find([',', ':']).unwrap_or(inner.len());
    let name = &inner[..end];

    let valid = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    valid.then_some(name)
}
