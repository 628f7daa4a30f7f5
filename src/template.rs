//! Message templates with named `{placeholder}` slots.
//!
//! `{name}` is a slot, `{{` and `}}` are literal braces. Only two names are ever bound,
//! the target label and the attribute label, so a template is checked against those
//! labels once at load instead of failing per prompt.

use crate::combinations::ParameterRecord;
use anyhow::{Context, Result};
use core::fmt;
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemplateError {
    UnmatchedOpenBrace { offset: usize },
    UnmatchedCloseBrace { offset: usize },
    UnknownPlaceholder { name: String, expected: Vec<String> },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnmatchedOpenBrace { offset } => {
                write!(f, "unmatched '{{' at byte {offset}")
            }
            Self::UnmatchedCloseBrace { offset } => {
                write!(f, "single '}}' encountered at byte {offset}")
            }
            Self::UnknownPlaceholder { name, expected } => write!(
                f,
                "template references placeholder '{{{name}}}' but only [{}] are bound",
                expected.join(", ")
            ),
        }
    }
}

impl std::error::Error for TemplateError {}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(String),
}

/// One label and the word substituted for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding<'a> {
    pub label: &'a str,
    pub value: &'a str,
}

/// The two substitutions made into every prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bindings<'a> {
    pub target: Binding<'a>,
    pub attribute: Binding<'a>,
}

impl<'a> Bindings<'a> {
    pub fn from_record(record: &'a ParameterRecord) -> Self {
        Self {
            target: Binding {
                label: &record.target_type,
                value: &record.target_word,
            },
            attribute: Binding {
                label: &record.attribute_type,
                value: &record.attribute_word,
            },
        }
    }

    fn lookup(&self, name: &str) -> Option<&'a str> {
        if name == self.attribute.label {
            Some(self.attribute.value)
        } else if name == self.target.label {
            Some(self.target.value)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((offset, ch)) = chars.next() {
            match ch {
                '{' => {
                    if chars.next_if(|&(_, next)| next == '{').is_some() {
                        literal.push('{');
                        continue;
                    }
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        match inner {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err(TemplateError::UnmatchedOpenBrace { offset }),
                            other => name.push(other),
                        }
                    }
                    if !closed {
                        return Err(TemplateError::UnmatchedOpenBrace { offset });
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(name));
                }
                '}' => {
                    if chars.next_if(|&(_, next)| next == '}').is_some() {
                        literal.push('}');
                    } else {
                        return Err(TemplateError::UnmatchedCloseBrace { offset });
                    }
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading template {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("malformed template {}", path.display()))
    }

    /// Placeholder names in order of first appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Slot(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name.as_str());
                }
            }
        }
        names
    }

    /// Fails if the template names a placeholder other than the two labels. Labels the
    /// template never uses are fine.
    pub fn check_labels(
        &self,
        target_label: &str,
        attribute_label: &str,
    ) -> Result<(), TemplateError> {
        for name in self.placeholders() {
            if name != target_label && name != attribute_label {
                return Err(TemplateError::UnknownPlaceholder {
                    name: name.to_string(),
                    expected: vec![attribute_label.to_string(), target_label.to_string()],
                });
            }
        }
        Ok(())
    }

    pub fn render(&self, bindings: &Bindings<'_>) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(name) => {
                    let value = bindings.lookup(name).ok_or_else(|| {
                        TemplateError::UnknownPlaceholder {
                            name: name.clone(),
                            expected: vec![
                                bindings.attribute.label.to_string(),
                                bindings.target.label.to_string(),
                            ],
                        }
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    pub fn render_record(&self, record: &ParameterRecord) -> Result<String, TemplateError> {
        self.render(&Bindings::from_record(record))
    }
}
