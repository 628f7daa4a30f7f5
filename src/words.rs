use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// A named category of words, e.g. `"male_names"` and its members.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordGroup {
    pub name: String,
    pub words: Vec<String>,
}

impl WordGroup {
    pub fn new(
        name: impl Into<String>,
        words: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            words: words.into_iter().map(Into::into).collect(),
        }
    }
}

pub fn total_words(groups: &[WordGroup]) -> usize {
    groups.iter().map(|group| group.words.len()).sum()
}

/// Parse a word-group document: a JSON object mapping group name to an array of words.
/// Groups keep the document's key order.
pub fn parse_word_groups(raw: &str) -> Result<Vec<WordGroup>> {
    let value: Value = serde_json::from_str(raw).context("invalid JSON")?;
    let Value::Object(map) = value else {
        return Err(anyhow!("expected a JSON object of group name -> word list"));
    };

    let mut groups = Vec::with_capacity(map.len());
    for (name, entry) in map {
        let Value::Array(items) = entry else {
            return Err(anyhow!("group '{name}' is not an array of words"));
        };
        let mut words = Vec::with_capacity(items.len());
        for (idx, item) in items.into_iter().enumerate() {
            match item {
                Value::String(word) => words.push(word),
                other => {
                    return Err(anyhow!(
                        "group '{name}' word #{idx} is not a string: {other}"
                    ))
                }
            }
        }
        groups.push(WordGroup { name, words });
    }
    Ok(groups)
}

pub fn load_word_groups(path: &Path) -> Result<Vec<WordGroup>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading word file {}", path.display()))?;
    let groups = parse_word_groups(&raw)
        .with_context(|| format!("malformed word file {}", path.display()))?;
    if groups.is_empty() {
        tracing::warn!("word file {} has no groups", path.display());
    }
    tracing::debug!(
        path = %path.display(),
        groups = groups.len(),
        words = total_words(&groups),
        "loaded word groups"
    );
    Ok(groups)
}
