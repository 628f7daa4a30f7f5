use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::path::Path;

/// Non-empty, trimmed value of an environment variable.
pub fn read_env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// A placeholder label must be usable as `{label}` inside a template.
pub fn parse_label(label: &str) -> Result<String> {
    let s = label.trim();
    if s.is_empty() {
        return Err(anyhow!("empty placeholder label"));
    }
    if s.contains(['{', '}']) {
        return Err(anyhow!("placeholder label may not contain braces: {s}"));
    }
    Ok(s.to_string())
}

pub fn parse_labels(target: &str, attribute: &str) -> Result<(String, String)> {
    let target = parse_label(target).context("invalid --target-type")?;
    let attribute = parse_label(attribute).context("invalid --attribute-type")?;
    if target == attribute {
        return Err(anyhow!(
            "target and attribute labels must differ (both are '{target}')"
        ));
    }
    Ok((target, attribute))
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }
    Ok(())
}
