//! Prompt configuration
//!
//! The prompt list is a line-oriented file, one `bucket-id sentence` pair
//! per line. Blank lines and `#` comments are ignored; a mis-formatted
//! line or a reused bucket id is dropped with a warning rather than
//! aborting startup. An empty result is fatal: there is nothing to record.

use anyhow::{Context, Result, ensure};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::warn;

/// One sentence to read aloud and the bucket its recordings land in.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub id: String,
    pub text: String,
}

/// Load the prompt list, preserving file order.
pub fn load_prompts(path: &Path) -> Result<Vec<Prompt>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read prompt file {}", path.display()))?;

    let mut prompts = Vec::new();
    let mut seen = HashSet::new();

    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let Some((id, text)) = split_prompt_line(trimmed) else {
            warn!(line = trimmed, "ignoring mis-formatted prompt line");
            continue;
        };

        if !seen.insert(id.to_string()) {
            warn!(bucket = id, "ignoring prompt line, bucket id already in use");
            continue;
        }

        prompts.push(Prompt {
            id: id.to_string(),
            text: text.to_string(),
        });
    }

    ensure!(
        !prompts.is_empty(),
        "no prompts defined in {}",
        path.display()
    );
    Ok(prompts)
}

/// Split `id<whitespace>text`. The id doubles as a directory name, so it
/// is restricted to word characters.
fn split_prompt_line(line: &str) -> Option<(&str, &str)> {
    let (id, rest) = line.split_once(char::is_whitespace)?;
    let id_ok = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    let text = rest.trim_start();
    (id_ok && !text.is_empty()).then_some((id, text))
}
