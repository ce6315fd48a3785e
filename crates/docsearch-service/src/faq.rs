//! Frequently asked questions, loaded from a directory of markdown files.
//!
//! Every FAQ is a markdown file starting with YAML front matter:
//!
//! ```markdown
//! ---
//! title: Why does my program not run?
//! search: (not|n't) (run|start)
//! ---
//! Check the error message first.
//! ```
//!
//! FAQs are found by matching a regular expression against their `search` field.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

/// A template for new FAQs, which is not loaded.
const EXAMPLE_FILE: &str = "example.md";

static FRONT_MATTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A---\n(.*?)\n---\n(.*)\z").unwrap());

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Faq {
    /// The file name without its extension and with all dots removed.
    pub name: String,
    pub title: String,
    /// The text that search patterns are matched against.
    pub search: String,
    /// The markdown body.
    pub contents: String,
}

#[derive(Deserialize)]
struct FrontMatter {
    title: String,
    search: String,
}

/// Loads a single FAQ.
///
/// Returns `Ok(None)` if the file is the example template, or if it has no valid front matter.
pub fn load_file(path: &Path) -> Result<Option<Faq>> {
    let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
        tracing::error!(path = %path.display(), "FAQ file name is not valid UTF-8");
        return Ok(None);
    };
    if file_name == EXAMPLE_FILE {
        tracing::info!("Skipping example file");
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read FAQ `{}`", path.display()))?
        .replace("\r\n", "\n");

    let Some(captures) = FRONT_MATTER.captures(&contents) else {
        tracing::error!(file = file_name, "No front matter in FAQ");
        return Ok(None);
    };

    let front: FrontMatter = match serde_yaml::from_str(&captures[1]) {
        Ok(front) => front,
        Err(e) => {
            tracing::error!(
                error = &e as &dyn std::error::Error,
                file = file_name,
                "Cannot parse front matter of FAQ"
            );
            return Ok(None);
        }
    };

    let stem = file_name.strip_suffix(".md").unwrap_or(file_name);
    Ok(Some(Faq {
        name: stem.replace('.', ""),
        title: front.title,
        search: front.search,
        contents: captures[2].trim().to_owned(),
    }))
}

/// Loads all `*.md` FAQs in `dir`, ordered by file name.
pub fn load_dir(dir: &Path) -> Result<Vec<Faq>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read FAQ directory `{}`", dir.display()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "md") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut faqs = Vec::with_capacity(paths.len());
    for path in paths {
        if let Some(faq) = load_file(&path)? {
            faqs.push(faq);
        }
    }

    tracing::info!("Loaded {} FAQs", faqs.len());
    Ok(faqs)
}

/// Returns all FAQs whose `search` field matches the regular expression `pattern`.
pub fn search<'a>(faqs: &'a [Faq], pattern: &str) -> Result<Vec<&'a Faq>, regex::Error> {
    let regex = Regex::new(pattern)?;
    let found: Vec<_> = faqs.iter().filter(|faq| regex.is_match(&faq.search)).collect();

    if found.is_empty() {
        tracing::warn!(search = pattern, "event=faq.missing");
        metric!(counter("faq.search") += 1, "result" => "not_found");
    } else {
        tracing::info!(search = pattern, results = found.len(), "event=faq");
        metric!(counter("faq.search") += 1, "result" => "found");
    }

    Ok(found)
}
