//! Formats lookup results for the terminal.
//!
//! All output is returned without a trailing newline.
use std::fmt::Write;

use docsearch_service::faq::Faq;
use docsearch_service::search::{Match, Record};

const DOCS_REPOSITORY: &str = "https://github.com/SquidDev-CC/CC-Tweaked";
const FAQ_REPOSITORY: &str = "https://github.com/SquidDev-CC/FAQBot-CC";

/// The title a record is displayed with.
///
/// Index entries carry their own display name, which falls back to the identifier.
fn title(record: &Record) -> &str {
    record.field("name").unwrap_or(&record.name)
}

fn write_record(out: &mut String, record: &Record, link: Option<&str>) {
    match link {
        Some(link) => writeln!(out, "{}: {}", title(record), link),
        None => writeln!(out, "{}", title(record)),
    }
    .ok();
    if let Some(summary) = &record.summary {
        writeln!(out, "{summary}").ok();
    }
}

/// Formats the result of resolving `query`, using `link` to link to the matched record.
pub fn format_match(
    result: &Match,
    query: &str,
    link: impl Fn(&Record) -> Option<String>,
) -> String {
    let mut out = String::new();
    match result {
        Match::Exact(record) => write_record(&mut out, record, link(record).as_deref()),
        Match::Approximate { record, query } => {
            writeln!(out, "Cannot find '{query}', using '{}' instead.", record.name).ok();
            write_record(&mut out, record, link(record).as_deref());
        }
        Match::NotFound => {
            writeln!(
                out,
                "Cannot find method '{query}'. Please check your spelling, or contribute to the \
                 documentation at {DOCS_REPOSITORY}."
            )
            .ok();
        }
    }
    out.trim_end().to_owned()
}

/// Formats the FAQs found for a search.
pub fn format_faqs(faqs: &[&Faq]) -> String {
    let mut out = String::new();
    if faqs.is_empty() {
        writeln!(
            out,
            "Sorry, I did not find any faqs related to your search.\n\
             Please contribute to expand my faq list: {FAQ_REPOSITORY}"
        )
        .ok();
        return out.trim_end().to_owned();
    }

    writeln!(out, "I found the following {} faq(s)", faqs.len()).ok();
    for faq in faqs {
        writeln!(out, "\n# {}\n{}", faq.title, faq.contents).ok();
    }
    out.trim_end().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, fields: &[(&str, &str)]) -> Record {
        Record {
            name: name.into(),
            summary: Some("Opens a file for reading or writing.".into()),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), (*v).into()))
                .collect(),
        }
    }

    fn doc_link(record: &Record) -> Option<String> {
        record.field("url").map(|url| format!("https://tweaked.cc/{url}"))
    }

    #[test]
    fn test_exact() {
        let record = record("fs.open", &[("url", "module/fs.html#v:open")]);
        let out = format_match(&Match::Exact(record), "fs.open", doc_link);
        insta::assert_snapshot!(out, @r"
        fs.open: https://tweaked.cc/module/fs.html#v:open
        Opens a file for reading or writing.
        ");
    }

    #[test]
    fn test_approximate_uses_display_name() {
        let record = record("FS.open", &[("name", "fs.open")]);
        let result = Match::Approximate {
            record,
            query: "fs.opne".into(),
        };
        let out = format_match(&result, "fs.opne", doc_link);
        insta::assert_snapshot!(out, @r"
        Cannot find 'fs.opne', using 'FS.open' instead.
        fs.open
        Opens a file for reading or writing.
        ");
    }

    #[test]
    fn test_not_found() {
        let out = format_match(&Match::NotFound, "peripheral.wrapp", doc_link);
        insta::assert_snapshot!(out, @"Cannot find method 'peripheral.wrapp'. Please check your spelling, or contribute to the documentation at https://github.com/SquidDev-CC/CC-Tweaked.");
    }

    #[test]
    fn test_faqs() {
        let startup = Faq {
            name: "startup".into(),
            title: "Running programs on startup".into(),
            search: "startup".into(),
            contents: "Name it `startup.lua`.".into(),
        };
        let http = Faq {
            name: "http".into(),
            title: "Enabling HTTP".into(),
            search: "http".into(),
            contents: "Edit the config.".into(),
        };

        insta::assert_snapshot!(format_faqs(&[&startup, &http]), @r"
        I found the following 2 faq(s)

        # Running programs on startup
        Name it `startup.lua`.

        # Enabling HTTP
        Edit the config.
        ");

        insta::assert_snapshot!(format_faqs(&[]), @r"
        Sorry, I did not find any faqs related to your search.
        Please contribute to expand my faq list: https://github.com/SquidDev-CC/FAQBot-CC
        ");
    }
}
