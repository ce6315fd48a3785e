//! Exposes the command line application.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docsearch_service::config::Config;
use docsearch_service::metrics;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::app::{Docsearch, LinkKind};
use crate::logging;

/// Docsearch commands.
#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Searches for a function by name and links to its documentation.
    #[command(alias = "d")]
    Doc {
        /// The function to look up. Misspelled names are corrected if the intent is clear.
        #[arg(required = true)]
        query: Vec<String>,
    },

    /// Searches for a function by name and links to its source code.
    #[command(alias = "s")]
    Source {
        /// The function to look up.
        #[arg(required = true)]
        query: Vec<String>,
    },

    /// Retrieves FAQs whose keywords match a regular expression.
    #[command(alias = "f")]
    Faq {
        /// The regular expression to search for.
        #[arg(required = true)]
        pattern: Vec<String>,
    },

    /// Reads commands such as `doc fs.open` from stdin, one per line.
    ///
    /// The documentation index is kept in memory between commands and revalidated once its TTL
    /// has passed.
    Shell,
}

/// Looks up functions and FAQs of a documentation index.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config()).context("failed loading config")?;

    let _sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: sentry::release_name!(),
        ..Default::default()
    });

    // SAFETY: No runtime or other threads have been started yet.
    unsafe { logging::init_logging(&config) };

    if let Some(ref statsd) = config.metrics.statsd {
        let tags = config.metrics.custom_tags.clone();
        if let Err(error) = metrics::configure_statsd(&config.metrics.prefix, statsd, tags) {
            tracing::error!(error = ?error, "Failed to configure metrics");
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("docsearch")
        .enable_all()
        .build()
        .context("failed to start the runtime")?;

    runtime.block_on(run(cli.command, &config))
}

async fn run(command: Command, config: &Config) -> Result<()> {
    let app = Docsearch::new(config)?;

    match command {
        Command::Doc { query } => {
            println!("{}", app.lookup(LinkKind::Doc, &query.join(" ")).await?)
        }
        Command::Source { query } => {
            println!("{}", app.lookup(LinkKind::Source, &query.join(" ")).await?)
        }
        Command::Faq { pattern } => println!("{}", app.faq(&pattern.join(" "))?),
        Command::Shell => shell(&app).await?,
    }

    Ok(())
}

/// A line read by the shell.
#[derive(Debug, PartialEq, Eq)]
enum ShellCommand<'a> {
    Lookup(LinkKind, &'a str),
    Faq(&'a str),
    Empty,
    Invalid(&'a str),
}

fn parse_shell_command(line: &str) -> ShellCommand<'_> {
    let line = line.trim();
    if line.is_empty() {
        return ShellCommand::Empty;
    }

    let (command, argument) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let argument = argument.trim();
    if argument.is_empty() {
        return ShellCommand::Invalid(command);
    }

    match command {
        "doc" | "d" => ShellCommand::Lookup(LinkKind::Doc, argument),
        "source" | "s" => ShellCommand::Lookup(LinkKind::Source, argument),
        "faq" | "f" => ShellCommand::Faq(argument),
        _ => ShellCommand::Invalid(command),
    }
}

async fn shell(app: &Docsearch) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let output = match parse_shell_command(&line) {
            ShellCommand::Lookup(kind, query) => app.lookup(kind, query).await,
            ShellCommand::Faq(pattern) => app.faq(pattern),
            ShellCommand::Empty => continue,
            ShellCommand::Invalid(command) => {
                eprintln!("unknown command `{command}`, expected `doc`, `source` or `faq`");
                continue;
            }
        };

        match output {
            Ok(output) => println!("{output}\n"),
            Err(error) => logging::ensure_log_error(&error),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let cli = Cli::try_parse_from(["docsearch", "doc", "fs", "open"]).unwrap();
        assert!(cli.config().is_none());
        assert!(matches!(cli.command, Command::Doc { query } if query == ["fs", "open"]));

        let cli =
            Cli::try_parse_from(["docsearch", "faq", "boot", "--config", "docsearch.yml"]).unwrap();
        assert_eq!(cli.config(), Some(Path::new("docsearch.yml")));
        assert!(matches!(cli.command, Command::Faq { pattern } if pattern == ["boot"]));

        assert!(Cli::try_parse_from(["docsearch", "source"]).is_err());
    }

    #[test]
    fn test_parse_shell_command() {
        assert_eq!(
            parse_shell_command("doc fs.open"),
            ShellCommand::Lookup(LinkKind::Doc, "fs.open")
        );
        assert_eq!(
            parse_shell_command("  s   turtle.forward() "),
            ShellCommand::Lookup(LinkKind::Source, "turtle.forward()")
        );
        assert_eq!(parse_shell_command("faq startup|boot"), ShellCommand::Faq("startup|boot"));
        assert_eq!(parse_shell_command("   "), ShellCommand::Empty);
        assert_eq!(parse_shell_command("doc"), ShellCommand::Invalid("doc"));
        assert_eq!(parse_shell_command("eval print(1)"), ShellCommand::Invalid("eval"));
    }
}
