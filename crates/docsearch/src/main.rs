//! Docsearch.
//!
//! Looks up functions in a remote documentation index, correcting misspelled names where the
//! intended function is clear, and searches a local collection of FAQs.

#![warn(
    missing_debug_implementations,
    unused_crate_dependencies,
    clippy::all
)]

mod app;
mod cli;
mod logging;
mod output;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
