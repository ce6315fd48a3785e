use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::fmt::{MakeWriter, fmt};
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::SubscriberInitExt;

/// The default `RUST_LOG` filter for the configured log level.
///
/// HTTP internals are kept quiet unless tracing is requested.
pub fn default_env_filter(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::OFF => "",
        LevelFilter::ERROR => "ERROR",
        LevelFilter::WARN => "WARN",
        LevelFilter::INFO => {
            "INFO,\
             hyper=WARN,\
             reqwest=WARN"
        }
        LevelFilter::DEBUG => {
            "INFO,\
             hyper=WARN,\
             docsearch=DEBUG,\
             docsearch_service=DEBUG"
        }
        LevelFilter::TRACE => {
            "INFO,\
             docsearch=TRACE,\
             docsearch_service=TRACE"
        }
    }
}

/// Installs a global subscriber writing one JSON object per event to `make_writer`.
///
/// Events are also forwarded to Sentry, if a client is bound.
pub fn init_json_logging<W>(env_filter: &str, make_writer: W)
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    fmt()
        .with_timer(UtcTime::rfc_3339())
        .with_target(true)
        .with_env_filter(env_filter)
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(make_writer)
        .finish()
        .with(sentry::integrations::tracing::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_env_filter() {
        assert_eq!(default_env_filter(LevelFilter::OFF), "");
        assert_eq!(default_env_filter(LevelFilter::INFO), "INFO,hyper=WARN,reqwest=WARN");
        assert!(default_env_filter(LevelFilter::TRACE).contains("docsearch_service=TRACE"));
    }
}
