#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod download;
pub mod faq;
pub mod logging;
pub mod search;
pub mod utils;
