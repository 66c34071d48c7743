pub mod analyzers;
pub mod config;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod holidays;
pub mod output;
pub mod window;
