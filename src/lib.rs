#![forbid(unsafe_code)]

pub mod asset;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod detail;
pub mod error;
pub mod feed;
pub mod formats;
pub mod logging;
pub mod request;
pub mod store;
pub mod transport;

pub use error::{Error, Result, TemplateError, TransportError};
