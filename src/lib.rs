use std::error::Error;

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod filter;
pub mod http;
pub mod metrics;
pub mod model;
pub mod pinboard;
pub mod reader;
pub mod sync;

pub fn unpack_error(err: &(dyn Error)) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}
