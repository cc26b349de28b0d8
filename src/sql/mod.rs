//! Postgres plumbing for dynamic statements: bound argument values, placeholder
//! rewriting and row decoding.

pub mod params;
mod placeholders;
mod rows;

pub use params::*;
pub use placeholders::numbered_placeholders;
pub use rows::row_to_json;
