//! Utility modules: numeric conversions and developer-level logging.
pub mod devlog;
pub mod num;
