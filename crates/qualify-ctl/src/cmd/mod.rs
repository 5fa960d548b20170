//! CLI command modules.

pub mod contacts;
pub mod http;
pub mod qualify;
pub mod status;
