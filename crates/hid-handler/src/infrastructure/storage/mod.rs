//! Storage infrastructure: configuration and layout files.
//!
//! - `config` reads and writes the TOML configuration file from the
//!   platform-appropriate directory, with defaults on first run.
//! - `layouts` reads keyboard layout tables from JSON, YAML and
//!   `key=value` properties files and fills a
//!   [`LayoutRegistry`](hid_handler_core::LayoutRegistry).

pub mod config;
pub mod layouts;
