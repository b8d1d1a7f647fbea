//! Configuration for the formatters, parsers and the CLI.

mod settings;

pub use settings::{ODataSettings, Settings, SettingsError, SqlSettings};
