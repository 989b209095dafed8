//! Configuration management for Mirra.
//!
//! Engine preferences ([`settings::Config`]) are stored as a TOML file and
//! loaded at startup. Every field has a default, so a missing file is not
//! an error for the front end.

pub mod settings;
