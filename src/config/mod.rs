//! # Configuration Module
//!
//! Settings are read from, in increasing priority:
//! - built-in defaults
//! - `config/default.toml` and `config/{RUN_ENV}.toml`
//! - environment variables prefixed with `APP__` (and a few plain ones)
//! - `.env` files (via dotenvy)
//!
//! ```rust,ignore
//! use social_chat::config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("Listening on {}", settings.server_addr());
//! ```

mod settings;

pub use settings::*;
