//! # Configuration
//!
//! Layered settings: built-in defaults, then `config/default.toml` and
//! `config/{RUN_ENV}.toml`, then `APP__`-prefixed environment variables, then
//! the flat variables operators usually set (`DATABASE_URL`, `JWT_SECRET`,
//! `CORS_ORIGINS`, `MEDIA_UPLOAD_URL`, ...). A `.env` file is read first when
//! present.
//!
//! ```rust,ignore
//! use messenger_server::config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("gateway on {}:{}", settings.server.host, settings.server.port);
//! ```

mod settings;

pub use settings::*;
