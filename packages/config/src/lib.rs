// ABOUTME: Configuration loading for Berth packages
// ABOUTME: Environment variable names, .env loading and typed parsing helpers

pub mod constants;
pub mod env;

pub use constants::*;
pub use env::{env_list, env_opt, env_or, env_parse_or, load_dotenv, ConfigError};
