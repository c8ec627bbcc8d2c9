pub mod lexer;
pub mod normalize;
pub mod parser;
pub mod types;

pub use parser::ConfigError;
pub use types::{Config, LocationConfig, ServerConfig};

use std::fs;
use std::io::ErrorKind;

impl Config {
    /// Loads a configuration file. A missing file is not an error: a single
    /// default server on port 8080 is used instead.
    pub fn load(path: &str) -> Result<Config, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let mut servers = vec![ServerConfig::default()];
                normalize::normalize(&mut servers);
                return Ok(Config { servers });
            }
            Err(e) => {
                return Err(ConfigError {
                    message: format!("cannot read {}: {}", path, e),
                    line: 0,
                });
            }
        };
        Config::parse_str(&text)
    }

    pub fn parse_str(text: &str) -> Result<Config, ConfigError> {
        let tokens = lexer::tokenize(text);
        let mut servers = parser::Parser::new(tokens).parse()?;
        if servers.is_empty() {
            servers.push(ServerConfig::default());
        }
        normalize::normalize(&mut servers);
        Ok(Config { servers })
    }
}
