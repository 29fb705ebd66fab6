//! Configuration management
//!
//! Loads heptap.toml into an immutable snapshot shared by the decoder, the
//! maintenance tasks and the logging setup.

mod types;
mod validation;

pub use types::*;
pub use validation::{validate, ValidationResult};

use crate::{Error, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

/// Parse configuration from TOML text
pub fn parse(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[decoder]\nmode = \"sipdns\"\nreassembly = true\n\n[log]\nformat = \"json\""
        )
        .unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.decoder.mode, Mode::SipDns);
        assert!(config.decoder.reassembly);
        assert_eq!(config.log.format, "json");
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_load_missing_file() {
        let err = load("/nonexistent/heptap.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_parse_invalid_toml() {
        let err = parse("[decoder\nmode = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
