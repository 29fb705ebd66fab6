//! Configuration validation

use super::Config;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_decoder(config, &mut result);
    validate_maintenance(config, &mut result);
    validate_dedup(config, &mut result);
    validate_log(config, &mut result);

    result
}

fn validate_decoder(config: &Config, result: &mut ValidationResult) {
    let decoder = &config.decoder;

    if decoder.queue_capacity == 0 {
        result.error("decoder.queue_capacity: must be greater than 0");
    }

    let (_, invalid) = decoder.discard_src_addrs();
    for entry in invalid {
        result.error(format!(
            "decoder.discard_src_ips: '{}' is not an IP address",
            entry
        ));
    }

    if !decoder.dedup && config.dedup.ttl_ms != 400 {
        result.warn("dedup.ttl_ms: set but decoder.dedup is disabled");
    }
}

fn validate_maintenance(config: &Config, result: &mut ValidationResult) {
    let m = &config.maintenance;
    for (name, value) in [
        ("fragment_gc_interval_secs", m.fragment_gc_interval_secs),
        ("fragment_timeout_secs", m.fragment_timeout_secs),
        ("tcp_flush_interval_secs", m.tcp_flush_interval_secs),
        ("stats_interval_secs", m.stats_interval_secs),
    ] {
        if value == 0 {
            result.error(format!("maintenance.{}: must be greater than 0", name));
        }
    }
}

fn validate_dedup(config: &Config, result: &mut ValidationResult) {
    if config.dedup.ttl_ms > 1000 {
        result.warn(format!(
            "dedup.ttl_ms: {} ms may suppress genuine retransmissions",
            config.dedup.ttl_ms
        ));
    }
    if config.decoder.dedup && config.dedup.capacity_bytes == 0 {
        result.error("dedup.capacity_bytes: must be greater than 0 when dedup is enabled");
    }
}

fn validate_log(config: &Config, result: &mut ValidationResult) {
    let level = config.log.level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        result.warn(format!(
            "log.level: unknown level '{}', using info",
            config.log.level
        ));
    }
    if !LOG_FORMATS.contains(&config.log.format.as_str()) {
        result.warn(format!(
            "log.format: unknown format '{}', using pretty",
            config.log.format
        ));
    }
}
