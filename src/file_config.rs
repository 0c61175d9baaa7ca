//! INI configuration loading for the producer.
//!
//! Settings live in a `[producer]` section:
//!
//! ```ini
//! [producer]
//! host = scribe.internal
//! port = 1463
//! flush_interval_ms = 200
//! max_queue_buffer = 32768
//! ```
//!
//! Unknown keys are rejected so typos surface at start-up rather than being
//! silently ignored. Values are validated by [`ProducerBuilder`].

use std::{fs, io::ErrorKind, path::Path, str::FromStr};

use ini::Ini;

use crate::producer::{ProducerBuildError, ProducerBuilder};

/// Name of the section holding producer settings.
pub const PRODUCER_SECTION: &str = "producer";

/// Load a builder from an INI file on disk.
pub fn load_config(path: impl AsRef<Path>) -> Result<ProducerBuilder, ProducerBuildError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => ProducerBuildError::InvalidConfig(format!(
            "{} doesn't exist",
            path.display()
        )),
        _ => ProducerBuildError::Io(err),
    })?;
    parse_config(&text)
}

/// Parse INI text into a builder.
pub fn parse_config(text: &str) -> Result<ProducerBuilder, ProducerBuildError> {
    let ini = Ini::load_from_str(text).map_err(ini::Error::Parse)?;
    let section = ini.section(Some(PRODUCER_SECTION)).ok_or_else(|| {
        ProducerBuildError::InvalidConfig(format!("missing [{PRODUCER_SECTION}] section"))
    })?;

    let mut builder = ProducerBuilder::new();
    for (key, value) in section.iter() {
        let value = value.trim();
        builder = match key {
            "host" => {
                builder.set_host(value.to_owned());
                builder
            }
            "port" => {
                builder.set_port(parse_value(key, value)?);
                builder
            }
            "flush_interval_ms" => builder.with_flush_interval_ms(parse_value(key, value)?),
            "max_queue_buffer" => builder.with_max_queue_buffer(parse_value(key, value)?),
            "connect_timeout_ms" => builder.with_connect_timeout_ms(parse_value(key, value)?),
            "batch_size" => builder.with_batch_size(parse_value(key, value)?),
            "max_frame_size" => builder.with_max_frame_size(parse_value(key, value)?),
            "warn_interval_ms" => builder.with_warn_interval_ms(parse_value(key, value)?),
            "backoff_base_ms" => {
                builder.set_backoff_base_ms(parse_value(key, value)?);
                builder
            }
            "backoff_cap_ms" => {
                builder.set_backoff_cap_ms(parse_value(key, value)?);
                builder
            }
            other => {
                return Err(ProducerBuildError::InvalidConfig(format!(
                    "unknown key `{other}` in [{PRODUCER_SECTION}]"
                )));
            }
        };
    }
    Ok(builder)
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ProducerBuildError> {
    value.parse().map_err(|_| {
        ProducerBuildError::InvalidConfig(format!("{key} has invalid value `{value}`"))
    })
}
