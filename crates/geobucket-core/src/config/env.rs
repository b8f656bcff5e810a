use crate::error::{BucketError, Result};

#[must_use]
pub(super) fn read_non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(super) fn read_env_u8(name: &str) -> Result<Option<u8>> {
    parse_env(name, |raw| raw.parse::<u8>().ok())
}

pub(super) fn read_env_usize(name: &str) -> Result<Option<usize>> {
    parse_env(name, |raw| raw.parse::<usize>().ok())
}

pub(super) fn read_env_f64(name: &str) -> Result<Option<f64>> {
    parse_env(name, |raw| raw.parse::<f64>().ok())
}

fn parse_env<T>(name: &str, parse: impl Fn(&str) -> Option<T>) -> Result<Option<T>> {
    match read_non_empty_env(name) {
        None => Ok(None),
        Some(raw) => parse(raw.trim()).map(Some).ok_or_else(|| {
            BucketError::Validation(format!("invalid {name}: {raw}"))
        }),
    }
}
