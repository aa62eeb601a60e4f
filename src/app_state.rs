use std::env;

use regex::Regex;
use thiserror::Error;

const DEFAULT_CACHE_MAX_AGE: u64 = 60 * 60 * 24 * 365; // 365 days
const DEFAULT_QUALITY: u8 = 80;
const DEFAULT_STORAGE_CLASS: &str = "STANDARD";
const DEFAULT_MAX_SOURCE_BYTES: u64 = 100 * 1024 * 1024; // 100 MB
const DEFAULT_PORT: u16 = 3080;
// largest side WebP can encode
const DEFAULT_MAX_OUTPUT_DIMENSION: u32 = 16383;

// Bucket-style S3 origins, optionally with a region segment.
const S3_DOMAIN_PATTERN: &str = r"(?i)^(.+?)\.s3(?:\.[a-z0-9-]+)?\.amazonaws\.com$";

#[derive(Debug, Error)]
pub enum AppStateError {
    #[error("{name} must be {expected}, got {value:?}")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("invalid bucket domain pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub cache_max_age: u64,
    pub quality: u8,
    pub storage_class: String,
    pub max_source_bytes: u64,
    pub max_output_dimension: u32,
    pub port: u16,
    bucket_domain: Regex,
}

impl AppState {
    pub fn new() -> Result<AppState, AppStateError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the state from an arbitrary variable source; unset names fall
    /// back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<AppState, AppStateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cache_max_age = parse_var(&lookup, "CACHE_MAX_AGE", "a number of seconds")?
            .unwrap_or(DEFAULT_CACHE_MAX_AGE);

        let quality = match parse_var::<u8, _>(&lookup, "RESIZE_QUALITY", "between 1 and 100")? {
            Some(q) if !(1..=100).contains(&q) => {
                return Err(AppStateError::InvalidValue {
                    name: "RESIZE_QUALITY",
                    expected: "between 1 and 100",
                    value: q.to_string(),
                })
            }
            Some(q) => q,
            None => DEFAULT_QUALITY,
        };

        let storage_class = match lookup("STORAGE_CLASS") {
            Some(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => DEFAULT_STORAGE_CLASS.to_string(),
        };

        let max_source_bytes = parse_var(&lookup, "MAX_SOURCE_BYTES", "a byte count")?
            .unwrap_or(DEFAULT_MAX_SOURCE_BYTES);

        let max_output_dimension =
            match parse_var::<u32, _>(&lookup, "MAX_OUTPUT_DIMENSION", "a positive pixel count")? {
                Some(0) => {
                    return Err(AppStateError::InvalidValue {
                        name: "MAX_OUTPUT_DIMENSION",
                        expected: "a positive pixel count",
                        value: "0".to_string(),
                    })
                }
                Some(limit) => limit,
                None => DEFAULT_MAX_OUTPUT_DIMENSION,
            };

        let port = parse_var(&lookup, "PORT", "a port number")?.unwrap_or(DEFAULT_PORT);

        Ok(AppState {
            cache_max_age,
            quality,
            storage_class,
            max_source_bytes,
            max_output_dimension,
            port,
            bucket_domain: Regex::new(S3_DOMAIN_PATTERN)?,
        })
    }

    pub fn cache_control(&self) -> String {
        format!("public, max-age={}", self.cache_max_age)
    }

    /// Returns the bucket name of an S3 origin domain such as
    /// `my-assets.s3.amazonaws.com`.
    pub fn bucket_from_domain<'a>(&self, domain: &'a str) -> Option<&'a str> {
        self.bucket_domain
            .captures(domain)
            .and_then(|captures| captures.get(1))
            .map(|bucket| bucket.as_str())
    }
}

fn parse_var<T, F>(
    lookup: &F,
    name: &'static str,
    expected: &'static str,
) -> Result<Option<T>, AppStateError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|_| AppStateError::InvalidValue {
            name,
            expected,
            value,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn state_with(vars: &[(&str, &str)]) -> Result<AppState, AppStateError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppState::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let state = state_with(&[]).unwrap();
        assert_eq!(state.cache_max_age, 31_536_000);
        assert_eq!(state.quality, 80);
        assert_eq!(state.storage_class, "STANDARD");
        assert_eq!(state.port, 3080);
        assert_eq!(state.max_output_dimension, 16383);
        assert_eq!(state.cache_control(), "public, max-age=31536000");
    }

    #[test]
    fn overrides_from_environment() {
        let state = state_with(&[
            ("CACHE_MAX_AGE", "60"),
            ("RESIZE_QUALITY", "65"),
            ("STORAGE_CLASS", "INTELLIGENT_TIERING"),
            ("PORT", "9000"),
            ("MAX_OUTPUT_DIMENSION", "4096"),
        ])
        .unwrap();
        assert_eq!(state.max_output_dimension, 4096);
        assert_eq!(state.cache_control(), "public, max-age=60");
        assert_eq!(state.quality, 65);
        assert_eq!(state.storage_class, "INTELLIGENT_TIERING");
        assert_eq!(state.port, 9000);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            state_with(&[("RESIZE_QUALITY", "0")]),
            Err(AppStateError::InvalidValue { name: "RESIZE_QUALITY", .. })
        ));
        assert!(matches!(
            state_with(&[("CACHE_MAX_AGE", "forever")]),
            Err(AppStateError::InvalidValue { name: "CACHE_MAX_AGE", .. })
        ));
        assert!(matches!(
            state_with(&[("MAX_OUTPUT_DIMENSION", "0")]),
            Err(AppStateError::InvalidValue { name: "MAX_OUTPUT_DIMENSION", .. })
        ));
    }

    #[test]
    fn bucket_from_s3_domains() {
        let state = state_with(&[]).unwrap();
        assert_eq!(
            state.bucket_from_domain("my-assets.s3.amazonaws.com"),
            Some("my-assets")
        );
        assert_eq!(
            state.bucket_from_domain("static.example.com.s3.amazonaws.com"),
            Some("static.example.com")
        );
        assert_eq!(
            state.bucket_from_domain("Media.S3.AmazonAWS.com"),
            Some("Media")
        );
        assert_eq!(
            state.bucket_from_domain("my-assets.s3.eu-west-1.amazonaws.com"),
            Some("my-assets")
        );
        assert_eq!(state.bucket_from_domain("origin.example.com"), None);
        assert_eq!(state.bucket_from_domain("s3.amazonaws.com"), None);
    }
}
