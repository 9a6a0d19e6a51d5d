//! HTTP protocol version helpers.
//!
//! Both sides of the bridge talk about versions as the short strings used on
//! the wire after `HTTP/` (`"1.0"`, `"1.1"`, `"2"`, `"3"`); internally they are
//! plain [`http::Version`] values.

use http::Version;

use crate::BridgeError;

/// Versions an internal request accepts unless told otherwise.
pub const DEFAULT_PROTOCOL_VERSIONS: [Version; 2] = [Version::HTTP_11, Version::HTTP_2];

/// Short display form of a version (`"1.1"`, `"2"`, ...).
pub fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_11 => "1.1",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "unknown",
    }
}

/// Parse a short version string. Accepts an optional `HTTP/` prefix and `2.0`/`3.0`.
pub fn parse_version(value: &str) -> Result<Version, BridgeError> {
    let trimmed = value.trim();
    let short = trimmed
        .strip_prefix("HTTP/")
        .or_else(|| trimmed.strip_prefix("http/"))
        .unwrap_or(trimmed);

    match short {
        "0.9" => Ok(Version::HTTP_09),
        "1.0" => Ok(Version::HTTP_10),
        "1.1" => Ok(Version::HTTP_11),
        "2" | "2.0" => Ok(Version::HTTP_2),
        "3" | "3.0" => Ok(Version::HTTP_3),
        _ => Err(BridgeError::InvalidConfiguration(format!(
            "unknown HTTP protocol version: {value}"
        ))),
    }
}

/// Remove duplicates while keeping the first occurrence of each version.
pub(crate) fn dedup_versions(versions: impl IntoIterator<Item = Version>) -> Vec<Version> {
    let mut out: Vec<Version> = Vec::new();
    for version in versions {
        if !out.contains(&version) {
            out.push(version);
        }
    }
    out
}
