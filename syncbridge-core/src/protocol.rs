//! Protocol version selection for outbound requests.

use http::Version;

use crate::BridgeError;

/// Picks the protocol version of a transport-bound request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolVersionNegotiator;

impl ProtocolVersionNegotiator {
    /// Choose a version from `acceptable`.
    ///
    /// - An `explicit` version must be acceptable.
    /// - A single acceptable version is used as is.
    /// - Otherwise `default` is kept if acceptable; anything else is ambiguous.
    pub fn negotiate(
        acceptable: &[Version],
        explicit: Option<Version>,
        default: Version,
    ) -> Result<Version, BridgeError> {
        if let Some(version) = explicit {
            if !acceptable.contains(&version) {
                return Err(BridgeError::UnsupportedProtocolVersion(version));
            }
            return Ok(version);
        }

        if let [only] = acceptable {
            return Ok(*only);
        }

        if acceptable.contains(&default) {
            Ok(default)
        } else {
            Err(BridgeError::AmbiguousProtocolVersion(acceptable.to_vec()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_kept_when_acceptable() {
        let version = ProtocolVersionNegotiator::negotiate(
            &[Version::HTTP_11, Version::HTTP_2],
            None,
            Version::HTTP_11,
        );
        assert_eq!(version, Ok(Version::HTTP_11));
    }

    #[test]
    fn test_single_version_selected() {
        let version =
            ProtocolVersionNegotiator::negotiate(&[Version::HTTP_2], None, Version::HTTP_11);
        assert_eq!(version, Ok(Version::HTTP_2));
    }

    #[test]
    fn test_explicit_version_selected() {
        let version = ProtocolVersionNegotiator::negotiate(
            &[Version::HTTP_11, Version::HTTP_2],
            Some(Version::HTTP_2),
            Version::HTTP_11,
        );
        assert_eq!(version, Ok(Version::HTTP_2));
    }

    #[test]
    fn test_explicit_version_must_be_acceptable() {
        let err = ProtocolVersionNegotiator::negotiate(
            &[Version::HTTP_2],
            Some(Version::HTTP_11),
            Version::HTTP_11,
        )
        .unwrap_err();
        assert_eq!(err, BridgeError::UnsupportedProtocolVersion(Version::HTTP_11));
        assert_eq!(
            err.to_string(),
            "source request doesn't support the provided HTTP protocol version: 1.1"
        );
    }

    #[test]
    fn test_ambiguous_when_default_not_acceptable() {
        let err = ProtocolVersionNegotiator::negotiate(
            &[Version::HTTP_10, Version::HTTP_2],
            None,
            Version::HTTP_11,
        )
        .unwrap_err();
        assert_eq!(
            err,
            BridgeError::AmbiguousProtocolVersion(vec![Version::HTTP_10, Version::HTTP_2])
        );
        assert_eq!(
            err.to_string(),
            "can't choose HTTP protocol version automatically: [1.0, 2]"
        );
    }
}
