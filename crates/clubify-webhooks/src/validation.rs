//! Endpoint URL validation and SSRF protection.
//!
//! A delivery URL must be HTTPS (plain HTTP only behind the dev flag) and
//! must not point at loopback, private, link-local, CGNAT, or well-known
//! internal hosts. Validation failures are terminal configuration errors and
//! never reach the network.

use std::net::IpAddr;

use crate::error::WebhookError;

/// Validate a webhook delivery URL.
///
/// `block_internal_hosts` disables the SSRF host check for dev/test targets
/// on loopback; leave it on everywhere else.
pub fn validate_endpoint_url(
    url: &str,
    allow_http: bool,
    block_internal_hosts: bool,
) -> Result<(), WebhookError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| WebhookError::InvalidUrl(format!("Invalid URL format: {e}")))?;

    match parsed.scheme() {
        "https" => {}
        "http" if allow_http => {}
        "http" => {
            return Err(WebhookError::InvalidUrl(
                "Webhook URLs must use HTTPS".to_string(),
            ));
        }
        scheme => {
            return Err(WebhookError::InvalidUrl(format!(
                "Unsupported URL scheme: {scheme}"
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| WebhookError::InvalidUrl("URL must have a host".to_string()))?;

    if block_internal_hosts {
        validate_host_not_internal(host)?;
    }
    Ok(())
}

/// Reject private/internal destinations.
pub fn validate_host_not_internal(host: &str) -> Result<(), WebhookError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_internal_ip(&ip) {
            return Err(WebhookError::SsrfDetected(format!(
                "Destination host {host} is a private/internal address"
            )));
        }
    }

    let lower = host.to_ascii_lowercase();
    if lower == "localhost"
        || lower == "metadata.google.internal"
        || lower.ends_with(".internal")
        || lower.ends_with(".local")
    {
        return Err(WebhookError::SsrfDetected(format!(
            "Destination host {host} is a restricted internal hostname"
        )));
    }

    Ok(())
}

fn is_internal_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local() // cloud metadata endpoints live here
                || v4.is_broadcast()
                || v4.is_unspecified()
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64) // CGNAT
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_https_url() {
        assert!(validate_endpoint_url("https://example.com/hooks", false, true).is_ok());
        assert!(validate_endpoint_url("https://hooks.example.com:8443/cb", false, true).is_ok());
    }

    #[test]
    fn test_http_needs_dev_flag() {
        assert!(validate_endpoint_url("http://example.com/hooks", false, true).is_err());
        assert!(validate_endpoint_url("http://example.com/hooks", true, true).is_ok());
    }

    #[test]
    fn test_malformed_and_unsupported() {
        assert!(validate_endpoint_url("not-a-url", false, true).is_err());
        assert!(validate_endpoint_url("ftp://example.com/hooks", false, true).is_err());
    }

    #[test]
    fn test_internal_host_check_can_be_disabled() {
        assert!(validate_endpoint_url("http://127.0.0.1:8080/hook", true, true).is_err());
        assert!(validate_endpoint_url("http://127.0.0.1:8080/hook", true, false).is_ok());
    }

    #[test]
    fn test_blocks_loopback_and_private_ranges() {
        for host in [
            "127.0.0.1",
            "10.0.0.1",
            "172.16.0.1",
            "192.168.1.1",
            "169.254.169.254",
            "100.64.0.1",
            "::1",
            "::",
        ] {
            assert!(validate_host_not_internal(host).is_err(), "host {host}");
        }
    }

    #[test]
    fn test_blocks_internal_hostnames() {
        for host in [
            "localhost",
            "LOCALHOST",
            "metadata.google.internal",
            "svc.internal",
            "printer.local",
        ] {
            assert!(validate_host_not_internal(host).is_err(), "host {host}");
        }
    }

    #[test]
    fn test_allows_public_destinations() {
        assert!(validate_host_not_internal("8.8.8.8").is_ok());
        assert!(validate_host_not_internal("203.0.113.50").is_ok());
        assert!(validate_host_not_internal("hooks.example.io").is_ok());
    }

    #[test]
    fn test_url_error_kinds() {
        let err = validate_endpoint_url("https://10.0.0.1/hook", false, true).unwrap_err();
        assert!(matches!(err, WebhookError::SsrfDetected(_)));

        let err = validate_endpoint_url("http://example.com/hook", false, true).unwrap_err();
        assert!(matches!(err, WebhookError::InvalidUrl(_)));
    }
}
