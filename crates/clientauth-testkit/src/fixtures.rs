//! Certificate fixtures.
//!
//! The engine never decodes certificate bodies, so fixtures only need the PEM
//! armor and a body unique to each name.

/// A device certificate shared by tests that need just one.
pub const DEVICE_CERT_PEM: &str = "-----BEGIN CERTIFICATE-----\n\
MIIBszCCAVmgAwIBAgIUZGV2aWNlLWNlcnRpZmljYXRlLWZpeHR1cmUwCgYIKoZI\n\
-----END CERTIFICATE-----\n";

/// Deterministic PEM-armored certificate for `name`.
pub fn certificate_pem(name: &str) -> String {
    let body = hex::encode(name.as_bytes());
    let lines: Vec<&str> = body
        .as_bytes()
        .chunks(64)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();
    format!(
        "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
        lines.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_are_armored_and_distinct() {
        let a = certificate_pem("a");
        let b = certificate_pem("b");
        assert!(a.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(a.trim_end().ends_with("-----END CERTIFICATE-----"));
        assert_ne!(a, b);
        assert_eq!(a, certificate_pem("a"));
    }
}
