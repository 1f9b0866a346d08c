use std::fmt;

use serde::{Deserialize, Serialize};

/// How SDES crypto in content descriptions is treated by new channels.
///
/// # Examples
///
/// ```
/// use rtc::configuration::secure_policy::SecurePolicy;
///
/// assert_eq!(SecurePolicy::from("required"), SecurePolicy::Required);
/// assert_eq!(SecurePolicy::default(), SecurePolicy::Enabled);
/// ```
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum SecurePolicy {
    /// Crypto params in descriptions are ignored; media flows unprotected
    /// unless DTLS keys the channel.
    #[serde(rename = "disabled")]
    Disabled,

    /// Crypto params are negotiated when present, and the description's
    /// `crypto_required` flag decides whether plain media is acceptable.
    #[default]
    #[serde(rename = "enabled")]
    Enabled,

    /// Every channel refuses to send or receive media until SRTP is active,
    /// whatever the description says.
    #[serde(rename = "required")]
    Required,
}

const SECURE_POLICY_DISABLED_STR: &str = "disabled";
const SECURE_POLICY_ENABLED_STR: &str = "enabled";
const SECURE_POLICY_REQUIRED_STR: &str = "required";

impl From<&str> for SecurePolicy {
    fn from(raw: &str) -> Self {
        match raw {
            SECURE_POLICY_DISABLED_STR => SecurePolicy::Disabled,
            SECURE_POLICY_REQUIRED_STR => SecurePolicy::Required,
            _ => SecurePolicy::Enabled,
        }
    }
}

impl fmt::Display for SecurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            SecurePolicy::Disabled => SECURE_POLICY_DISABLED_STR,
            SecurePolicy::Enabled => SECURE_POLICY_ENABLED_STR,
            SecurePolicy::Required => SECURE_POLICY_REQUIRED_STR,
        };
        write!(f, "{s}")
    }
}

impl SecurePolicy {
    /// Whether SDES crypto from descriptions is applied to the SRTP filter.
    pub fn negotiates_crypto(&self) -> bool {
        *self != SecurePolicy::Disabled
    }

    /// The effective crypto-required flag for a description that asked for
    /// `requested`.
    pub fn crypto_required(&self, requested: bool) -> bool {
        match *self {
            SecurePolicy::Disabled => false,
            SecurePolicy::Enabled => requested,
            SecurePolicy::Required => true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_secure_policy_string() {
        let tests = vec![
            ("Unknown", SecurePolicy::Enabled),
            ("disabled", SecurePolicy::Disabled),
            ("enabled", SecurePolicy::Enabled),
            ("required", SecurePolicy::Required),
        ];

        for (policy_string, expected) in tests {
            assert_eq!(SecurePolicy::from(policy_string), expected);
        }
        assert_eq!(SecurePolicy::Required.to_string(), "required");
    }

    #[test]
    fn test_secure_policy_crypto_required() {
        assert!(!SecurePolicy::Disabled.crypto_required(true));
        assert!(!SecurePolicy::Enabled.crypto_required(false));
        assert!(SecurePolicy::Enabled.crypto_required(true));
        assert!(SecurePolicy::Required.crypto_required(false));
        assert!(!SecurePolicy::Disabled.negotiates_crypto());
    }
}
