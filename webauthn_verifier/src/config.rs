//! Validator configuration.
//!
//! Configuration is an explicit value handed to the validators at construction.
//! [`ValidatorConfig::from_env`] builds one from the process environment.

use std::env;
use std::time::Duration;

use url::Url;

use crate::errors::ValidationError;

const DEFAULT_SAFETYNET_TOLERANCE_SECS: u64 = 60;

/// Whether the user-verified flag is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserVerificationRequirement {
    Required,
    #[default]
    Preferred,
    Discouraged,
}

/// Which attestation outcomes are acceptable at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustPolicy {
    pub allow_none_attestation: bool,
    pub allow_self_attestation: bool,
    /// Accept attestations whose chain cannot be matched to any registered anchor
    pub allow_untrusted_attestation: bool,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            allow_none_attestation: true,
            allow_self_attestation: true,
            allow_untrusted_attestation: false,
        }
    }
}

/// X.509 path validation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathValidationConfig {
    pub revocation_check_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyNetConfig {
    pub forward_tolerance: Duration,
    pub backward_tolerance: Duration,
}

impl Default for SafetyNetConfig {
    fn default() -> Self {
        Self {
            forward_tolerance: Duration::from_secs(DEFAULT_SAFETYNET_TOLERANCE_SECS),
            backward_tolerance: Duration::from_secs(DEFAULT_SAFETYNET_TOLERANCE_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AndroidKeyConfig {
    /// Only trust key properties enforced by the TEE
    pub tee_enforced_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    pub rp_id: String,
    pub origins: Vec<String>,
    pub user_verification: UserVerificationRequirement,
    pub trust_policy: TrustPolicy,
    pub path_validation: PathValidationConfig,
    pub safetynet: SafetyNetConfig,
    pub android_key: AndroidKeyConfig,
    /// Extension identifiers the relying party requested
    pub allowed_extensions: Vec<String>,
    /// Reject authenticator extensions that are not in `allowed_extensions`
    pub strict_extensions: bool,
}

impl ValidatorConfig {
    pub fn new(rp_id: impl Into<String>, origins: Vec<String>) -> Self {
        Self {
            rp_id: rp_id.into(),
            origins,
            user_verification: UserVerificationRequirement::default(),
            trust_policy: TrustPolicy::default(),
            path_validation: PathValidationConfig::default(),
            safetynet: SafetyNetConfig::default(),
            android_key: AndroidKeyConfig::default(),
            allowed_extensions: Vec::new(),
            strict_extensions: false,
        }
    }

    /// Builds the configuration from environment variables.
    ///
    /// `ORIGIN` is required. Every other variable falls back to its default, with a
    /// warning when the value is present but invalid.
    ///
    /// # Errors
    /// * `ValidationError::Config` - `ORIGIN` is missing or not a valid URL with a host
    pub fn from_env() -> Result<Self, ValidationError> {
        let origin = env::var("ORIGIN")
            .map_err(|_| ValidationError::Config("ORIGIN must be set".to_string()))?;
        let origin_url = Url::parse(&origin)
            .map_err(|e| ValidationError::Config(format!("Invalid ORIGIN '{origin}': {e}")))?;
        let host = origin_url
            .host_str()
            .ok_or_else(|| ValidationError::Config(format!("ORIGIN '{origin}' has no host")))?;

        let rp_id = env::var("WEBAUTHN_RP_ID").unwrap_or_else(|_| host.to_string());

        let mut origins = vec![origin.trim_end_matches('/').to_string()];
        if let Ok(additional) = env::var("WEBAUTHN_ADDITIONAL_ORIGINS") {
            for candidate in additional.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                match Url::parse(candidate) {
                    Ok(_) => origins.push(candidate.trim_end_matches('/').to_string()),
                    Err(e) => tracing::warn!("Ignoring invalid origin {}: {}", candidate, e),
                }
            }
        }

        let user_verification = env::var("WEBAUTHN_USER_VERIFICATION").map_or(
            UserVerificationRequirement::Preferred,
            |v| match v.to_lowercase().as_str() {
                "required" => UserVerificationRequirement::Required,
                "preferred" => UserVerificationRequirement::Preferred,
                "discouraged" => UserVerificationRequirement::Discouraged,
                _ => {
                    tracing::warn!("Invalid user verification: {}. Using default 'preferred'", v);
                    UserVerificationRequirement::Preferred
                }
            },
        );

        let defaults = TrustPolicy::default();
        let trust_policy = TrustPolicy {
            allow_none_attestation: env_bool(
                "WEBAUTHN_ALLOW_NONE_ATTESTATION",
                defaults.allow_none_attestation,
            ),
            allow_self_attestation: env_bool(
                "WEBAUTHN_ALLOW_SELF_ATTESTATION",
                defaults.allow_self_attestation,
            ),
            allow_untrusted_attestation: env_bool(
                "WEBAUTHN_ALLOW_UNTRUSTED_ATTESTATION",
                defaults.allow_untrusted_attestation,
            ),
        };

        let tolerance = env::var("WEBAUTHN_SAFETYNET_TOLERANCE_SECS").map_or(
            DEFAULT_SAFETYNET_TOLERANCE_SECS,
            |v| {
                v.parse::<u64>().unwrap_or_else(|_| {
                    tracing::warn!(
                        "Invalid SafetyNet tolerance: {}. Using default {}",
                        v,
                        DEFAULT_SAFETYNET_TOLERANCE_SECS
                    );
                    DEFAULT_SAFETYNET_TOLERANCE_SECS
                })
            },
        );

        Ok(Self {
            rp_id,
            origins,
            user_verification,
            trust_policy,
            path_validation: PathValidationConfig {
                revocation_check_enabled: env_bool("WEBAUTHN_REVOCATION_CHECK", false),
            },
            safetynet: SafetyNetConfig {
                forward_tolerance: Duration::from_secs(tolerance),
                backward_tolerance: Duration::from_secs(tolerance),
            },
            android_key: AndroidKeyConfig {
                tee_enforced_only: env_bool("WEBAUTHN_ANDROID_KEY_TEE_ONLY", false),
            },
            allowed_extensions: Vec::new(),
            strict_extensions: env_bool("WEBAUTHN_STRICT_EXTENSIONS", false),
        })
    }

    pub(crate) fn requires_user_verification(&self) -> bool {
        self.user_verification == UserVerificationRequirement::Required
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name).map_or(default, |v| match v.to_lowercase().as_str() {
        "true" => true,
        "false" => false,
        invalid => {
            tracing::warn!("Invalid {}: {}. Using default '{}'", name, invalid, default);
            default
        }
    })
}
