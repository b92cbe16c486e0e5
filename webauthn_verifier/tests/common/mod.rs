pub mod constants;
pub mod fixtures;

pub use constants::*;
pub use fixtures::*;

use webauthn_verifier::ValidatorConfig;

pub fn create_test_config() -> ValidatorConfig {
    ValidatorConfig::new(TEST_RP_ID, vec![TEST_ORIGIN.to_string()])
}
