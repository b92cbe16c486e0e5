pub const TEST_RP_ID: &str = "login.example.org";
pub const TEST_ORIGIN: &str = "https://login.example.org";
pub const TEST_CHALLENGE: &[u8] = b"integration-challenge";
/// base64url of `TEST_CHALLENGE`
pub const TEST_CHALLENGE_B64: &str = "aW50ZWdyYXRpb24tY2hhbGxlbmdl";
