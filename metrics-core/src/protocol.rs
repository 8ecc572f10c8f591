//! Wire constants agreed on by the agent and the collector

/// Header carrying the lower-case hex HMAC-SHA256 of the body
pub const HASH_HEADER: &str = "HashSHA256";

/// Header value meaning "this body is not signed"
pub const HASH_NONE: &str = "none";

/// Content-Encoding value for gzip bodies
pub const GZIP_ENCODING: &str = "gzip";

/// Length of the AES-GCM nonce prepended to the sealed payload
pub const NONCE_LEN: usize = 12;

/// Length of the per-message AES-256 key
pub const AES_KEY_LEN: usize = 32;
