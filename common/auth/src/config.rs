/// Runtime configuration for token issuance and validation.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Lifetime of an issued token, in seconds.
    pub ttl_seconds: i64,
    /// Allowable clock skew in seconds when checking expiry.
    pub leeway_seconds: u32,
}

impl JwtConfig {
    pub const DEFAULT_TTL_SECONDS: i64 = 24 * 60 * 60;

    /// Construct config with a 24 hour lifetime and no leeway.
    pub fn new() -> Self {
        Self {
            ttl_seconds: Self::DEFAULT_TTL_SECONDS,
            leeway_seconds: 0,
        }
    }

    pub fn with_ttl(mut self, seconds: i64) -> Self {
        self.ttl_seconds = seconds;
        self
    }

    /// Adjust the allowed leeway.
    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self::new()
    }
}
