//! CLI configuration.
//!
//! Resolved once from flags and environment at startup and passed down
//! immutably; command handlers never consult the process environment
//! themselves.

/// Immutable configuration shared by all subcommands.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Gateway base URL.
    pub server: String,
    /// Bearer token, when the gateway requires auth.
    pub token: Option<String>,
}

impl CliConfig {
    /// Resolve from explicit flags, falling back to `OSFORGE_SERVER` and
    /// `OSFORGE_TOKEN`.
    pub fn resolve(server_flag: Option<String>, token_flag: Option<String>) -> Self {
        let server = server_flag
            .or_else(|| std::env::var("OSFORGE_SERVER").ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| "http://localhost:8080".to_string());
        let token = token_flag
            .or_else(|| std::env::var("OSFORGE_TOKEN").ok().filter(|s| !s.is_empty()));
        Self { server, token }
    }

    pub fn client(&self) -> Result<osforge_client::GatewayClient, osforge_client::ClientError> {
        osforge_client::GatewayClient::new(&self.server, self.token.as_deref())
    }
}
