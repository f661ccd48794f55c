//! Proxy configuration
//!
//! Shared CLI arguments for both the inbound listener and the downstream node
//! connection. Every option can come from the command line or a `SIGPROXY_*`
//! environment variable; the signer-registry mode is selected by subcommand,
//! not here.

use std::time::Duration;

use clap::Args;

/// Largest chain id for which `v = recovery_id + chain_id * 2 + 35` fits in
/// a u64
const MAX_CHAIN_ID: u64 = (u64::MAX - 36) / 2;

/// Common proxy arguments (flattened into every subcommand)
#[derive(Args, Clone, Debug)]
pub struct ProxyArgs {
    /// Host to listen on for inbound JSON-RPC requests
    #[arg(long, env = "SIGPROXY_LISTEN_HOST", default_value = "127.0.0.1")]
    pub listen_host: String,

    /// Port to listen on for inbound JSON-RPC requests
    #[arg(long, short = 'p', env = "SIGPROXY_LISTEN_PORT", default_value_t = 8545)]
    pub listen_port: u16,

    /// Downstream Ethereum node host
    #[arg(long, env = "SIGPROXY_DOWNSTREAM_HOST", default_value = "127.0.0.1")]
    pub downstream_host: String,

    /// Downstream Ethereum node port
    #[arg(long, env = "SIGPROXY_DOWNSTREAM_PORT", default_value_t = 8545)]
    pub downstream_port: u16,

    /// Connect to the downstream node over TLS
    #[arg(long, env = "SIGPROXY_DOWNSTREAM_TLS")]
    pub downstream_tls: bool,

    /// Chain id used for EIP-155 replay protection
    #[arg(
        long,
        env = "SIGPROXY_CHAIN_ID",
        value_parser = clap::value_parser!(u64).range(..=MAX_CHAIN_ID)
    )]
    pub chain_id: u64,

    /// Downstream request timeout in milliseconds
    #[arg(long, env = "SIGPROXY_TIMEOUT_MS", default_value_t = 5_000)]
    pub timeout_ms: u64,

    /// Maximum number of resubmissions after a downstream nonce conflict
    #[arg(long, env = "SIGPROXY_NONCE_RETRY_LIMIT", default_value_t = 3)]
    pub nonce_retry_limit: u32,
}

impl ProxyArgs {
    pub fn downstream_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        proxy: ProxyArgs,
    }

    #[test]
    fn test_defaults() {
        let cli = TestCli::parse_from(["test", "--chain-id", "1"]);
        assert_eq!(cli.proxy.listen_port, 8545);
        assert_eq!(cli.proxy.downstream_port, 8545);
        assert!(!cli.proxy.downstream_tls);
        assert_eq!(cli.proxy.nonce_retry_limit, 3);
        assert_eq!(cli.proxy.downstream_timeout(), Duration::from_millis(5_000));
    }

    #[test]
    fn test_chain_id_is_required() {
        assert!(TestCli::try_parse_from(["test"]).is_err());
    }

    #[test]
    fn test_chain_id_overflow_rejected() {
        // v = recovery_id + chain_id * 2 + 35 must stay within u64
        let largest = MAX_CHAIN_ID.to_string();
        assert!(TestCli::try_parse_from(["test", "--chain-id", &largest]).is_ok());

        let too_large = (MAX_CHAIN_ID + 1).to_string();
        assert!(TestCli::try_parse_from(["test", "--chain-id", &too_large]).is_err());
    }

    #[test]
    fn test_overrides() {
        let cli = TestCli::parse_from([
            "test",
            "--chain-id",
            "44844",
            "--downstream-host",
            "node.internal",
            "--downstream-tls",
            "--nonce-retry-limit",
            "0",
        ]);
        assert_eq!(cli.proxy.chain_id, 44844);
        assert_eq!(cli.proxy.downstream_host, "node.internal");
        assert!(cli.proxy.downstream_tls);
        assert_eq!(cli.proxy.nonce_retry_limit, 0);
    }
}
