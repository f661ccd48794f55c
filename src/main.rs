use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustls::crypto::CryptoProvider;

mod backends;
mod config;
mod eth;
mod logging;
mod prelude;
mod proxy;
mod registry;
mod rpc;

use registry::{DirectoryWatcher, KeyPairDirProvider, MetadataDirProvider, SingleSignerProvider};

#[derive(Parser)]
#[command(name = "sigproxy")]
#[command(about = "Transaction-signing JSON-RPC proxy for Ethereum nodes")]
#[command(long_about = "\
Transaction-signing JSON-RPC proxy for Ethereum nodes

sigproxy sits between JSON-RPC clients and an Ethereum node. Signing methods
(eth_sendTransaction, eea_sendTransaction, eth_sign, eth_signTransaction,
eth_accounts) are served locally from its key registry; every other method is
forwarded to the node untouched.

TYPICAL WORKFLOWS:

  Single key:
    sigproxy --chain-id 1 --downstream-host node.example.com \\
        file-based --key-file wallet.key --password-file wallet.password

  Directory of key/password pairs (hot reloaded):
    sigproxy --chain-id 1 multifile --directory /var/lib/sigproxy/keys

  Directory of backend descriptors (file, Vault, Azure; hot reloaded):
    sigproxy --chain-id 1 multikey --directory /var/lib/sigproxy/signers

For more details on each command, use: sigproxy <command> --help
")]
struct Cli {
    /// Listen, downstream, and signing parameters
    #[command(flatten)]
    proxy: config::ProxyArgs,

    /// Logging flags
    #[command(flatten)]
    log: logging::LogArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a single signer loaded from a key file and password file
    ///
    /// Example:
    ///
    ///  $ sigproxy --chain-id 1 file-based --key-file k.key --password-file k.password
    ///
    FileBased {
        /// Path to the hex-encoded private key file
        #[arg(long, env = "SIGPROXY_KEY_FILE")]
        key_file: PathBuf,

        /// Path to the password file guarding the key
        #[arg(long, env = "SIGPROXY_PASSWORD_FILE")]
        password_file: PathBuf,
    },

    /// Serve signers from raw key/password file pairs in a directory
    ///
    /// Each `<address>.key` file pairs with `<address>.password`. The
    /// directory is watched; pairs added or removed at runtime take effect
    /// without a restart.
    ///
    /// Example:
    ///
    ///  $ sigproxy --chain-id 1 multifile --directory ./keys
    ///
    Multifile {
        /// Directory containing key and password file pairs
        #[arg(long, env = "SIGPROXY_DIRECTORY")]
        directory: PathBuf,
    },

    /// Serve signers described by TOML metadata files in a directory
    ///
    /// Each `<name><address>.toml` file selects a backend (file-based,
    /// hashicorp, azure). The directory is watched; descriptors added or
    /// removed at runtime take effect without a restart.
    ///
    /// Example:
    ///
    ///  $ sigproxy --chain-id 1 multikey --directory ./signers
    ///
    Multikey {
        /// Directory containing signing metadata TOML files
        #[arg(long, env = "SIGPROXY_DIRECTORY")]
        directory: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must be installed once before any TLS client is built
    CryptoProvider::install_default(rustls::crypto::aws_lc_rs::default_provider())
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let cli = Cli::parse();
    logging::init_tracing(cli.log.to_config());

    tracing::debug!("sigproxy starting");

    match cli.command {
        Commands::FileBased { key_file, password_file } => {
            let signer = backends::file::load_key_pair(&key_file, &password_file)
                .with_context(|| format!("Failed to load key from {}", key_file.display()))?;
            tracing::info!(address = %eth::address::prefixed(&eth::address::canonical(&signer.address())), "Loaded signer");
            let provider = Arc::new(SingleSignerProvider::new(Arc::new(signer)));
            proxy::run(&cli.proxy, provider, None).await
        }
        Commands::Multifile { directory } => {
            let provider = Arc::new(KeyPairDirProvider::load(&directory).await);
            let watcher = DirectoryWatcher::start(&directory, provider.clone())
                .with_context(|| format!("Failed to watch {}", directory.display()))?;
            proxy::run(&cli.proxy, provider, Some(watcher)).await
        }
        Commands::Multikey { directory } => {
            let provider = Arc::new(MetadataDirProvider::load(&directory).await);
            let watcher = DirectoryWatcher::start(&directory, provider.clone())
                .with_context(|| format!("Failed to watch {}", directory.display()))?;
            proxy::run(&cli.proxy, provider, Some(watcher)).await
        }
    }
}
