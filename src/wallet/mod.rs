//! Wallet credentials loaded from the private-key file

use crate::error::{TipperError, TipperResult};

use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// A signing key and the address derived from it
#[derive(Clone)]
pub struct WalletCredential {
    signer: LocalWallet,
}

impl WalletCredential {
    /// Parse a hex private key, with or without `0x`
    pub fn from_private_key(key: &str) -> TipperResult<Self> {
        let key = key.trim();
        let key = key
            .strip_prefix("0x")
            .or_else(|| key.strip_prefix("0X"))
            .unwrap_or(key);

        let signer = key
            .parse::<LocalWallet>()
            .map_err(|e| TipperError::Wallet(format!("Invalid private key: {}", e)))?;

        Ok(Self { signer })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn signer(&self) -> &LocalWallet {
        &self.signer
    }
}

impl fmt::Debug for WalletCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletCredential")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Load credentials, one key per line. Blank lines and `#` comments are ignored.
///
/// Keys that fail to parse are reported by line number and left out. An empty result
/// is an error: nothing can be dispatched without at least one wallet.
pub fn load_credentials(path: &Path) -> TipperResult<Vec<WalletCredential>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        TipperError::Credentials(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let credentials = parse_credentials(&contents);
    if credentials.is_empty() {
        return Err(TipperError::NoCredentials {
            path: path.display().to_string(),
        });
    }

    info!("Loaded wallets: {}", credentials.len());
    Ok(credentials)
}

fn parse_credentials(contents: &str) -> Vec<WalletCredential> {
    contents
        .lines()
        .enumerate()
        .map(|(n, line)| (n + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|(line_no, line)| match WalletCredential::from_private_key(line) {
            Ok(credential) => Some(credential),
            Err(_) => {
                warn!("Skipping unparseable private key on line {}", line_no);
                None
            }
        })
        .collect()
}
