use alloy::signers::local::{
    MnemonicBuilder,
    PrivateKeySigner,
    coins_bip39::English,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use eth_keystore::{
    KeystoreError,
    decrypt_key,
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

use crate::error::ConnectionFailure;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_wallet_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".foundry").join("keystores"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

/// Keystore files in `dir`, sorted by name. A missing directory has none.
pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>, ConnectionFailure> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|e| {
        ConnectionFailure::unavailable(format!("reading {}: {e}", dir.display()))
    })?;
    let mut wallets = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| ConnectionFailure::unavailable(format!("wallet entry: {e}")))?
            .path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let name = name.strip_suffix(".json").unwrap_or(name).to_owned();
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor, ConnectionFailure> {
    list_wallets(dir)?
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| {
            ConnectionFailure::unavailable(format!(
                "wallet '{name}' not found in {}",
                dir.display()
            ))
        })
}

/// A wrong password is a rejection; anything else about the file means
/// there is no usable wallet.
pub fn unlock_wallet(
    descriptor: &WalletDescriptor,
    password: &str,
) -> Result<PrivateKeySigner, ConnectionFailure> {
    let secret = decrypt_key(&descriptor.path, password.as_bytes()).map_err(|e| match e {
        KeystoreError::MacMismatch => ConnectionFailure::rejected(format!(
            "invalid password for wallet '{}'",
            descriptor.name
        )),
        other => ConnectionFailure::unavailable(format!(
            "reading wallet '{}': {other}",
            descriptor.name
        )),
    })?;

    if let Ok(signer) = PrivateKeySigner::from_slice(&secret) {
        return Ok(signer);
    }

    if let Ok(mnemonic) = std::str::from_utf8(&secret)
        && mnemonic.split_whitespace().count() >= 12
    {
        return MnemonicBuilder::<English>::default()
            .phrase(mnemonic)
            .build()
            .map_err(|e| {
                ConnectionFailure::unavailable(format!(
                    "deriving key for wallet '{}': {e}",
                    descriptor.name
                ))
            });
    }

    Err(ConnectionFailure::unavailable(format!(
        "wallet '{}' contained unsupported key material",
        descriptor.name
    )))
}
