//! Where the game contract lives and how to reach it.

use alloy::primitives::Address;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::{
    DeploymentEnv,
    DeploymentStore,
    compute_abi_fingerprint,
};
use reqwest::Url;
use std::time::Duration;
use tracing::{
    info,
    warn,
};

use crate::chain::ChainSettings;

pub const DEFAULT_TESTNET_RPC_URL: &str = "https://api.testnet.abs.xyz";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:8545";
pub const TESTNET_CHAIN_ID: u64 = 11124;
pub const LOCAL_CHAIN_ID: u64 = 31337;
pub const TESTNET_GAME_CONTRACT: Address = generated_abi::GAME_CONTRACT_ADDRESS;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkTarget {
    Testnet,
    Local,
}

impl NetworkTarget {
    pub fn deployment_env(self) -> DeploymentEnv {
        match self {
            NetworkTarget::Testnet => DeploymentEnv::Testnet,
            NetworkTarget::Local => DeploymentEnv::Local,
        }
    }

    fn default_rpc_url(self) -> &'static str {
        match self {
            NetworkTarget::Testnet => DEFAULT_TESTNET_RPC_URL,
            NetworkTarget::Local => DEFAULT_LOCAL_RPC_URL,
        }
    }

    fn default_chain_id(self) -> u64 {
        match self {
            NetworkTarget::Testnet => TESTNET_CHAIN_ID,
            NetworkTarget::Local => LOCAL_CHAIN_ID,
        }
    }
}

/// Values given on the command line; each wins over the deployment record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overrides {
    pub rpc_url: Option<String>,
    pub contract: Option<Address>,
    pub chain_id: Option<u64>,
    pub session_service_url: Option<String>,
}

/// Resolves chain settings from, in order: overrides, the latest deployment
/// record compatible with `abi_signatures`, and for testnet the built-in
/// deployment. A local network with neither a record nor `--contract` is an
/// error.
pub fn resolve_chain_settings(
    target: NetworkTarget,
    store: &DeploymentStore,
    abi_signatures: &[&str],
    overrides: Overrides,
    receipt_poll: Duration,
) -> Result<ChainSettings> {
    let fingerprint = compute_abi_fingerprint(abi_signatures);
    let record = store
        .latest_compatible(&fingerprint)
        .map_err(|e| eyre!(e))
        .wrap_err_with(|| format!("reading {}", store.path().display()))?;

    let (record_contract, record_url, record_chain, record_sessions) = match record {
        Some(record) => {
            info!(
                contract = %record.contract_address,
                deployed_at = %record.deployed_at,
                "using recorded {} deployment",
                store.env()
            );
            let contract = record
                .contract_address
                .parse::<Address>()
                .wrap_err_with(|| {
                    format!("invalid contract address {}", record.contract_address)
                })?;
            (
                Some(contract),
                Some(record.network_url),
                Some(record.chain_id),
                record.session_service_url,
            )
        }
        None => {
            warn!(
                fingerprint = %fingerprint,
                "no compatible {} deployment recorded",
                store.env()
            );
            (None, None, None, None)
        }
    };

    let fallback_contract = match target {
        NetworkTarget::Testnet => Some(TESTNET_GAME_CONTRACT),
        NetworkTarget::Local => None,
    };
    let contract = overrides
        .contract
        .or(record_contract)
        .or(fallback_contract)
        .ok_or_else(|| {
            eyre!(
                "No compatible local deployment recorded in {}; pass --contract <address>",
                store.path().display()
            )
        })?;

    let raw_url = overrides
        .rpc_url
        .or(record_url)
        .unwrap_or_else(|| target.default_rpc_url().to_string());
    let rpc_url =
        Url::parse(&raw_url).wrap_err_with(|| format!("invalid RPC URL {raw_url}"))?;

    Ok(ChainSettings {
        rpc_url,
        chain_id: overrides
            .chain_id
            .or(record_chain)
            .unwrap_or_else(|| target.default_chain_id()),
        contract,
        session_service_url: overrides.session_service_url.or(record_sessions),
        receipt_poll,
    })
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use alloy::primitives::address;
    use deployments::record_deployment;

    const SIGNATURES: [&str; 2] = ["dropBall(uint256)", "mintNFT(uint256)"];
    const POLL: Duration = Duration::from_millis(10);

    fn store(env: DeploymentEnv) -> (tempfile::TempDir, DeploymentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DeploymentStore::at(dir.path(), env).unwrap();
        (dir, store)
    }

    #[test]
    fn resolve_chain_settings__testnet_falls_back_to_builtin_deployment() {
        // given
        let (_dir, store) = store(DeploymentEnv::Testnet);

        // when
        let settings = resolve_chain_settings(
            NetworkTarget::Testnet,
            &store,
            &SIGNATURES,
            Overrides::default(),
            POLL,
        )
        .unwrap();

        // then
        assert_eq!(settings.contract, TESTNET_GAME_CONTRACT);
        assert_eq!(settings.chain_id, TESTNET_CHAIN_ID);
        assert_eq!(settings.rpc_url.as_str(), "https://api.testnet.abs.xyz/");
        assert_eq!(settings.session_service_url, None);
    }

    #[test]
    fn resolve_chain_settings__prefers_compatible_record() {
        // given
        let (_dir, store) = store(DeploymentEnv::Local);
        let fingerprint = compute_abi_fingerprint(&SIGNATURES);
        record_deployment(
            &store,
            "0x3333333333333333333333333333333333333333",
            &fingerprint,
            "http://127.0.0.1:9545",
            1337,
            Some("http://127.0.0.1:7000"),
        )
        .unwrap();

        // when
        let settings = resolve_chain_settings(
            NetworkTarget::Local,
            &store,
            &SIGNATURES,
            Overrides::default(),
            POLL,
        )
        .unwrap();

        // then
        assert_eq!(
            settings.contract,
            address!("3333333333333333333333333333333333333333")
        );
        assert_eq!(settings.chain_id, 1337);
        assert_eq!(
            settings.session_service_url.as_deref(),
            Some("http://127.0.0.1:7000")
        );
    }

    #[test]
    fn resolve_chain_settings__overrides_win_over_record() {
        let (_dir, store) = store(DeploymentEnv::Local);
        let fingerprint = compute_abi_fingerprint(&SIGNATURES);
        record_deployment(
            &store,
            "0x3333333333333333333333333333333333333333",
            &fingerprint,
            "http://127.0.0.1:9545",
            1337,
            None::<&str>,
        )
        .unwrap();
        let overrides = Overrides {
            contract: Some(TESTNET_GAME_CONTRACT),
            chain_id: Some(5),
            ..Overrides::default()
        };

        let settings =
            resolve_chain_settings(NetworkTarget::Local, &store, &SIGNATURES, overrides, POLL)
                .unwrap();

        assert_eq!(settings.contract, TESTNET_GAME_CONTRACT);
        assert_eq!(settings.chain_id, 5);
        assert_eq!(settings.rpc_url.as_str(), "http://127.0.0.1:9545/");
    }

    #[test]
    fn resolve_chain_settings__local_without_record_or_override_fails() {
        let (_dir, store) = store(DeploymentEnv::Local);
        record_deployment(&store, "0x01", "stale", "http://x", 1, None::<&str>).unwrap();

        let result = resolve_chain_settings(
            NetworkTarget::Local,
            &store,
            &SIGNATURES,
            Overrides::default(),
            POLL,
        );

        assert!(result.is_err());
    }
}
