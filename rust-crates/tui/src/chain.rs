//! `alloy` implementation of the ledger seam.
//!
//! Reads always go to the JSON-RPC endpoint. Writes go either straight from
//! the unlocked keystore signer (direct path) or through the session service
//! (delegated path), which owns the smart account.

use alloy::{
    network::{
        EthereumWallet,
        ReceiptResponse,
        TransactionBuilder,
    },
    primitives::{
        Address,
        U256,
    },
    providers::{
        DynProvider,
        Provider,
        ProviderBuilder,
    },
    rpc::types::{
        TransactionReceipt,
        TransactionRequest,
    },
    transports::TransportError,
};
use chrono::Utc;
use generated_abi::{
    GameCall,
    RawLog,
    decode_uint_return,
    ticket_balance_of,
};
use reqwest::Url;
use std::{
    path::PathBuf,
    time::Duration,
};
use tracing::info;

use crate::{
    delegation::{
        DelegationClient,
        Permission,
        SessionCredential,
        SessionEstablisher,
    },
    error::{
        ConnectionFailure,
        ReadFailure,
        TransactionFailure,
    },
    ledger::{
        Connection,
        Connector,
        GameLedger,
        TxReceipt,
    },
    session::{
        Credential,
        WalletKind,
    },
    wallets,
};

/// JSON-RPC error code for a request the user refused to sign (EIP-1193).
const USER_REJECTED: i64 = 4001;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainSettings {
    pub rpc_url: Url,
    pub chain_id: u64,
    pub contract: Address,
    pub session_service_url: Option<String>,
    pub receipt_poll: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeystoreLocation {
    pub dir: PathBuf,
    pub name: String,
}

#[derive(Clone)]
enum Writer {
    Direct(DynProvider),
    Delegated {
        client: DelegationClient,
        session: SessionCredential,
    },
}

#[derive(Clone)]
pub struct ChainLedger {
    account: Address,
    contract: Address,
    reader: DynProvider,
    writer: Writer,
}

impl ChainLedger {
    async fn submit_direct(
        &self,
        provider: &DynProvider,
        call: &GameCall,
    ) -> Result<TxReceipt, TransactionFailure> {
        let tx = TransactionRequest::default()
            .with_from(self.account)
            .with_to(self.contract)
            .with_input(call.calldata())
            .with_value(call.value());
        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(classify_rpc_error)?;
        let hash = *pending.tx_hash();
        info!(%hash, function = call.function_name(), "transaction submitted");
        let receipt = pending.get_receipt().await.map_err(|e| {
            TransactionFailure::network(format!("waiting for receipt of {hash}: {e}"))
        })?;
        Ok(receipt_from_rpc(&receipt))
    }
}

impl GameLedger for ChainLedger {
    fn account(&self) -> Address {
        self.account
    }

    fn contract(&self) -> Address {
        self.contract
    }

    async fn submit(&self, call: GameCall) -> Result<TxReceipt, TransactionFailure> {
        match &self.writer {
            Writer::Direct(provider) => self.submit_direct(provider, &call).await,
            Writer::Delegated { client, session } => {
                let permission = Permission::for_call(&call);
                if !session.permits(permission) {
                    return Err(TransactionFailure::Rejected(format!(
                        "session {} does not permit {}",
                        session.session_id,
                        permission.function_name()
                    )));
                }
                let hash = client
                    .write_contract(&session.session_id, self.contract, &call)
                    .await?;
                client.wait_for_receipt(hash).await
            }
        }
    }

    async fn native_balance(&self) -> Result<U256, ReadFailure> {
        self.reader
            .get_balance(self.account)
            .await
            .map_err(|e| ReadFailure::Balance(e.to_string()))
    }

    async fn ticket_balance(&self) -> Result<U256, ReadFailure> {
        let tx = TransactionRequest::default()
            .with_to(self.contract)
            .with_input(ticket_balance_of(self.account));
        let data = self
            .reader
            .call(tx)
            .await
            .map_err(|e| ReadFailure::Tickets(e.to_string()))?;
        decode_uint_return(&data).map_err(|e| ReadFailure::Tickets(e.to_string()))
    }
}

pub struct ChainConnector {
    settings: ChainSettings,
    keystore: KeystoreLocation,
}

impl ChainConnector {
    pub fn new(settings: ChainSettings, keystore: KeystoreLocation) -> Self {
        Self { settings, keystore }
    }

    async fn reader(&self) -> Result<DynProvider, ConnectionFailure> {
        let url = self.settings.rpc_url.clone();
        let reader = ProviderBuilder::new().connect_http(url.clone()).erased();
        let actual = reader.get_chain_id().await.map_err(|e| {
            ConnectionFailure::unavailable(format!("rpc endpoint {url}: {e}"))
        })?;
        if actual != self.settings.chain_id {
            return Err(ConnectionFailure::WrongChain {
                expected: self.settings.chain_id,
                actual,
            });
        }
        Ok(reader)
    }
}

impl Connector for ChainConnector {
    type Ledger = ChainLedger;

    async fn connect(
        &self,
        kind: WalletKind,
        password: String,
    ) -> Result<Connection<ChainLedger>, ConnectionFailure> {
        let descriptor = wallets::find_wallet(&self.keystore.dir, &self.keystore.name)?;
        let signer = wallets::unlock_wallet(&descriptor, &password)?;
        let reader = self.reader().await?;
        let contract = self.settings.contract;

        match kind {
            WalletKind::DirectSigner => {
                let account = signer.address();
                let writer = ProviderBuilder::new()
                    .wallet(EthereumWallet::from(signer))
                    .connect_http(self.settings.rpc_url.clone())
                    .erased();
                Ok(Connection {
                    ledger: ChainLedger {
                        account,
                        contract,
                        reader,
                        writer: Writer::Direct(writer),
                    },
                    credential: Credential::Direct { signer: account },
                })
            }
            WalletKind::SessionDelegated => {
                let service = self.settings.session_service_url.as_deref().ok_or_else(|| {
                    ConnectionFailure::unavailable(
                        "no session service configured (--session-service-url)",
                    )
                })?;
                let client = DelegationClient::new(service, self.settings.receipt_poll)?;
                let credential =
                    SessionEstablisher::new(&client, contract, self.settings.chain_id)
                        .establish(&signer, Utc::now())
                        .await?;
                Ok(Connection {
                    ledger: ChainLedger {
                        account: credential.account,
                        contract,
                        reader,
                        writer: Writer::Delegated {
                            client,
                            session: credential.clone(),
                        },
                    },
                    credential: Credential::Delegated(credential),
                })
            }
        }
    }
}

fn classify_rpc_error(err: TransportError) -> TransactionFailure {
    if let Some(payload) = err.as_error_resp() {
        if payload.code == USER_REJECTED {
            return TransactionFailure::Rejected(payload.message.to_string());
        }
        if payload.message.contains("revert") {
            return TransactionFailure::reverted(None, payload.message.to_string());
        }
    }
    TransactionFailure::network(err.to_string())
}

fn receipt_from_rpc(receipt: &TransactionReceipt) -> TxReceipt {
    TxReceipt {
        tx_hash: receipt.transaction_hash,
        succeeded: receipt.status(),
        logs: receipt
            .inner
            .logs()
            .iter()
            .map(|log| RawLog {
                address: log.inner.address,
                topics: log.inner.data.topics().to_vec(),
                data: log.inner.data.data.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use alloy::primitives::address;
    use alloy::rpc::json_rpc::ErrorPayload;
    use alloy::transports::RpcError;
    use chrono::DateTime;
    use std::collections::BTreeSet;

    fn rpc_error(code: i64, message: &'static str) -> TransportError {
        RpcError::ErrorResp(ErrorPayload {
            code,
            message: message.into(),
            data: None,
        })
    }

    #[test]
    fn classify_rpc_error__user_rejection() {
        let failure = classify_rpc_error(rpc_error(4001, "User rejected the request"));

        assert_eq!(
            failure,
            TransactionFailure::Rejected("User rejected the request".into())
        );
    }

    #[test]
    fn classify_rpc_error__revert_message() {
        let failure = classify_rpc_error(rpc_error(3, "execution reverted: wager too low"));

        assert!(matches!(failure, TransactionFailure::Reverted { tx_hash: None, .. }));
    }

    #[test]
    fn classify_rpc_error__other_codes_are_network_errors() {
        let failure = classify_rpc_error(rpc_error(-32000, "nonce too low"));

        assert!(matches!(failure, TransactionFailure::Network(_)));
    }

    #[tokio::test]
    async fn submit__delegated_call_outside_session_scope_is_rejected() {
        // given
        let url: Url = "http://127.0.0.1:9".parse().unwrap();
        let provider = ProviderBuilder::new().connect_http(url.clone()).erased();
        let session = SessionCredential {
            session_id: "session-7".into(),
            account: address!("2222222222222222222222222222222222222222"),
            scope: BTreeSet::from([Permission::DropBall]),
            expires_at: DateTime::<Utc>::from_timestamp(1_700_003_600, 0).unwrap(),
        };
        let ledger = ChainLedger {
            account: session.account,
            contract: generated_abi::GAME_CONTRACT_ADDRESS,
            reader: provider,
            writer: Writer::Delegated {
                client: DelegationClient::new(url.as_str(), Duration::from_millis(10)).unwrap(),
                session,
            },
        };

        // when
        let result = ledger
            .submit(GameCall::MintNft {
                toy_id: U256::from(1),
            })
            .await;

        // then
        assert_eq!(
            result,
            Err(TransactionFailure::Rejected(
                "session session-7 does not permit mintNFT".into()
            ))
        );
    }
}
