//! Session-key delegation for smart-contract accounts.
//!
//! The owner key signs a [`SessionPolicy`] that names the game contract and
//! the three functions a session may call. The hosted session service turns
//! that into a session bound to a smart account, and from then on writes go
//! through `POST /sessions/{id}/calls` without touching the owner key again.

use alloy::{
    primitives::{
        Address,
        B256,
        Bytes,
        U256,
    },
    signers::Signer,
};
use chrono::{
    DateTime,
    TimeDelta,
    Utc,
};
use generated_abi::{
    GameCall,
    RawLog,
};
use reqwest::StatusCode;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::BTreeSet,
    time::Duration,
};
use tracing::{
    debug,
    info,
};

use crate::{
    error::{
        ConnectionFailure,
        TransactionFailure,
    },
    ledger::TxReceipt,
};

/// Lifetime of a delegated session, in seconds.
pub const SESSION_VALIDITY_SECS: i64 = 3600;
pub const DEFAULT_RECEIPT_POLL: Duration = Duration::from_millis(750);

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Permission {
    DropBall,
    SettleTickets,
    MintNft,
}

impl Permission {
    pub const ALL: [Permission; 3] = [
        Permission::DropBall,
        Permission::SettleTickets,
        Permission::MintNft,
    ];

    pub fn function_name(self) -> &'static str {
        match self {
            Permission::DropBall => "dropBall",
            Permission::SettleTickets => "settleTickets",
            Permission::MintNft => "mintNFT",
        }
    }

    pub fn for_call(call: &GameCall) -> Self {
        match call {
            GameCall::DropBall { .. } => Permission::DropBall,
            GameCall::SettleTickets { .. } => Permission::SettleTickets,
            GameCall::MintNft { .. } => Permission::MintNft,
        }
    }
}

/// Delegated signing handle. Expiry is enforced by the session service, the
/// client only displays it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionCredential {
    pub session_id: String,
    pub account: Address,
    pub scope: BTreeSet<Permission>,
    pub expires_at: DateTime<Utc>,
}

impl SessionCredential {
    pub fn permits(&self, permission: Permission) -> bool {
        self.scope.contains(&permission)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedAction {
    pub contract: Address,
    pub function: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPolicy {
    pub chain_id: u64,
    pub owner: Address,
    pub actions: Vec<ScopedAction>,
    /// Unix seconds.
    pub expires: i64,
}

impl SessionPolicy {
    pub fn for_game(
        owner: Address,
        contract: Address,
        chain_id: u64,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let actions = Permission::ALL
            .into_iter()
            .map(|permission| ScopedAction {
                contract,
                function: permission.function_name().to_string(),
            })
            .collect();
        Self {
            chain_id,
            owner,
            actions,
            expires: (issued_at + TimeDelta::seconds(SESSION_VALIDITY_SECS)).timestamp(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.expires, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn scope(&self) -> BTreeSet<Permission> {
        Permission::ALL
            .into_iter()
            .filter(|permission| {
                self.actions
                    .iter()
                    .any(|action| action.function == permission.function_name())
            })
            .collect()
    }

    /// Bytes the owner signs (EIP-191 personal message over the policy JSON).
    pub fn signing_payload(&self) -> Result<Vec<u8>, ConnectionFailure> {
        serde_json::to_vec(self)
            .map_err(|e| ConnectionFailure::Session(format!("encoding policy: {e}")))
    }
}

/// `0x`-prefixed hex signature of the policy by `owner`.
pub async fn sign_policy<S>(
    owner: &S,
    policy: &SessionPolicy,
) -> Result<String, ConnectionFailure>
where
    S: Signer + Sync,
{
    let payload = policy.signing_payload()?;
    let signature = owner.sign_message(&payload).await.map_err(|e| {
        ConnectionFailure::rejected(format!("owner did not sign the session policy: {e}"))
    })?;
    Ok(format!("0x{}", hex::encode(signature.as_bytes())))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest<'a> {
    policy: &'a SessionPolicy,
    signature: &'a str,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGrant {
    pub session_id: String,
    pub account: Address,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WriteContractRequest<'a> {
    function: &'a str,
    to: Address,
    data: Bytes,
    value: U256,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteContractResponse {
    hash: B256,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptDto {
    transaction_hash: B256,
    status: ReceiptStatus,
    #[serde(default)]
    logs: Vec<LogDto>,
}

#[derive(Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum ReceiptStatus {
    Success,
    Reverted,
}

#[derive(Deserialize)]
struct LogDto {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
}

impl From<ReceiptDto> for TxReceipt {
    fn from(dto: ReceiptDto) -> Self {
        TxReceipt {
            tx_hash: dto.transaction_hash,
            succeeded: dto.status == ReceiptStatus::Success,
            logs: dto
                .logs
                .into_iter()
                .map(|log| RawLog {
                    address: log.address,
                    topics: log.topics,
                    data: log.data,
                })
                .collect(),
        }
    }
}

/// HTTP client for the hosted session service.
#[derive(Clone, Debug)]
pub struct DelegationClient {
    base_url: String,
    http: reqwest::Client,
    receipt_poll: Duration,
}

impl DelegationClient {
    pub fn new(
        base_url: impl Into<String>,
        receipt_poll: Duration,
    ) -> Result<Self, ConnectionFailure> {
        let http = reqwest::Client::builder().build().map_err(|e| {
            ConnectionFailure::unavailable(format!("building session http client: {e}"))
        })?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            receipt_poll,
        })
    }

    pub async fn create_session(
        &self,
        policy: &SessionPolicy,
        signature: &str,
    ) -> Result<SessionGrant, ConnectionFailure> {
        let url = format!("{}/sessions", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&CreateSessionRequest { policy, signature })
            .send()
            .await
            .map_err(|e| {
                ConnectionFailure::unavailable(format!("session service {url}: {e}"))
            })?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = resp.text().await.unwrap_or_default();
            return Err(ConnectionFailure::rejected(format!(
                "session refused ({status}): {body}"
            )));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ConnectionFailure::Session(format!(
                "POST {url} returned {status}: {body}"
            )));
        }
        resp.json::<SessionGrant>()
            .await
            .map_err(|e| ConnectionFailure::Session(format!("decoding session: {e}")))
    }

    pub async fn write_contract(
        &self,
        session_id: &str,
        contract: Address,
        call: &GameCall,
    ) -> Result<B256, TransactionFailure> {
        let url = format!("{}/sessions/{session_id}/calls", self.base_url);
        let body = WriteContractRequest {
            function: call.function_name(),
            to: contract,
            data: call.calldata(),
            value: call.value(),
        };
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransactionFailure::network(format!("{url}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_call_status(status, text));
        }
        let WriteContractResponse { hash } = resp
            .json()
            .await
            .map_err(|e| TransactionFailure::Malformed(format!("call response: {e}")))?;
        info!(%hash, function = call.function_name(), "session call submitted");
        Ok(hash)
    }

    /// Polls until the receipt exists. There is no local deadline.
    pub async fn wait_for_receipt(
        &self,
        hash: B256,
    ) -> Result<TxReceipt, TransactionFailure> {
        let url = format!("{}/receipts/{hash}", self.base_url);
        loop {
            let resp = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| TransactionFailure::network(format!("{url}: {e}")))?;
            let status = resp.status();
            if status == StatusCode::NOT_FOUND {
                debug!(%hash, "receipt pending");
                tokio::time::sleep(self.receipt_poll).await;
                continue;
            }
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(TransactionFailure::network(format!(
                    "GET {url} returned {status}: {text}"
                )));
            }
            let dto: ReceiptDto = resp.json().await.map_err(|e| {
                TransactionFailure::Malformed(format!("receipt {hash}: {e}"))
            })?;
            return Ok(dto.into());
        }
    }
}

fn classify_call_status(status: StatusCode, body: String) -> TransactionFailure {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            TransactionFailure::Rejected(body)
        }
        StatusCode::UNPROCESSABLE_ENTITY => TransactionFailure::reverted(None, body),
        _ if body.contains("revert") => TransactionFailure::reverted(None, body),
        _ => TransactionFailure::network(format!("session call returned {status}: {body}")),
    }
}

/// Negotiates a [`SessionCredential`] for the game contract.
pub struct SessionEstablisher<'a> {
    client: &'a DelegationClient,
    contract: Address,
    chain_id: u64,
}

impl<'a> SessionEstablisher<'a> {
    pub fn new(client: &'a DelegationClient, contract: Address, chain_id: u64) -> Self {
        Self {
            client,
            contract,
            chain_id,
        }
    }

    pub async fn establish<S>(
        &self,
        owner: &S,
        now: DateTime<Utc>,
    ) -> Result<SessionCredential, ConnectionFailure>
    where
        S: Signer + Sync,
    {
        let policy =
            SessionPolicy::for_game(owner.address(), self.contract, self.chain_id, now);
        let signature = sign_policy(owner, &policy).await?;
        let grant = self.client.create_session(&policy, &signature).await?;
        info!(
            session = %grant.session_id,
            account = %grant.account,
            expires = %policy.expires_at(),
            "session established"
        );
        Ok(SessionCredential {
            session_id: grant.session_id,
            account: grant.account,
            scope: policy.scope(),
            expires_at: policy.expires_at(),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use alloy::signers::local::PrivateKeySigner;
    use generated_abi::test_helpers::{
        TEST_CONTRACT,
        TEST_PLAYER,
        ether,
    };

    fn issued_at() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn for_game__scopes_exactly_three_functions_on_game_contract() {
        // when
        let policy = SessionPolicy::for_game(TEST_PLAYER, TEST_CONTRACT, 11124, issued_at());

        // then
        let functions: Vec<_> = policy.actions.iter().map(|a| a.function.as_str()).collect();
        assert_eq!(functions, vec!["dropBall", "settleTickets", "mintNFT"]);
        assert!(policy.actions.iter().all(|a| a.contract == TEST_CONTRACT));
        assert_eq!(policy.scope(), Permission::ALL.into_iter().collect());
    }

    #[test]
    fn for_game__expires_one_hour_after_issue() {
        let policy = SessionPolicy::for_game(TEST_PLAYER, TEST_CONTRACT, 1, issued_at());

        assert_eq!(policy.expires_at() - issued_at(), TimeDelta::seconds(3600));
    }

    #[test]
    fn signing_payload__uses_camel_case_fields() {
        let policy = SessionPolicy::for_game(TEST_PLAYER, TEST_CONTRACT, 7, issued_at());

        let payload = policy.signing_payload().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();

        assert_eq!(json["chainId"], 7);
        assert_eq!(json["actions"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn sign_policy__produces_65_byte_hex_signature() {
        let owner = PrivateKeySigner::random();
        let policy = SessionPolicy::for_game(owner.address(), TEST_CONTRACT, 1, issued_at());

        let signature = sign_policy(&owner, &policy).await.unwrap();

        assert!(signature.starts_with("0x"));
        assert_eq!(signature.len(), 2 + 65 * 2);
    }

    #[test]
    fn for_call__maps_each_call_to_its_permission() {
        let drop = GameCall::DropBall { wager: ether("0.001") };
        let mint = GameCall::MintNft { toy_id: U256::from(2u64) };

        assert_eq!(Permission::for_call(&drop), Permission::DropBall);
        assert_eq!(Permission::for_call(&mint), Permission::MintNft);
    }

    #[test]
    fn classify_call_status__maps_auth_errors_to_rejection() {
        let forbidden = classify_call_status(StatusCode::FORBIDDEN, "scope".into());
        let unprocessable =
            classify_call_status(StatusCode::UNPROCESSABLE_ENTITY, "low balance".into());
        let gateway = classify_call_status(StatusCode::BAD_GATEWAY, "down".into());

        assert_eq!(forbidden, TransactionFailure::Rejected("scope".into()));
        assert!(matches!(unprocessable, TransactionFailure::Reverted { tx_hash: None, .. }));
        assert!(matches!(gateway, TransactionFailure::Network(_)));
    }

    #[test]
    fn receipt_dto__converts_status_and_logs() {
        let json = serde_json::json!({
            "transactionHash": B256::repeat_byte(0xab),
            "status": "reverted",
            "logs": [{
                "address": TEST_CONTRACT,
                "topics": [B256::repeat_byte(1)],
                "data": "0x01"
            }]
        });

        let receipt: TxReceipt = serde_json::from_value::<ReceiptDto>(json).unwrap().into();

        assert!(!receipt.succeeded);
        assert_eq!(receipt.tx_hash, B256::repeat_byte(0xab));
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(receipt.logs[0].address, TEST_CONTRACT);
    }
}
