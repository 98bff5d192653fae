use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Testnet,
    Local,
}

impl DeploymentEnv {
    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Testnet => "testnet",
            DeploymentEnv::Local => "local",
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Testnet => "Abstract Testnet",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployed_at: String,
    pub contract_address: String,
    pub abi_fingerprint: String,
    pub network_url: String,
    pub chain_id: u64,
    #[serde(default)]
    pub session_service_url: Option<String>,
}

impl DeploymentRecord {
    pub fn is_compatible_with_fingerprint(&self, fingerprint: &str) -> bool {
        self.abi_fingerprint == fingerprint
    }
}

/// Append-only list of deployments for one network, stored as JSON under
/// `<root>/<env>/deployments.json`.
#[derive(Debug)]
pub struct DeploymentStore {
    env: DeploymentEnv,
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        Self::at(DEPLOYMENTS_ROOT, env)
    }

    pub fn at(root: impl AsRef<Path>, env: DeploymentEnv) -> Result<Self> {
        let path = ensure_store(root.as_ref(), env)?;
        Ok(Self { env, path })
    }

    pub fn env(&self) -> DeploymentEnv {
        self.env
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<DeploymentRecord>> {
        read_records(&self.path)
    }

    pub fn append(&self, record: DeploymentRecord) -> Result<()> {
        let mut records = self.load()?;
        records.push(record);
        write_records(&self.path, &records)
    }

    /// Most recently appended record whose ABI fingerprint matches.
    pub fn latest_compatible(&self, fingerprint: &str) -> Result<Option<DeploymentRecord>> {
        let records = self.load()?;
        Ok(records
            .into_iter()
            .rev()
            .find(|record| record.is_compatible_with_fingerprint(fingerprint)))
    }
}

pub fn record_deployment(
    store: &DeploymentStore,
    contract_address: impl AsRef<str>,
    abi_fingerprint: impl AsRef<str>,
    network_url: impl AsRef<str>,
    chain_id: u64,
    session_service_url: Option<impl AsRef<str>>,
) -> Result<DeploymentRecord> {
    let record = DeploymentRecord {
        deployed_at: Utc::now().to_rfc3339(),
        contract_address: contract_address.as_ref().to_string(),
        abi_fingerprint: abi_fingerprint.as_ref().to_string(),
        network_url: network_url.as_ref().to_string(),
        chain_id,
        session_service_url: session_service_url.map(|url| url.as_ref().to_string()),
    };
    store.append(record.clone())?;
    Ok(record)
}

/// SHA-256 over the newline-joined ABI signatures, hex encoded.
pub fn compute_abi_fingerprint(signatures: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for signature in signatures {
        hasher.update(signature.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

fn ensure_store(root: &Path, env: DeploymentEnv) -> Result<PathBuf> {
    let env_dir = root.join(env.dir_name());
    if !env_dir.exists() {
        fs::create_dir_all(&env_dir).with_context(|| {
            format!(
                "Failed to create deployments directory {}",
                env_dir.display()
            )
        })?;
    }

    let file_path = env_dir.join(DEPLOYMENTS_FILE);
    if !file_path.exists() {
        fs::write(&file_path, b"[]").with_context(|| {
            format!(
                "Failed to initialize deployment record file for {} at {}",
                env,
                file_path.display()
            )
        })?;
    }

    Ok(file_path)
}

fn read_records(path: impl AsRef<Path>) -> Result<Vec<DeploymentRecord>> {
    let data = fs::read(path.as_ref()).context("Failed to read deployment records")?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice::<Vec<DeploymentRecord>>(&data).map_err(|e| {
        anyhow!(
            "Failed to parse deployment records JSON at {}: {e}",
            path.as_ref().display()
        )
    })
}

fn write_records(path: impl AsRef<Path>, records: &[DeploymentRecord]) -> Result<()> {
    let json = serde_json::to_vec_pretty(records)
        .context("Failed to serialize deployment records")?;
    fs::write(path.as_ref(), json).context("Failed to write deployment records")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    const FINGERPRINT: &str = "abc123";

    fn store() -> (tempfile::TempDir, DeploymentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DeploymentStore::at(dir.path(), DeploymentEnv::Local).unwrap();
        (dir, store)
    }

    #[test]
    fn at__creates_empty_record_file() {
        // when
        let (_dir, store) = store();

        // then
        assert!(store.path().exists());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn latest_compatible__returns_most_recent_matching_record() {
        // given
        let (_dir, store) = store();
        record_deployment(&store, "0x01", FINGERPRINT, "http://a", 1, None::<&str>)
            .unwrap();
        let expected = record_deployment(
            &store,
            "0x02",
            FINGERPRINT,
            "http://b",
            1,
            Some("http://sessions"),
        )
        .unwrap();
        record_deployment(&store, "0x03", "other", "http://c", 1, None::<&str>).unwrap();

        // when
        let actual = store.latest_compatible(FINGERPRINT).unwrap();

        // then
        assert_eq!(actual, Some(expected));
    }

    #[test]
    fn latest_compatible__none_when_no_fingerprint_matches() {
        let (_dir, store) = store();
        record_deployment(&store, "0x01", "stale", "http://a", 1, None::<&str>).unwrap();

        let actual = store.latest_compatible(FINGERPRINT).unwrap();

        assert!(actual.is_none());
    }

    #[test]
    fn load__rejects_malformed_json() {
        let (_dir, store) = store();
        fs::write(store.path(), b"{not json").unwrap();

        assert!(store.load().is_err());
    }

    #[test]
    fn compute_abi_fingerprint__depends_on_signature_order() {
        let forward = compute_abi_fingerprint(&["a()", "b()"]);
        let reversed = compute_abi_fingerprint(&["b()", "a()"]);

        assert_ne!(forward, reversed);
        assert_eq!(forward.len(), 64);
    }
}
