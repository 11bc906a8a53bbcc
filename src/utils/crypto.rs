use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use keyring::Entry;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{AppError, AppResult};

const KEYRING_SERVICE: &str = "interpreter-wellness.vault";
const VERSION_PREFIX: &str = "v1:";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const PBKDF2_ITERATIONS: u32 = 120_000;

#[derive(Clone)]
enum MasterSource {
    Keyring { account: String },
    Fixed(Vec<u8>),
}

/// Encrypts secrets (remote API key, session token) before they reach the local cache.
#[derive(Clone)]
pub struct CryptoVault {
    source: MasterSource,
}

impl CryptoVault {
    pub fn from_database_path(path: &Path) -> AppResult<Self> {
        let account = account_from_path(path);
        Self::new(&account)
    }

    pub fn new(account_id: &str) -> AppResult<Self> {
        Entry::new(KEYRING_SERVICE, account_id)
            .map_err(|err| AppError::other(format!("cannot open system keyring: {err}")))?;
        Ok(Self {
            source: MasterSource::Keyring {
                account: account_id.to_string(),
            },
        })
    }

    /// Vault with a caller-held master secret; nothing is read from or written to the keyring.
    pub fn with_master_secret(master_secret: &[u8]) -> AppResult<Self> {
        if master_secret.len() != KEY_LEN {
            return Err(AppError::other("master secret has an invalid length"));
        }
        Ok(Self {
            source: MasterSource::Fixed(master_secret.to_vec()),
        })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> AppResult<String> {
        let master = self.master_secret()?;
        encrypt_with_master(&master, plaintext)
    }

    pub fn decrypt(&self, ciphertext: &str) -> AppResult<Vec<u8>> {
        let master = self.master_secret()?;
        decrypt_with_master(&master, ciphertext)
    }

    pub fn encrypt_str(&self, plaintext: &str) -> AppResult<String> {
        self.encrypt(plaintext.as_bytes())
    }

    pub fn decrypt_string(&self, ciphertext: &str) -> AppResult<String> {
        let bytes = self.decrypt(ciphertext)?;
        String::from_utf8(bytes)
            .map_err(|_| AppError::other("decrypted secret is not valid UTF-8"))
    }

    pub fn clear_master_secret(&self) -> AppResult<()> {
        let MasterSource::Keyring { account } = &self.source else {
            return Ok(());
        };
        match keyring_entry(account)?.delete_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(AppError::other(format!(
                "cannot remove master secret from system keyring: {err}"
            ))),
        }
    }

    fn master_secret(&self) -> AppResult<Vec<u8>> {
        match &self.source {
            MasterSource::Fixed(secret) => Ok(secret.clone()),
            MasterSource::Keyring { account } => load_or_create_master_secret(account),
        }
    }
}

fn keyring_entry(account: &str) -> AppResult<Entry> {
    Entry::new(KEYRING_SERVICE, account)
        .map_err(|err| AppError::other(format!("cannot open system keyring: {err}")))
}

fn load_or_create_master_secret(account: &str) -> AppResult<Vec<u8>> {
    let entry = keyring_entry(account)?;
    match entry.get_password() {
        Ok(secret) => decode_master_secret(&secret),
        Err(keyring::Error::NoEntry) => {
            let mut secret = vec![0u8; KEY_LEN];
            OsRng.fill_bytes(&mut secret);
            entry
                .set_password(&Base64.encode(&secret))
                .map_err(|err| AppError::other(format!("cannot write system keyring: {err}")))?;
            Ok(secret)
        }
        Err(err) => Err(AppError::other(format!("cannot read system keyring: {err}"))),
    }
}

pub(crate) fn encrypt_with_master(master_secret: &[u8], plaintext: &[u8]) -> AppResult<String> {
    if master_secret.len() != KEY_LEN {
        return Err(AppError::other("master secret has an invalid length"));
    }

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let key = derive_key(master_secret, &salt);
    let cipher =
        Aes256Gcm::new_from_slice(&key).map_err(|_| AppError::other("cannot initialize cipher"))?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| AppError::other("encryption failed"))?;

    // salt || nonce || ciphertext
    let mut payload = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    payload.extend_from_slice(&salt);
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&ciphertext);

    Ok(format!("{VERSION_PREFIX}{}", Base64.encode(payload)))
}

pub(crate) fn decrypt_with_master(master_secret: &[u8], ciphertext: &str) -> AppResult<Vec<u8>> {
    if master_secret.len() != KEY_LEN {
        return Err(AppError::other("master secret has an invalid length"));
    }

    let encoded = ciphertext
        .strip_prefix(VERSION_PREFIX)
        .ok_or_else(|| AppError::other("unsupported ciphertext version"))?;

    let decoded = Base64
        .decode(encoded.as_bytes())
        .map_err(|_| AppError::other("ciphertext is not valid base64"))?;

    if decoded.len() <= SALT_LEN + NONCE_LEN {
        return Err(AppError::other("ciphertext is truncated"));
    }

    let (salt, rest) = decoded.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext_bytes) = rest.split_at(NONCE_LEN);

    let key = derive_key(master_secret, salt);
    let cipher =
        Aes256Gcm::new_from_slice(&key).map_err(|_| AppError::other("cannot initialize cipher"))?;

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext_bytes)
        .map_err(|_| AppError::other("decryption failed"))
}

fn derive_key(master: &[u8], salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(master, salt, PBKDF2_ITERATIONS, &mut key);
    key
}

fn decode_master_secret(encoded: &str) -> AppResult<Vec<u8>> {
    let secret = Base64
        .decode(encoded.as_bytes())
        .map_err(|_| AppError::other("stored master secret is corrupted"))?;
    if secret.len() != KEY_LEN {
        return Err(AppError::other("stored master secret has an invalid length"));
    }
    Ok(secret)
}

fn account_from_path(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"interpreter-wellness.cache.v1");
    hasher.update(path.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest[..16].iter().map(|byte| format!("{byte:02x}")).collect();
    format!("wellness-{hex}")
}
