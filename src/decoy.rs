//! Decoy Vault - Decoy Access Controller
//!
//! Decides from a submitted credential which vault the session exposes.
//!
//! The controller is a two-state machine (`Real` / `Decoy`). It owns the
//! decoy credential digests, the decoy settings blob and the persisted
//! last access mode. Switching modes never touches file content; callers
//! re-resolve the active selector afterwards.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::crypto;
use crate::error::{VaultError, VaultResult};
use crate::file_cipher::FileCipher;
use crate::index::{VaultFileRecord, VaultIndex, VaultSelector};
use crate::secure_fs::DeleteOutcome;
use crate::secure_store::{keys, SecureStore};

/// Shortest accepted decoy PIN
pub const MIN_PIN_LEN: usize = 4;

// ═══════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// What the UI shows when a panic is triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PanicAction {
    #[default]
    ShowDecoy,
    ShowEmpty,
    ShowCalculator,
    LockOut,
    /// Securely deletes every real-vault file
    ClearRealVault,
}

impl PanicAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PanicAction::ShowDecoy => "showDecoy",
            PanicAction::ShowEmpty => "showEmpty",
            PanicAction::ShowCalculator => "showCalculator",
            PanicAction::LockOut => "lockOut",
            PanicAction::ClearRealVault => "clearRealVault",
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, PanicAction::ClearRealVault)
    }
}

impl fmt::Display for PanicAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PanicAction {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "showDecoy" | "show-decoy" => Ok(PanicAction::ShowDecoy),
            "showEmpty" | "show-empty" => Ok(PanicAction::ShowEmpty),
            "showCalculator" | "show-calculator" => Ok(PanicAction::ShowCalculator),
            "lockOut" | "lock-out" => Ok(PanicAction::LockOut),
            "clearRealVault" | "clear-real-vault" => Ok(PanicAction::ClearRealVault),
            other => Err(VaultError::SerializationError(format!(
                "unknown panic action: {}",
                other
            ))),
        }
    }
}

/// Decoy configuration, one per installation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecoySettings {
    pub is_enabled: bool,
    pub has_pin_set: bool,
    pub has_password_set: bool,
    pub panic_action: PanicAction,
    pub show_fake_notification: bool,
    pub custom_decoy_name: Option<String>,
}

impl DecoySettings {
    pub fn has_credential(&self) -> bool {
        self.has_pin_set || self.has_password_set
    }
}

/// Which vault the session exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    Real,
    Decoy,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Real => "real",
            AccessMode::Decoy => "decoy",
        }
    }

    pub fn selector(&self) -> VaultSelector {
        match self {
            AccessMode::Real => VaultSelector::Real,
            AccessMode::Decoy => VaultSelector::Decoy,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "real" => Some(AccessMode::Real),
            "decoy" => Some(AccessMode::Decoy),
            _ => None,
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Pin,
    Password,
}

impl CredentialKind {
    fn storage_key(&self) -> &'static str {
        match self {
            CredentialKind::Pin => keys::DECOY_PIN_HASH,
            CredentialKind::Password => keys::DECOY_PASSWORD_HASH,
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::Pin => f.write_str("pin"),
            CredentialKind::Password => f.write_str("password"),
        }
    }
}

/// Outcome of matching input against the decoy credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialCheck {
    pub is_decoy: bool,
    pub credential_type: Option<CredentialKind>,
}

impl CredentialCheck {
    fn no_match() -> Self {
        Self {
            is_decoy: false,
            credential_type: None,
        }
    }

    fn matched(kind: CredentialKind) -> Self {
        Self {
            is_decoy: true,
            credential_type: Some(kind),
        }
    }
}

/// Verifies the real-vault credential; the engine never stores it
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, input: &str) -> VaultResult<bool>;
}

/// Result of `authenticate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Real,
    Decoy { panic_action: PanicAction },
    Denied,
}

/// Per-record result of a panic clear
#[derive(Debug, Default)]
pub struct PanicClearReport {
    /// Records whose ciphertext was overwritten and removed
    pub shredded: Vec<String>,
    /// Records removed with a plain delete after the overwrite failed
    pub degraded: Vec<String>,
    /// Records dropped whose ciphertext was already gone
    pub missing: Vec<String>,
    pub failed: Vec<(String, VaultError)>,
}

impl PanicClearReport {
    pub fn removed(&self) -> usize {
        self.shredded.len() + self.degraded.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CONTROLLER
// ═══════════════════════════════════════════════════════════════════════════

/// Decoy Access Controller
pub struct DecoyAccessController {
    store: Arc<dyn SecureStore>,
    mode: RwLock<AccessMode>,
    /// Serializes settings read-modify-write within the process
    settings_lock: Mutex<()>,
}

impl DecoyAccessController {
    /// New controller; the session starts in `Real` until a mode is
    /// activated
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self {
            store,
            mode: RwLock::new(AccessMode::Real),
            settings_lock: Mutex::new(()),
        }
    }

    async fn read(&self, key: &str) -> VaultResult<Option<String>> {
        self.store.read(key).await.map_err(store_fault)
    }

    async fn write(&self, key: &str, value: &str) -> VaultResult<()> {
        self.store.write(key, value).await.map_err(store_fault)
    }

    // ───────────────────────────────────────────────────────────────────────
    // Credentials
    // ───────────────────────────────────────────────────────────────────────

    /// Validate, hash and persist a decoy credential
    pub async fn set_decoy_credential(&self, kind: CredentialKind, value: &str) -> VaultResult<()> {
        validate_credential(kind, value)?;

        let digest = crypto::hash(value.as_bytes());
        self.write(kind.storage_key(), &digest).await?;
        self.update_settings(|_| {}).await?;

        log::info!("Decoy {} set", kind);
        Ok(())
    }

    pub async fn set_decoy_pin(&self, pin: &str) -> VaultResult<()> {
        self.set_decoy_credential(CredentialKind::Pin, pin).await
    }

    pub async fn set_decoy_password(&self, password: &str) -> VaultResult<()> {
        self.set_decoy_credential(CredentialKind::Password, password)
            .await
    }

    /// Remove a decoy credential; decoy mode is disabled once none remain
    pub async fn clear_decoy_credential(&self, kind: CredentialKind) -> VaultResult<()> {
        self.store
            .delete(kind.storage_key())
            .await
            .map_err(store_fault)?;

        let settings = self.update_settings(|_| {}).await?;
        if settings.is_enabled && !settings.has_credential() {
            self.set_enabled(false).await?;
        }

        log::info!("Decoy {} cleared", kind);
        Ok(())
    }

    async fn matches(&self, kind: CredentialKind, input: &str) -> VaultResult<bool> {
        let stored = match self.read(kind.storage_key()).await? {
            Some(digest) => digest,
            None => return Ok(false),
        };
        let digest = crypto::hash(input.as_bytes());
        Ok(crypto::constant_time_eq(digest.as_bytes(), stored.as_bytes()))
    }

    pub async fn verify_decoy_pin(&self, pin: &str) -> VaultResult<bool> {
        self.matches(CredentialKind::Pin, pin).await
    }

    pub async fn verify_decoy_password(&self, password: &str) -> VaultResult<bool> {
        self.matches(CredentialKind::Password, password).await
    }

    /// Match `input` against the decoy credentials.
    ///
    /// Always a non-match while decoy mode is disabled. The PIN is checked
    /// before the password.
    pub async fn check_credential(&self, input: &str) -> VaultResult<CredentialCheck> {
        if !self.is_enabled().await? {
            return Ok(CredentialCheck::no_match());
        }

        for kind in [CredentialKind::Pin, CredentialKind::Password] {
            if self.matches(kind, input).await? {
                return Ok(CredentialCheck::matched(kind));
            }
        }
        Ok(CredentialCheck::no_match())
    }

    /// Route a credential to the decoy or the real vault and activate it.
    ///
    /// Decoy credentials are checked first. A denied credential leaves the
    /// current mode untouched.
    pub async fn authenticate(
        &self,
        input: &str,
        verifier: &dyn CredentialVerifier,
    ) -> VaultResult<AccessDecision> {
        let check = self.check_credential(input).await?;
        if check.is_decoy {
            let panic_action = self.settings().await?.panic_action;
            self.activate(AccessMode::Decoy).await?;
            return Ok(AccessDecision::Decoy { panic_action });
        }

        if verifier.verify(input).await? {
            self.activate(AccessMode::Real).await?;
            return Ok(AccessDecision::Real);
        }

        log::debug!("Credential rejected");
        Ok(AccessDecision::Denied)
    }

    // ───────────────────────────────────────────────────────────────────────
    // Mode
    // ───────────────────────────────────────────────────────────────────────

    /// Switch the session mode and persist it as the last access mode
    pub async fn activate(&self, mode: AccessMode) -> VaultResult<()> {
        self.write(keys::LAST_ACCESS_MODE, mode.as_str()).await?;
        let previous = std::mem::replace(&mut *self.mode.write(), mode);
        if previous != mode {
            log::info!("Access mode {} -> {}", previous, mode);
        }
        Ok(())
    }

    /// Leave decoy mode
    pub async fn deactivate(&self) -> VaultResult<()> {
        self.activate(AccessMode::Real).await
    }

    pub fn current_mode(&self) -> AccessMode {
        *self.mode.read()
    }

    pub fn active_selector(&self) -> VaultSelector {
        self.current_mode().selector()
    }

    /// Mode recorded by the last `activate`, `Real` if none was recorded
    pub async fn last_access_mode(&self) -> VaultResult<AccessMode> {
        Ok(self
            .read(keys::LAST_ACCESS_MODE)
            .await?
            .as_deref()
            .and_then(AccessMode::parse)
            .unwrap_or(AccessMode::Real))
    }

    // ───────────────────────────────────────────────────────────────────────
    // Settings
    // ───────────────────────────────────────────────────────────────────────

    pub async fn is_enabled(&self) -> VaultResult<bool> {
        Ok(self.read(keys::DECOY_MODE_ENABLED).await?.as_deref() == Some("true"))
    }

    /// Turn decoy mode on or off; enabling needs a credential
    pub async fn set_enabled(&self, enabled: bool) -> VaultResult<()> {
        let settings = self.settings().await?;
        if enabled && !settings.has_credential() {
            return Err(VaultError::InvalidCredential(
                "set a decoy PIN or password before enabling decoy mode".into(),
            ));
        }

        self.update_settings(|s| s.is_enabled = enabled).await?;
        log::info!("Decoy mode {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub async fn set_panic_action(&self, action: PanicAction) -> VaultResult<()> {
        self.update_settings(|s| s.panic_action = action).await?;
        Ok(())
    }

    /// Current settings; credential flags reflect the stored digests
    pub async fn settings(&self) -> VaultResult<DecoySettings> {
        let mut settings: DecoySettings = match self.read(keys::DECOY_SETTINGS).await? {
            Some(json) => serde_json::from_str(&json)?,
            None => DecoySettings::default(),
        };

        settings.is_enabled = self.is_enabled().await?;
        settings.has_pin_set = self.read(keys::DECOY_PIN_HASH).await?.is_some();
        settings.has_password_set = self.read(keys::DECOY_PASSWORD_HASH).await?.is_some();
        Ok(settings)
    }

    /// Read-modify-write the settings, last writer wins.
    ///
    /// Credential flags cannot be set through `f`; they always follow the
    /// stored digests.
    pub async fn update_settings(
        &self,
        f: impl FnOnce(&mut DecoySettings) + Send,
    ) -> VaultResult<DecoySettings> {
        let _guard = self.settings_lock.lock().await;

        let current = self.settings().await?;
        let mut next = current.clone();
        f(&mut next);
        next.has_pin_set = current.has_pin_set;
        next.has_password_set = current.has_password_set;

        let json = serde_json::to_string(&next)?;
        self.write(keys::DECOY_SETTINGS, &json).await?;
        self.write(
            keys::DECOY_MODE_ENABLED,
            if next.is_enabled { "true" } else { "false" },
        )
        .await?;
        Ok(next)
    }

    // ───────────────────────────────────────────────────────────────────────
    // Content
    // ───────────────────────────────────────────────────────────────────────

    /// Records of the vault the session currently exposes
    pub async fn files_for_current_mode(
        &self,
        index: &dyn VaultIndex,
    ) -> VaultResult<Vec<VaultFileRecord>> {
        index.list_by_selector(self.active_selector()).await
    }

    /// Securely delete every real-vault file and drop its record.
    ///
    /// Keeps going past per-file failures; a record is only dropped once
    /// its ciphertext is gone.
    pub async fn clear_real_vault(
        &self,
        index: &dyn VaultIndex,
        cipher: &FileCipher,
    ) -> VaultResult<PanicClearReport> {
        let records = index.list_by_selector(VaultSelector::Real).await?;
        let mut report = PanicClearReport::default();

        for record in records {
            let outcome = match cipher.shred_record(&record).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    report.failed.push((record.id, e));
                    continue;
                }
            };
            if let Err(e) = index.delete(&record.id).await {
                report.failed.push((record.id, e));
                continue;
            }
            match outcome {
                DeleteOutcome::Degraded => report.degraded.push(record.id),
                DeleteOutcome::Shredded => report.shredded.push(record.id),
                DeleteOutcome::Missing => report.missing.push(record.id),
            }
        }

        log::warn!(
            "Real vault cleared: {} removed, {} degraded, {} already missing, {} failed",
            report.removed(),
            report.degraded.len(),
            report.missing.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

fn validate_credential(kind: CredentialKind, value: &str) -> VaultResult<()> {
    match kind {
        CredentialKind::Pin if value.chars().count() < MIN_PIN_LEN => Err(
            VaultError::InvalidCredential(format!("PIN must be at least {} characters", MIN_PIN_LEN)),
        ),
        CredentialKind::Password if value.is_empty() => Err(VaultError::InvalidCredential(
            "password must not be empty".into(),
        )),
        _ => Ok(()),
    }
}

fn store_fault(e: VaultError) -> VaultError {
    match e {
        VaultError::KeyStoreUnavailable(_) => e,
        other => VaultError::KeyStoreUnavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::VaultGate;
    use crate::index::{FileKind, MemoryVaultIndex};
    use crate::keystore::KeyStore;
    use crate::secure_fs::SecureFs;
    use crate::secure_store::MemorySecureStore;
    use tempfile::tempdir;

    struct FixedVerifier(&'static str);

    #[async_trait]
    impl CredentialVerifier for FixedVerifier {
        async fn verify(&self, input: &str) -> VaultResult<bool> {
            Ok(input == self.0)
        }
    }

    fn controller() -> (Arc<MemorySecureStore>, DecoyAccessController) {
        let store = Arc::new(MemorySecureStore::new());
        let controller = DecoyAccessController::new(store.clone());
        (store, controller)
    }

    #[tokio::test]
    async fn test_pin_validation() {
        let (_, decoy) = controller();

        assert!(matches!(decoy.set_decoy_pin("").await, Err(VaultError::InvalidCredential(_))));
        assert!(matches!(decoy.set_decoy_pin("123").await, Err(VaultError::InvalidCredential(_))));
        assert!(decoy.set_decoy_password("").await.is_err());

        decoy.set_decoy_pin("1234").await.unwrap();
        assert!(decoy.verify_decoy_pin("1234").await.unwrap());
        assert!(!decoy.verify_decoy_pin("0000").await.unwrap());
        assert!(!decoy.verify_decoy_password("1234").await.unwrap());
    }

    #[tokio::test]
    async fn test_digest_stored_not_value() {
        let (store, decoy) = controller();
        decoy.set_decoy_pin("2580").await.unwrap();

        let stored = store.read(keys::DECOY_PIN_HASH).await.unwrap().unwrap();
        assert_eq!(stored, crypto::hash(b"2580"));
        assert_ne!(stored, "2580");
    }

    #[tokio::test]
    async fn test_check_requires_enabled() {
        let (_, decoy) = controller();
        decoy.set_decoy_pin("1234").await.unwrap();

        let check = decoy.check_credential("1234").await.unwrap();
        assert!(!check.is_decoy);
        assert_eq!(check.credential_type, None);

        decoy.set_enabled(true).await.unwrap();
        let check = decoy.check_credential("1234").await.unwrap();
        assert!(check.is_decoy);
        assert_eq!(check.credential_type, Some(CredentialKind::Pin));

        assert!(!decoy.check_credential("9999").await.unwrap().is_decoy);
    }

    #[tokio::test]
    async fn test_pin_checked_before_password() {
        let (_, decoy) = controller();
        decoy.set_decoy_pin("sameval").await.unwrap();
        decoy.set_decoy_password("sameval").await.unwrap();
        decoy.set_enabled(true).await.unwrap();

        let check = decoy.check_credential("sameval").await.unwrap();
        assert_eq!(check.credential_type, Some(CredentialKind::Pin));

        decoy.set_decoy_password("hunter2").await.unwrap();
        let check = decoy.check_credential("hunter2").await.unwrap();
        assert_eq!(check.credential_type, Some(CredentialKind::Password));
    }

    #[tokio::test]
    async fn test_enable_needs_credential() {
        let (_, decoy) = controller();
        assert!(decoy.set_enabled(true).await.is_err());
        assert!(!decoy.is_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn test_clearing_last_credential_disables() {
        let (_, decoy) = controller();
        decoy.set_decoy_pin("1234").await.unwrap();
        decoy.set_enabled(true).await.unwrap();

        decoy.clear_decoy_credential(CredentialKind::Pin).await.unwrap();

        let settings = decoy.settings().await.unwrap();
        assert!(!settings.has_pin_set);
        assert!(!settings.is_enabled);
        assert!(!decoy.verify_decoy_pin("1234").await.unwrap());
    }

    #[tokio::test]
    async fn test_settings_json_shape() {
        let (store, decoy) = controller();
        decoy.set_decoy_password("correct horse").await.unwrap();
        decoy.set_panic_action(PanicAction::ClearRealVault).await.unwrap();
        decoy
            .update_settings(|s| s.custom_decoy_name = Some("Gallery".into()))
            .await
            .unwrap();

        let json = store.read(keys::DECOY_SETTINGS).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["panicAction"], "clearRealVault");
        assert_eq!(value["hasPasswordSet"], true);
        assert_eq!(value["hasPinSet"], false);
        assert_eq!(value["customDecoyName"], "Gallery");
        assert_eq!(value["showFakeNotification"], false);
    }

    #[tokio::test]
    async fn test_flags_not_forgeable() {
        let (_, decoy) = controller();
        let settings = decoy.update_settings(|s| s.has_pin_set = true).await.unwrap();
        assert!(!settings.has_pin_set);
    }

    #[tokio::test]
    async fn test_authenticate_routes_modes() {
        let (_, decoy) = controller();
        let verifier = FixedVerifier("real-secret");
        decoy.set_decoy_pin("1234").await.unwrap();
        decoy.set_enabled(true).await.unwrap();
        decoy.set_panic_action(PanicAction::ShowEmpty).await.unwrap();

        let decision = decoy.authenticate("1234", &verifier).await.unwrap();
        assert_eq!(
            decision,
            AccessDecision::Decoy {
                panic_action: PanicAction::ShowEmpty
            }
        );
        assert_eq!(decoy.active_selector(), VaultSelector::Decoy);
        assert_eq!(decoy.last_access_mode().await.unwrap(), AccessMode::Decoy);

        let decision = decoy.authenticate("wrong", &verifier).await.unwrap();
        assert_eq!(decision, AccessDecision::Denied);
        assert_eq!(decoy.current_mode(), AccessMode::Decoy);

        let decision = decoy.authenticate("real-secret", &verifier).await.unwrap();
        assert_eq!(decision, AccessDecision::Real);
        assert_eq!(decoy.current_mode(), AccessMode::Real);
    }

    #[tokio::test]
    async fn test_last_mode_survives_restart() {
        let (store, decoy) = controller();
        decoy.activate(AccessMode::Decoy).await.unwrap();

        let reopened = DecoyAccessController::new(store);
        assert_eq!(reopened.current_mode(), AccessMode::Real);
        assert_eq!(reopened.last_access_mode().await.unwrap(), AccessMode::Decoy);

        decoy.deactivate().await.unwrap();
        assert_eq!(reopened.last_access_mode().await.unwrap(), AccessMode::Real);
    }

    #[tokio::test]
    async fn test_panic_action_parse() {
        assert_eq!("lockOut".parse::<PanicAction>().unwrap(), PanicAction::LockOut);
        assert_eq!(
            "clear-real-vault".parse::<PanicAction>().unwrap(),
            PanicAction::ClearRealVault
        );
        assert!("explode".parse::<PanicAction>().is_err());
        assert!(PanicAction::ClearRealVault.is_destructive());
    }

    #[tokio::test]
    async fn test_clear_real_vault() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemorySecureStore::new());
        let keys = Arc::new(KeyStore::new(store.clone()));
        let cipher = FileCipher::new(keys, Arc::new(VaultGate::new()), SecureFs::default());
        let index = MemoryVaultIndex::new();
        let decoy = DecoyAccessController::new(store);

        let selectors = [
            VaultSelector::Real,
            VaultSelector::Real,
            VaultSelector::Decoy,
            VaultSelector::Real,
        ];
        for (i, selector) in selectors.into_iter().enumerate() {
            let path = dir.path().join(format!("{}.enc", i));
            let enc = cipher
                .encrypt_bytes_to_file(b"payload", &path, selector)
                .await
                .unwrap();
            let record = VaultFileRecord::new(
                format!("f{}", i),
                path,
                enc.iv,
                FileKind::Image,
                selector,
                enc.hash,
                "x.jpg",
                enc.plaintext_size,
                enc.ciphertext_size,
            );
            index.persist(&record).await.unwrap();
        }

        std::fs::remove_file(dir.path().join("3.enc")).unwrap();

        let report = decoy.clear_real_vault(&index, &cipher).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.removed(), 2);
        assert_eq!(report.shredded, vec!["f0".to_string(), "f1".to_string()]);
        assert_eq!(report.missing, vec!["f3".to_string()]);
        assert!(!dir.path().join("0.enc").exists());
        assert!(!dir.path().join("1.enc").exists());
        assert!(dir.path().join("2.enc").exists());
        assert!(index.list_by_selector(VaultSelector::Real).await.unwrap().is_empty());
        assert_eq!(index.list_by_selector(VaultSelector::Decoy).await.unwrap().len(), 1);

        decoy.activate(AccessMode::Decoy).await.unwrap();
        assert_eq!(decoy.files_for_current_mode(&index).await.unwrap().len(), 1);
    }
}
