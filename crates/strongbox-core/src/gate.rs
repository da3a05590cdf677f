//! Launch gating
//!
//! [`LaunchGate`] is the pure allow/deny rule. [`AccessGate`] wires the
//! credential store, registry, settings, session, biometric prompt and
//! launcher together and is the surface a UI talks to.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::auth::{
    validate_new_pin, AuthError, CredentialStore, GateStatus, SessionState, UnlockMethod,
    UnlockSession,
};
use crate::biometric::{BiometricGate, BiometricOutcome, PendingChallenge};
use crate::config::GateConfig;
use crate::error::{GateError, Result};
use crate::launcher::{LaunchResult, ResourceCatalog, ResourceInfo, ResourceLauncher};
use crate::registry::{ProtectionLookup, ProtectionRegistry};
use crate::settings::Settings;
use crate::storage::SecureStorage;

/// The launch decision rule
pub struct LaunchGate;

impl LaunchGate {
    /// A resource may launch when the session is unlocked or it is not protected
    pub fn can_launch<P>(id: &str, session: SessionState, registry: &P) -> bool
    where
        P: ProtectionLookup + ?Sized,
    {
        session.is_unlocked() || !registry.is_protected(id)
    }
}

/// What happened when the user asked to open a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The launcher started the resource
    Launched,
    /// The resource is protected and the session is locked
    Denied,
    /// The launcher does not know the resource
    NotFound,
}

/// Result of opening the gate at process start
#[derive(Debug)]
pub enum Startup {
    /// No credential yet; a PIN must be set before anything else
    SetupRequired,
    /// Credential present; the session is locked
    Locked {
        /// Automatic biometric challenge, if one was started
        challenge: Option<PendingChallenge>,
    },
}

/// A launchable resource together with its protection flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub info: ResourceInfo,
    pub protected: bool,
}

/// The gate as seen by the UI layer
pub struct AccessGate {
    config: GateConfig,
    credentials: CredentialStore,
    registry: ProtectionRegistry,
    settings: Settings,
    session: UnlockSession,
    biometric: Arc<dyn BiometricGate>,
    catalog: ResourceCatalog,
}

impl AccessGate {
    /// Build a gate over the given collaborators; the session starts locked
    pub fn new(
        config: GateConfig,
        storage: Arc<dyn SecureStorage>,
        biometric: Arc<dyn BiometricGate>,
        launcher: Arc<dyn ResourceLauncher>,
    ) -> Self {
        Self {
            config,
            credentials: CredentialStore::new(storage.clone()),
            registry: ProtectionRegistry::new(storage.clone()),
            settings: Settings::new(storage),
            session: UnlockSession::new(),
            biometric,
            catalog: ResourceCatalog::new(launcher),
        }
    }

    /// Run the startup sequence
    ///
    /// Without a credential the gate reports [`Startup::SetupRequired`].
    /// Otherwise, when biometric unlock is enabled and available, a challenge
    /// is started in the background and returned without being awaited.
    pub fn start(&self) -> Result<Startup> {
        if !self.credentials.has_credential()? {
            info!("no PIN set, setup required");
            return Ok(Startup::SetupRequired);
        }

        let challenge = if self.config.auto_biometric
            && self.settings.is_biometric_enabled()?
            && self.biometric.is_available()
        {
            self.spawn_biometric_challenge()
        } else {
            None
        };

        Ok(Startup::Locked { challenge })
    }

    /// Start a biometric challenge in the background
    ///
    /// A success unlocks the session whenever it arrives; a success on an
    /// already unlocked session changes nothing. Returns `Ok(None)` when no
    /// tokio runtime is available to run the challenge.
    pub fn start_biometric_challenge(&self) -> Result<Option<PendingChallenge>> {
        self.require_credential()?;
        self.require_biometric()?;
        Ok(self.spawn_biometric_challenge())
    }

    fn spawn_biometric_challenge(&self) -> Option<PendingChallenge> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("no async runtime, skipping biometric challenge");
                return None;
            }
        };

        let biometric = self.biometric.clone();
        let session = self.session.clone();
        debug!("starting biometric challenge");
        let handle = runtime.spawn(async move {
            let outcome = biometric.challenge().await;
            apply_biometric_outcome(&session, outcome);
            outcome
        });
        Some(PendingChallenge::new(handle))
    }

    // ---- credential -------------------------------------------------------

    pub fn has_credential(&self) -> Result<bool> {
        self.credentials.has_credential()
    }

    /// Set the PIN
    ///
    /// Allowed during first-run setup, or to replace the PIN while the
    /// session is unlocked. Does not change the session state.
    pub fn set_credential(&self, pin: &str, confirmation: &str) -> Result<()> {
        validate_new_pin(pin, confirmation, self.config.min_pin_length)?;

        if self.credentials.has_credential()? && !self.session.is_unlocked() {
            return Err(GateError::SessionLocked);
        }

        self.credentials.set_credential(pin)
    }

    /// Replace the PIN after proving knowledge of the current one
    pub fn change_credential(&self, current: &str, pin: &str, confirmation: &str) -> Result<()> {
        self.require_credential()?;
        validate_new_pin(pin, confirmation, self.config.min_pin_length)?;

        if !self.credentials.verify(current) {
            return Err(AuthError::IncorrectPin.into());
        }

        self.credentials.set_credential(pin)
    }

    /// Check a PIN; a match unlocks the session
    pub fn verify(&self, pin: &str) -> bool {
        if self.credentials.verify(pin) {
            self.session.unlock(UnlockMethod::Pin);
            true
        } else {
            false
        }
    }

    /// Unlock with a PIN, reporting why it failed
    pub fn unlock_with_pin(&self, pin: &str) -> Result<()> {
        self.require_credential()?;
        if self.verify(pin) {
            Ok(())
        } else {
            debug!("PIN rejected");
            Err(AuthError::IncorrectPin.into())
        }
    }

    /// Prompt for biometrics and wait for the result
    pub async fn unlock_with_biometric(&self) -> Result<()> {
        self.require_credential()?;
        self.require_biometric()?;

        let outcome = self.biometric.challenge().await;
        apply_biometric_outcome(&self.session, outcome);
        match outcome {
            BiometricOutcome::Success => Ok(()),
            BiometricOutcome::Failed => Err(AuthError::BiometricFailed.into()),
            BiometricOutcome::Cancelled => Err(AuthError::BiometricCancelled.into()),
        }
    }

    // ---- session ----------------------------------------------------------

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Watch session state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    /// Lock the session
    pub fn lock(&self) {
        self.session.lock();
    }

    /// Setup / locked / unlocked summary
    pub fn status(&self) -> Result<GateStatus> {
        if !self.credentials.has_credential()? {
            return Ok(GateStatus::SetupRequired);
        }
        Ok(match self.session.state() {
            SessionState::Locked => GateStatus::Locked,
            SessionState::Unlocked => GateStatus::Unlocked,
        })
    }

    // ---- protection -------------------------------------------------------

    pub fn is_protected(&self, id: &str) -> Result<bool> {
        self.registry.check(id)
    }

    /// Change protection of `id`; refused until a PIN exists
    pub fn set_protected(&self, id: &str, protect: bool) -> Result<()> {
        self.require_credential()?;
        self.registry.set_protected(id, protect)
    }

    // ---- settings ---------------------------------------------------------

    pub fn is_biometric_enabled(&self) -> Result<bool> {
        self.settings.is_biometric_enabled()
    }

    pub fn set_biometric_enabled(&self, enabled: bool) -> Result<()> {
        self.settings.set_biometric_enabled(enabled)
    }

    pub fn toggle_biometric(&self) -> Result<bool> {
        self.settings.toggle_biometric()
    }

    /// Whether the biometric capability is usable right now
    pub fn biometric_available(&self) -> bool {
        self.biometric.is_available()
    }

    // ---- launching --------------------------------------------------------

    /// Decide whether `id` may launch right now
    pub fn can_launch(&self, id: &str) -> bool {
        LaunchGate::can_launch(id, self.session.state(), &self.registry)
    }

    /// Launch `id` if the gate allows it
    ///
    /// Nothing launches before a PIN exists, protected or not.
    pub fn open(&self, id: &str) -> Result<OpenOutcome> {
        self.require_credential()?;
        if !self.can_launch(id) {
            info!(resource = id, "launch denied, session locked");
            return Ok(OpenOutcome::Denied);
        }

        match self.catalog.launch(id)? {
            LaunchResult::Launched => {
                info!(resource = id, "launched");
                Ok(OpenOutcome::Launched)
            }
            LaunchResult::NotFound => {
                warn!(resource = id, "launcher could not find resource");
                Ok(OpenOutcome::NotFound)
            }
        }
    }

    /// Cached list of launchable resources, sorted by label
    pub fn resources(&self) -> Result<Vec<ResourceInfo>> {
        self.catalog.resources()
    }

    /// Re-enumerate launchable resources
    pub fn refresh_resources(&self) -> Result<Vec<ResourceInfo>> {
        self.catalog.refresh()
    }

    /// Cached resources annotated with their protection flag
    pub fn resource_entries(&self) -> Result<Vec<ResourceEntry>> {
        let protected = self.registry.protected()?;
        Ok(self
            .catalog
            .resources()?
            .into_iter()
            .map(|info| ResourceEntry {
                protected: protected.contains(&info.id),
                info,
            })
            .collect())
    }

    fn require_credential(&self) -> Result<()> {
        if self.credentials.has_credential()? {
            Ok(())
        } else {
            Err(GateError::SetupRequired)
        }
    }

    fn require_biometric(&self) -> Result<()> {
        let status = self.biometric.status();
        if status.available {
            Ok(())
        } else {
            let reason = status
                .unavailable_reason
                .unwrap_or_else(|| "biometric capability unavailable".to_string());
            Err(AuthError::BiometricUnavailable(reason).into())
        }
    }
}

fn apply_biometric_outcome(session: &UnlockSession, outcome: BiometricOutcome) {
    match outcome {
        BiometricOutcome::Success => {
            session.unlock(UnlockMethod::Biometric);
        }
        BiometricOutcome::Failed => debug!("biometric challenge failed"),
        BiometricOutcome::Cancelled => debug!("biometric challenge cancelled"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometric::BiometricStatus;
    use crate::error::StorageError;
    use crate::storage::{MemoryStorage, StoredValue, UpdateFn, WriteBatch};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use tokio::sync::{mpsc, Mutex};

    const BANK: &str = "com.example.bank";
    const MAIL: &str = "com.example.mail";

    /// Biometric prompt whose outcomes are fed by the test
    struct ScriptedBiometric {
        available: bool,
        outcomes: Mutex<mpsc::UnboundedReceiver<BiometricOutcome>>,
    }

    fn scripted(available: bool) -> (Arc<ScriptedBiometric>, mpsc::UnboundedSender<BiometricOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Arc::new(ScriptedBiometric {
            available,
            outcomes: Mutex::new(rx),
        });
        (gate, tx)
    }

    #[async_trait]
    impl BiometricGate for ScriptedBiometric {
        fn status(&self) -> BiometricStatus {
            if self.available {
                BiometricStatus::available()
            } else {
                BiometricStatus::unavailable("no sensor")
            }
        }

        async fn challenge(&self) -> BiometricOutcome {
            self.outcomes
                .lock()
                .await
                .recv()
                .await
                .unwrap_or(BiometricOutcome::Cancelled)
        }
    }

    struct StaticLauncher;

    impl ResourceLauncher for StaticLauncher {
        fn list_launchable(&self) -> Result<Vec<ResourceInfo>> {
            Ok(vec![
                ResourceInfo::new("Mail", MAIL),
                ResourceInfo::new("Bank", BANK),
            ])
        }

        fn launch(&self, id: &str) -> Result<LaunchResult> {
            Ok(if id == BANK || id == MAIL {
                LaunchResult::Launched
            } else {
                LaunchResult::NotFound
            })
        }
    }

    /// Storage whose writes always fail
    #[derive(Default)]
    struct ReadOnlyStorage {
        inner: MemoryStorage,
    }

    impl SecureStorage for ReadOnlyStorage {
        fn get(&self, key: &str) -> std::result::Result<Option<StoredValue>, StorageError> {
            self.inner.get(key)
        }

        fn write_batch(&self, _batch: WriteBatch) -> std::result::Result<(), StorageError> {
            Err(StorageError::Backend("read-only".into()))
        }

        fn update(
            &self,
            _key: &str,
            _f: &mut UpdateFn<'_>,
        ) -> std::result::Result<(), StorageError> {
            Err(StorageError::Backend("read-only".into()))
        }
    }

    fn gate_with(biometric: Arc<dyn BiometricGate>) -> AccessGate {
        AccessGate::new(
            GateConfig::default(),
            Arc::new(MemoryStorage::new()),
            biometric,
            Arc::new(StaticLauncher),
        )
    }

    fn pin_gate() -> AccessGate {
        let (biometric, _) = scripted(false);
        let gate = gate_with(biometric);
        gate.set_credential("1234", "1234").unwrap();
        gate
    }

    #[test]
    fn test_launch_rule() {
        let protected: BTreeSet<String> = [BANK.to_string()].into();

        assert!(!LaunchGate::can_launch(BANK, SessionState::Locked, &protected));
        assert!(LaunchGate::can_launch(BANK, SessionState::Unlocked, &protected));
        assert!(LaunchGate::can_launch(MAIL, SessionState::Locked, &protected));
        assert!(LaunchGate::can_launch(MAIL, SessionState::Unlocked, &protected));
    }

    #[test]
    fn test_fresh_gate_requires_setup() {
        let (biometric, _) = scripted(true);
        let gate = gate_with(biometric);

        assert!(matches!(gate.start().unwrap(), Startup::SetupRequired));
        assert_eq!(gate.status().unwrap(), GateStatus::SetupRequired);
        assert!(!gate.verify("1234"));
        assert!(matches!(
            gate.unlock_with_pin("1234"),
            Err(GateError::SetupRequired)
        ));
        assert_eq!(gate.session_state(), SessionState::Locked);
    }

    #[test]
    fn test_protected_resource_needs_unlock() {
        let gate = pin_gate();
        gate.set_protected(BANK, true).unwrap();

        assert!(!gate.can_launch(BANK));
        assert!(gate.can_launch(MAIL));
        assert_eq!(gate.open(BANK).unwrap(), OpenOutcome::Denied);

        assert!(gate.verify("1234"));
        assert_eq!(gate.session_state(), SessionState::Unlocked);
        assert!(gate.can_launch(BANK));
        assert_eq!(gate.open(BANK).unwrap(), OpenOutcome::Launched);

        gate.lock();
        assert!(!gate.can_launch(BANK));
    }

    #[test]
    fn test_wrong_pin_keeps_session_locked() {
        let gate = pin_gate();

        assert!(matches!(
            gate.unlock_with_pin("9999"),
            Err(GateError::Auth(AuthError::IncorrectPin))
        ));
        assert_eq!(gate.status().unwrap(), GateStatus::Locked);
    }

    #[test]
    fn test_set_credential_validation() {
        let (biometric, _) = scripted(false);
        let gate = gate_with(biometric);

        assert!(matches!(
            gate.set_credential("12", "12"),
            Err(GateError::InvalidPinLength(4))
        ));
        assert!(matches!(
            gate.set_credential("1234", "4321"),
            Err(GateError::PinMismatch)
        ));
        assert!(!gate.has_credential().unwrap());
    }

    #[test]
    fn test_replacing_pin_needs_unlocked_session() {
        let gate = pin_gate();

        assert!(matches!(
            gate.set_credential("5678", "5678"),
            Err(GateError::SessionLocked)
        ));

        gate.unlock_with_pin("1234").unwrap();
        gate.set_credential("5678", "5678").unwrap();
        gate.lock();

        assert!(!gate.verify("1234"));
        assert!(gate.verify("5678"));
    }

    #[test]
    fn test_change_credential_checks_current_pin() {
        let gate = pin_gate();

        assert!(matches!(
            gate.change_credential("0000", "5678", "5678"),
            Err(GateError::Auth(AuthError::IncorrectPin))
        ));
        gate.change_credential("1234", "5678", "5678").unwrap();
        assert!(gate.verify("5678"));
    }

    #[test]
    fn test_open_unknown_resource() {
        let gate = pin_gate();
        assert_eq!(gate.open("com.nowhere").unwrap(), OpenOutcome::NotFound);
    }

    #[test]
    fn test_resource_entries_carry_protection() {
        let gate = pin_gate();
        gate.set_protected(BANK, true).unwrap();

        let entries = gate.resource_entries().unwrap();
        assert_eq!(entries[0].info.label, "Bank");
        assert!(entries[0].protected);
        assert!(!entries[1].protected);
    }

    #[test]
    fn test_storage_failure_is_reported() {
        let gate = AccessGate::new(
            GateConfig::default(),
            Arc::new(ReadOnlyStorage::default()),
            Arc::new(crate::biometric::NoBiometric),
            Arc::new(StaticLauncher),
        );

        assert!(matches!(
            gate.set_credential("1234", "1234"),
            Err(GateError::Storage(_))
        ));
        assert!(!gate.has_credential().unwrap());
        assert!(!gate.is_protected(BANK).unwrap());
    }

    #[test]
    fn test_registry_write_failure_is_reported() {
        let storage = Arc::new(ReadOnlyStorage::default());
        storage
            .inner
            .write_batch(
                WriteBatch::new()
                    .put_string(crate::auth::PIN_SALT_KEY, "salt")
                    .put_string(crate::auth::PIN_HASH_KEY, crate::auth::hash_pin("1234", "salt")),
            )
            .unwrap();
        let gate = AccessGate::new(
            GateConfig::default(),
            storage,
            Arc::new(crate::biometric::NoBiometric),
            Arc::new(StaticLauncher),
        );

        assert!(gate.verify("1234"));
        assert!(matches!(
            gate.set_protected(BANK, true),
            Err(GateError::Storage(_))
        ));
        assert!(!gate.is_protected(BANK).unwrap());
    }

    #[test]
    fn test_nothing_opens_or_changes_before_setup() {
        let (biometric, _) = scripted(false);
        let gate = gate_with(biometric);

        assert!(matches!(gate.open(MAIL), Err(GateError::SetupRequired)));
        assert!(matches!(
            gate.set_protected(BANK, true),
            Err(GateError::SetupRequired)
        ));
        assert!(!gate.is_protected(BANK).unwrap());

        // The pure rule still allows unprotected resources
        assert!(gate.can_launch(MAIL));

        gate.set_credential("1234", "1234").unwrap();
        assert_eq!(gate.open(MAIL).unwrap(), OpenOutcome::Launched);
    }

    #[test]
    fn test_toggling_biometric_leaves_session_alone() {
        let gate = pin_gate();
        gate.unlock_with_pin("1234").unwrap();

        assert!(!gate.toggle_biometric().unwrap());
        assert_eq!(gate.session_state(), SessionState::Unlocked);
    }

    #[tokio::test]
    async fn test_auto_biometric_unlocks_in_background() {
        let (biometric, outcomes) = scripted(true);
        let gate = gate_with(biometric);
        gate.set_credential("1234", "1234").unwrap();
        gate.set_protected(BANK, true).unwrap();

        let challenge = match gate.start().unwrap() {
            Startup::Locked {
                challenge: Some(challenge),
            } => challenge,
            other => panic!("expected a pending challenge, got {:?}", other),
        };

        // Decisions made while the challenge is pending see a locked session
        assert!(challenge.is_pending());
        assert!(!gate.can_launch(BANK));

        outcomes.send(BiometricOutcome::Success).unwrap();
        assert_eq!(challenge.outcome().await, BiometricOutcome::Success);
        assert!(gate.can_launch(BANK));
    }

    #[tokio::test]
    async fn test_auto_biometric_skipped_when_disabled() {
        let (biometric, _) = scripted(true);
        let gate = gate_with(biometric);
        gate.set_credential("1234", "1234").unwrap();
        gate.set_biometric_enabled(false).unwrap();

        assert!(matches!(
            gate.start().unwrap(),
            Startup::Locked { challenge: None }
        ));
    }

    #[tokio::test]
    async fn test_late_biometric_success_is_a_no_op() {
        let (biometric, outcomes) = scripted(true);
        let gate = gate_with(biometric);
        gate.set_credential("1234", "1234").unwrap();

        let challenge = gate.start_biometric_challenge().unwrap().unwrap();
        gate.unlock_with_pin("1234").unwrap();

        outcomes.send(BiometricOutcome::Success).unwrap();
        assert_eq!(challenge.outcome().await, BiometricOutcome::Success);
        assert_eq!(gate.session_state(), SessionState::Unlocked);
    }

    #[tokio::test]
    async fn test_biometric_failures_are_distinct() {
        let (biometric, outcomes) = scripted(true);
        let gate = gate_with(biometric);
        gate.set_credential("1234", "1234").unwrap();

        outcomes.send(BiometricOutcome::Failed).unwrap();
        assert!(matches!(
            gate.unlock_with_biometric().await,
            Err(GateError::Auth(AuthError::BiometricFailed))
        ));

        outcomes.send(BiometricOutcome::Cancelled).unwrap();
        assert!(matches!(
            gate.unlock_with_biometric().await,
            Err(GateError::Auth(AuthError::BiometricCancelled))
        ));
        assert_eq!(gate.session_state(), SessionState::Locked);

        outcomes.send(BiometricOutcome::Success).unwrap();
        gate.unlock_with_biometric().await.unwrap();
        assert_eq!(gate.session_state(), SessionState::Unlocked);
    }

    #[tokio::test]
    async fn test_biometric_unavailable_falls_back_to_pin() {
        let gate = pin_gate();

        assert!(matches!(
            gate.unlock_with_biometric().await,
            Err(GateError::Auth(AuthError::BiometricUnavailable(_)))
        ));
        assert!(matches!(gate.start().unwrap(), Startup::Locked { challenge: None }));
        gate.unlock_with_pin("1234").unwrap();
    }
}
