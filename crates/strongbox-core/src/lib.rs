//! Strongbox core - app launch gating behind a PIN or biometric unlock
//!
//! This crate provides the gating logic for Strongbox:
//! - PIN credential storage and verification
//! - Registry of protected resources
//! - Process-scoped unlock session
//! - The launch decision and the [`AccessGate`] facade a UI drives
//!
//! Persistence, the biometric prompt and the platform launcher are supplied
//! by the host through the [`SecureStorage`], [`BiometricGate`] and
//! [`ResourceLauncher`] traits.

pub mod auth;
pub mod biometric;
pub mod config;
pub mod error;
pub mod gate;
pub mod launcher;
pub mod registry;
pub mod settings;
pub mod storage;

pub use auth::{AuthError, CredentialStore, GateStatus, SessionState, UnlockSession};
pub use biometric::{BiometricGate, BiometricOutcome, BiometricStatus, NoBiometric, PendingChallenge};
pub use config::GateConfig;
pub use error::{GateError, Result, StorageError};
pub use gate::{AccessGate, LaunchGate, OpenOutcome, ResourceEntry, Startup};
pub use launcher::{LaunchResult, ResourceCatalog, ResourceInfo, ResourceLauncher};
pub use registry::{ProtectionLookup, ProtectionRegistry, ResourceId};
pub use settings::Settings;
pub use storage::{FileStorage, MemoryStorage, SecureStorage, StoredValue, UpdateFn, WriteBatch};
