// Strongbox — Engine Selector
//
// Picks plaintext or encrypted from an ordered list of probes, evaluated
// once at startup. The first probe that answers wins:
//
//   1. encrypted file already on disk      → Encrypted
//   2. development mode, no credential     → Plaintext (logged as a downgrade)
//   3. encryption enabled in config        → Encrypted
//   4. otherwise                           → Plaintext

use serde::Serialize;

use crate::store::EngineKind;

/// Facts the probes look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorInput {
    pub encrypted_exists: bool,
    pub development_mode: bool,
    pub credential_supplied: bool,
    pub encryption_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionReason {
    EncryptedFileExists,
    DevelopmentWithoutCredential,
    EncryptionEnabled,
    EncryptionDisabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub kind: EngineKind,
    pub reason: SelectionReason,
}

type Probe = fn(&SelectorInput) -> Option<Selection>;

const PROBES: [Probe; 3] = [
    existing_encrypted_file,
    development_without_credential,
    encryption_enabled,
];

fn existing_encrypted_file(input: &SelectorInput) -> Option<Selection> {
    input.encrypted_exists.then_some(Selection {
        kind: EngineKind::Encrypted,
        reason: SelectionReason::EncryptedFileExists,
    })
}

fn development_without_credential(input: &SelectorInput) -> Option<Selection> {
    (input.development_mode && !input.credential_supplied).then_some(Selection {
        kind: EngineKind::Plaintext,
        reason: SelectionReason::DevelopmentWithoutCredential,
    })
}

fn encryption_enabled(input: &SelectorInput) -> Option<Selection> {
    input.encryption_enabled.then_some(Selection {
        kind: EngineKind::Encrypted,
        reason: SelectionReason::EncryptionEnabled,
    })
}

/// Run the probes in order.
pub fn detect_engine(input: &SelectorInput) -> Selection {
    let selection = PROBES
        .iter()
        .find_map(|probe| probe(input))
        .unwrap_or(Selection {
            kind: EngineKind::Plaintext,
            reason: SelectionReason::EncryptionDisabled,
        });

    if selection.reason == SelectionReason::DevelopmentWithoutCredential {
        tracing::warn!(
            encryption_enabled = input.encryption_enabled,
            "Development mode without a credential: data will be stored UNENCRYPTED"
        );
    } else {
        tracing::debug!(engine = %selection.kind, reason = ?selection.reason, "Engine selected");
    }
    selection
}
