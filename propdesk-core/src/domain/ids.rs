use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a fresh 20-hex-char document id.
///
/// Ids are BLAKE3 digests of a process-wide counter, the wall clock and a
/// caller tag, so two calls never collide within a process and ids from
/// different processes are practically unique.
pub fn new_document_id(tag: &str) -> String {
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();

    let mut hasher = blake3::Hasher::new();
    hasher.update(tag.as_bytes());
    hasher.update(&counter.to_le_bytes());
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    hasher.finalize().to_hex()[..20].to_string()
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Authenticated user id (owned by the external auth service).
    UserId
);
string_id!(
    /// Wallet document id under `users/{user}/wallets`.
    WalletId
);
string_id!(
    /// Challenge document id under `prop_challenges`.
    ChallengeId
);
string_id!(
    /// Participation document id under `prop_challenges/{challenge}/participants`.
    ParticipantId
);

/// Address of one participation account: (challenge, participant).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountKey {
    pub challenge_id: ChallengeId,
    pub participant_id: ParticipantId,
}

impl AccountKey {
    pub fn new(challenge_id: ChallengeId, participant_id: ParticipantId) -> Self {
        Self { challenge_id, participant_id }
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.challenge_id, self.participant_id)
    }
}
