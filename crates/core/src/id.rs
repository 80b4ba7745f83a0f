//! Newtype identifiers and the step-id hashing scheme (spec §4.1).

use sha1::{Digest, Sha1};
use std::collections::HashMap;

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `Display`, `From<String>`, `From<&str>`,
/// `PartialEq<str>` and `PartialEq<&str>` implementations.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

define_id! {
    /// A function's stable string id, prefixed by app id when serialized.
    pub struct FunctionId;
}

define_id! {
    /// Id of a single invocation (the Executor's run id).
    pub struct RunId;
}

define_id! {
    /// The developer-supplied string handed to a step tool, before collision
    /// resolution (spec §4.1, GLOSSARY "Userland id").
    pub struct UserlandId;
}

define_id! {
    /// SHA-1 hex of the collision-resolved userland id; the canonical
    /// memoization key (GLOSSARY "Hashed id").
    #[derive(PartialOrd, Ord)]
    pub struct HashedId;
}

/// `hash(id) = lowercase hex of SHA-1 over UTF-8 bytes` (spec §4.1).
pub fn hash_step_id(id: &str) -> HashedId {
    let mut hasher = Sha1::new();
    hasher.update(id.as_bytes());
    HashedId::new(hex::encode(hasher.finalize()))
}

/// Per-run tracker of userland-id collisions (spec §4.1).
///
/// Claims the base id (counter = 1) at first use so that two concurrent
/// calls with the same id resolve deterministically regardless of
/// interleaving: one becomes the bare id, the other `id:2`.
#[derive(Debug, Default)]
pub struct CollisionResolver {
    /// Next candidate suffix to try for a given base userland id.
    counters: HashMap<String, u32>,
    /// Hashed ids already claimed this run (by any resolved final id).
    claimed: std::collections::HashSet<HashedId>,
    /// Whether the single allowed per-run collision warning has fired.
    warned: bool,
}

/// Outcome of resolving a userland id against the current run's claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedId {
    /// The final id after appending `:N` on collision, if any.
    pub final_id: String,
    pub hashed: HashedId,
    /// True if this call collided with an id already claimed this run
    /// that was NOT already a discovered step this tick (i.e. looked like
    /// a parallel chain racing on the same base id).
    pub collided: bool,
}

impl CollisionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `base` to a final id, claiming it. `already_discovered`
    /// reports whether `hash(base)` is already a discovered step this
    /// tick (used only to decide whether to emit the one-per-run warning).
    // The suffix loop only reaches the indexed counter after inserting it
    // above, so the entry is always present.
    #[allow(clippy::expect_used)]
    pub fn resolve(&mut self, base: &str, already_discovered: impl Fn(&HashedId) -> bool) -> ResolvedId {
        let counter = self.counters.entry(base.to_string()).or_insert(0);
        if *counter == 0 {
            *counter = 1;
            let hashed = hash_step_id(base);
            if !self.claimed.contains(&hashed) {
                self.claimed.insert(hashed.clone());
                return ResolvedId {
                    final_id: base.to_string(),
                    hashed,
                    collided: false,
                };
            }
            // Base already claimed (e.g. two concurrent calls in the same
            // tick raced the entry above) — fall through to suffix search.
        }

        let mut n = (*counter).max(1);
        loop {
            let candidate = format!("{base}:{n}");
            let hashed = hash_step_id(&candidate);
            if !self.claimed.contains(&hashed) {
                self.claimed.insert(hashed.clone());
                *self.counters.get_mut(base).expect("base counter present") = n + 1;
                let collided = !already_discovered(&hashed);
                if collided && !self.warned {
                    self.warned = true;
                    tracing_collision_warning(base);
                }
                return ResolvedId {
                    final_id: candidate,
                    hashed,
                    collided,
                };
            }
            n += 1;
        }
    }
}

fn tracing_collision_warning(base: &str) {
    tracing::warn!(base_id = %base, "step id collision across parallel chains");
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
