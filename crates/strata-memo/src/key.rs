/// Domain-separated BLAKE3 key derivation for memoized computations.
///
/// A key is the hex digest of `domain ":" len(identity) identity input`,
/// where the identity length is a little-endian `u64`. The length prefix
/// keeps `("ab", "c")` and `("a", "bc")` apart. Digests are 64 lowercase hex
/// characters, always valid store keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoKeyer {
    domain: &'static str,
}

impl MemoKeyer {
    /// Keys for text embeddings.
    pub const EMBEDDING: Self = Self {
        domain: "strata-embedding-v1",
    };
    /// Keys for chat completions.
    pub const CHAT: Self = Self {
        domain: "strata-chat-v1",
    };

    /// A keyer with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Derive the cache key for `input` under the computation `identity`.
    pub fn key(&self, identity: &str, input: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(&(identity.len() as u64).to_le_bytes());
        hasher.update(identity.as_bytes());
        hasher.update(input.as_bytes());
        hex::encode(hasher.finalize().as_bytes())
    }

    pub fn domain(&self) -> &str {
        self.domain
    }
}
