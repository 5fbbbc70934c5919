use std::fmt;

use uuid::Uuid;

/// Error returned when an opaque identifier fails shape validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct InvalidId {
    pub kind: &'static str,
    pub value: String,
}

fn is_lower_hex(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Opaque upload handle, `f_` followed by 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileId(String);

impl FileId {
    pub fn generate() -> Self {
        Self(format!("f_{}", Uuid::new_v4().simple()))
    }

    pub fn parse(value: &str) -> Result<Self, InvalidId> {
        match value.strip_prefix("f_") {
            Some(hex) if hex.len() == 32 && is_lower_hex(hex) => Ok(Self(value.to_string())),
            _ => Err(InvalidId {
                kind: "file_id",
                value: value.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque job handle, `j_` followed by 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(format!("j_{}", Uuid::new_v4().simple()))
    }

    pub fn parse(value: &str) -> Result<Self, InvalidId> {
        match value.strip_prefix("j_") {
            Some(hex) if hex.len() == 32 && is_lower_hex(hex) => Ok(Self(value.to_string())),
            _ => Err(InvalidId {
                kind: "job_id",
                value: value.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache key: 64 lowercase hex characters, derived solely from the source
/// identity and the current profile version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn parse(value: &str) -> Result<Self, InvalidId> {
        if value.len() == 64 && is_lower_hex(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(InvalidId {
                kind: "cache_key",
                value: value.to_string(),
            })
        }
    }

    /// Wrap an already hex-encoded SHA-256 digest. Callers guarantee the
    /// value is 64 lowercase hex characters.
    pub(crate) fn from_digest_hex(value: String) -> Self {
        debug_assert!(value.len() == 64 && is_lower_hex(&value));
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 of uploaded content, 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileHash(String);

impl FileHash {
    pub fn parse(value: &str) -> Result<Self, InvalidId> {
        if value.len() == 64 && is_lower_hex(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(InvalidId {
                kind: "file_hash",
                value: value.to_string(),
            })
        }
    }

    pub(crate) fn from_digest_hex(value: String) -> Self {
        debug_assert!(value.len() == 64 && is_lower_hex(&value));
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_file_id_round_trips() {
        let id = FileId::generate();
        assert_eq!(FileId::parse(id.as_str()).unwrap(), id);
    }

    #[test]
    fn file_id_rejects_uppercase_and_wrong_prefix() {
        assert!(FileId::parse("f_ABCDEF00112233445566778899aabbcc").is_err());
        assert!(FileId::parse("j_00112233445566778899aabbccddeeff").is_err());
        assert!(FileId::parse("f_0011").is_err());
    }

    #[test]
    fn cache_key_requires_64_hex() {
        assert!(CacheKey::parse(&"a".repeat(64)).is_ok());
        assert!(CacheKey::parse(&"a".repeat(63)).is_err());
        assert!(CacheKey::parse(&"g".repeat(64)).is_err());
    }
}
