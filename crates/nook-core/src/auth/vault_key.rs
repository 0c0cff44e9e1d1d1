//! In-memory vault key

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// The unlocked vault key: the PIN itself, held only in RAM.
///
/// The buffer is wiped when the last copy is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey(String);

impl VaultKey {
    pub(crate) fn new(pin: impl Into<String>) -> Self {
        Self(pin.into())
    }

    /// Passphrase for vault encryption
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_shows_key() {
        let key = VaultKey::new("4821");
        assert_eq!(format!("{key:?}"), "VaultKey([REDACTED])");
        assert_eq!(key.expose(), "4821");
    }
}
