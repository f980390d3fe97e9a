use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Deterministic identity of a real-world entity across harvest runs.
///
/// A lowercase hex SHA-256 over the normalized identity tuple. Equal tuples
/// after normalization always yield equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Hashes `parts` after normalizing each one; parts are joined with `|`.
    #[must_use]
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = parts
            .into_iter()
            .map(|p| normalize_part(p.as_ref()))
            .collect::<Vec<_>>()
            .join("|");
        Self(format!("{:x}", Sha256::digest(joined.as_bytes())))
    }

    #[must_use]
    pub fn category(name: &str, city: &str) -> Self {
        Self::from_parts(["category", name, city])
    }

    #[must_use]
    pub fn merchant(name: &str, category: &str, city: &str) -> Self {
        Self::from_parts(["merchant", name, category, city])
    }

    #[must_use]
    pub fn item(merchant_id: i64, name: &str, item_category: &str) -> Self {
        Self::from_parts(["item", &merchant_id.to_string(), name, item_category])
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercases, trims, and collapses internal whitespace runs to one space.
fn normalize_part(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_up_to_case_and_whitespace() {
        let a = IdentityKey::merchant("Pizzaria Bella", "Pizza", "Birigui");
        let b = IdentityKey::merchant("  pizzaria   BELLA ", "PIZZA", "birigui\t");
        assert_eq!(a, b);
    }

    #[test]
    fn different_fields_give_different_keys() {
        let a = IdentityKey::merchant("Pizzaria Bella", "Pizza", "Birigui");
        let b = IdentityKey::merchant("Pizzaria Bella", "Pizza", "Araçatuba");
        assert_ne!(a, b);
    }

    #[test]
    fn kinds_do_not_collide_on_same_text() {
        let category = IdentityKey::category("Lanches", "Birigui");
        let merchant = IdentityKey::from_parts(["merchant", "Lanches", "Birigui"]);
        assert_ne!(category, merchant);
    }

    #[test]
    fn item_key_depends_on_merchant_id() {
        let a = IdentityKey::item(1, "X-Burger", "Lanches");
        let b = IdentityKey::item(2, "X-Burger", "Lanches");
        assert_ne!(a, b);
        assert_eq!(a, IdentityKey::item(1, "x-burger ", " lanches"));
    }

    #[test]
    fn key_is_sha256_hex() {
        let key = IdentityKey::category("Pizza", "Birigui");
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn accented_uppercase_is_lowercased() {
        assert_eq!(
            IdentityKey::category("AÇAÍ", "Birigui"),
            IdentityKey::category("açaí", "Birigui")
        );
    }
}
