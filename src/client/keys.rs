//! Beneficiary account generation.

use sha2::{Digest, Sha256};

/// A freshly generated beneficiary account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub secret: String,
    pub address: String,
}

/// Produces secret/address pairs.
pub trait KeyGenerator: Send + Sync {
    fn generate(&self) -> Account;
}

/// 32 random bytes as the secret; the address is their SHA-256 digest.
#[derive(Debug, Default)]
pub struct RandomKeys;

impl KeyGenerator for RandomKeys {
    fn generate(&self) -> Account {
        let seed: [u8; 32] = rand::random();
        Account {
            secret: format!("0x{}", hex::encode(seed)),
            address: address_for_seed(&seed),
        }
    }
}

/// Address derived from a raw seed.
pub fn address_for_seed(seed: &[u8]) -> String {
    format!("0x{}", hex::encode(Sha256::digest(seed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_keys_are_distinct_and_well_formed() {
        let keys = RandomKeys;
        let a = keys.generate();
        let b = keys.generate();

        assert_ne!(a.secret, b.secret);
        assert_eq!(a.secret.len(), 66);
        assert!(a.address.starts_with("0x"));

        let seed = hex::decode(a.secret.trim_start_matches("0x")).unwrap();
        assert_eq!(address_for_seed(&seed), a.address);
    }
}
