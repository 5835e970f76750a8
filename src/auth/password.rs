use bcrypt::{hash, verify};

use crate::error::ShopResult;

pub fn hash_password(password: &str, cost: u32) -> ShopResult<String> {
    hash(password, cost).map_err(|e| anyhow::anyhow!("password hashing failed: {e}").into())
}

/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hashed: &str) -> bool {
    verify(password, hashed).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let hashed = hash_password("hunter22", 4).unwrap();
        assert!(verify_password("hunter22", &hashed));
        assert!(!verify_password("hunter23", &hashed));
        assert!(!verify_password("hunter22", "not-a-hash"));
    }
}
