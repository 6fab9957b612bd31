//! # Pickup Codes
//!
//! Six-character codes issued when payment is confirmed and typed (or
//! scanned) at the machine to release the goods.
//!
//! - Alphabet: `A-Z0-9`
//! - Input is case-insensitive and surrounding whitespace is ignored
//! - Stored and compared in uppercase

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::validation::ValidationResult;

/// Number of characters in a pickup code.
pub const PICKUP_CODE_LENGTH: usize = 6;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A normalized, well-formed pickup code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PickupCode(String);

impl PickupCode {
    /// Draws a fresh code from `rng`.
    ///
    /// Uniqueness among open sales is the caller's job; this only guarantees
    /// the format.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..PICKUP_CODE_LENGTH)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        PickupCode(code)
    }

    /// Normalizes user input and checks the format.
    ///
    /// ```rust
    /// use vendo_core::PickupCode;
    ///
    /// let code = PickupCode::parse("  ab12cd ").unwrap();
    /// assert_eq!(code.as_str(), "AB12CD");
    /// assert!(PickupCode::parse("AB12C").is_err());
    /// ```
    pub fn parse(input: &str) -> ValidationResult<Self> {
        let normalized = normalize(input);

        if normalized.is_empty() {
            return Err(ValidationError::Required {
                field: "pickup_code".to_string(),
            });
        }

        if normalized.len() != PICKUP_CODE_LENGTH
            || !normalized.bytes().all(|b| ALPHABET.contains(&b))
        {
            return Err(ValidationError::InvalidFormat {
                field: "pickup_code".to_string(),
                reason: format!("must be {} characters A-Z or 0-9", PICKUP_CODE_LENGTH),
            });
        }

        Ok(PickupCode(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PickupCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim and uppercase.
pub fn normalize(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn is_well_formed(s: &str) -> bool {
        s.len() == 6 && s.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    }

    #[test]
    fn test_generated_codes_are_well_formed() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let code = PickupCode::generate(&mut rng);
            assert!(is_well_formed(code.as_str()), "bad code {code}");
            assert_eq!(PickupCode::parse(code.as_str()).unwrap(), code);
        }
    }

    #[test]
    fn test_parse_normalizes_case_and_whitespace() {
        assert_eq!(PickupCode::parse("x7k2p9").unwrap().as_str(), "X7K2P9");
        assert_eq!(PickupCode::parse("\tX7k2P9 \n").unwrap().as_str(), "X7K2P9");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            PickupCode::parse("   "),
            Err(ValidationError::Required { .. })
        ));
        assert!(PickupCode::parse("ABC12").is_err());
        assert!(PickupCode::parse("ABC1234").is_err());
        assert!(PickupCode::parse("ABC-12").is_err());
        assert!(PickupCode::parse("ÄBC123").is_err());
    }
}
