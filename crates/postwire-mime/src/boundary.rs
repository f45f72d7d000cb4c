//! Multipart boundary generation.
//!
//! Boundaries come from `rand::thread_rng`, a ChaCha-based CSPRNG seeded
//! from the operating system, so they are unpredictable and fresh per
//! message. The `=_` prefix can never appear in quoted-printable output.

use rand::Rng;
use rand::distributions::Alphanumeric;
use std::fmt;

const BOUNDARY_PREFIX: &str = "=_pw_";

/// Random characters in a boundary (about 190 bits of entropy).
const BOUNDARY_TOKEN_LENGTH: usize = 32;

/// MIME multipart boundary token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Boundary(String);

impl Boundary {
    /// Generates a fresh random boundary.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!(
            "{BOUNDARY_PREFIX}{}",
            random_token(BOUNDARY_TOKEN_LENGTH)
        ))
    }

    /// Generates a fresh boundary that does not occur in any of `bodies`.
    #[must_use]
    pub fn generate_avoiding(bodies: &[&str]) -> Self {
        first_free(bodies, std::iter::repeat_with(Self::generate))
    }

    /// Returns the boundary token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the token occurs verbatim in any of `bodies`.
    #[must_use]
    pub fn collides_with(&self, bodies: &[&str]) -> bool {
        bodies.iter().any(|body| body.contains(self.0.as_str()))
    }

    /// The `--boundary` line that opens each part.
    #[must_use]
    pub fn delimiter(&self) -> String {
        format!("--{}", self.0)
    }

    /// The `--boundary--` line that closes the multipart body.
    #[must_use]
    pub fn close_delimiter(&self) -> String {
        format!("--{}--", self.0)
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn first_free(bodies: &[&str], mut candidates: impl Iterator<Item = Boundary>) -> Boundary {
    loop {
        match candidates.next() {
            Some(candidate) if candidate.collides_with(bodies) => {}
            Some(candidate) => return candidate,
            None => return Boundary::generate(),
        }
    }
}

/// Returns `len` random alphanumeric characters from the thread CSPRNG.
pub(crate) fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generate_shape() {
        let boundary = Boundary::generate();
        assert!(boundary.as_str().starts_with(BOUNDARY_PREFIX));
        assert_eq!(
            boundary.as_str().len(),
            BOUNDARY_PREFIX.len() + BOUNDARY_TOKEN_LENGTH
        );
        assert_eq!(boundary.delimiter(), format!("--{boundary}"));
        assert_eq!(boundary.close_delimiter(), format!("--{boundary}--"));
    }

    #[test]
    fn test_generate_is_fresh() {
        let a = Boundary::generate();
        let b = Boundary::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_colliding_candidate_is_skipped() {
        let taken = Boundary("=_pw_taken".to_string());
        let free = Boundary("=_pw_free".to_string());
        let body = format!("text with {taken} inside");

        let chosen = first_free(&[body.as_str()], vec![taken, free.clone()].into_iter());
        assert_eq!(chosen, free);
    }

    #[test]
    fn test_collides_with() {
        let boundary = Boundary("=_pw_abc".to_string());
        assert!(boundary.collides_with(&["xx=_pw_abcxx"]));
        assert!(!boundary.collides_with(&["=_pw_ab", "nothing"]));
    }

    #[test]
    fn test_random_token_alphanumeric() {
        let token = random_token(64);
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    proptest! {
        #[test]
        fn generated_boundary_never_in_bodies(text in ".*", html in ".*") {
            let first = Boundary::generate_avoiding(&[&text, &html]);
            let second = Boundary::generate_avoiding(&[&text, &html]);
            prop_assert!(!text.contains(first.as_str()));
            prop_assert!(!html.contains(first.as_str()));
            prop_assert_ne!(first, second);
        }
    }
}
