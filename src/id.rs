//! Opaque player identifiers.
//!
//! Players are identified by a short random id rather than a UUID so that
//! wire messages stay compact and ids are comfortable to eyeball in logs.

use rand::Rng;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const ID_LEN: usize = 8;
const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// An 8-character opaque player id, e.g. `"a3f9c1d0"`. Serializes as a plain
/// JSON string rather than a byte array so it reads naturally on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId([u8; ID_LEN]);

impl Serialize for PlayerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PlayerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;
        impl Visitor<'_> for IdVisitor {
            type Value = PlayerId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an 8-character player id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<PlayerId, E> {
                let bytes: [u8; ID_LEN] = v
                    .as_bytes()
                    .try_into()
                    .map_err(|_| E::invalid_length(v.len(), &self))?;
                Ok(PlayerId(bytes))
            }
        }
        deserializer.deserialize_str(IdVisitor)
    }
}

impl PlayerId {
    /// Generates a fresh id from the given RNG.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; ID_LEN];
        for b in &mut bytes {
            *b = ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())];
        }
        Self(bytes)
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).expect("id alphabet is ASCII")
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for PlayerId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_has_fixed_length() {
        let mut rng = rand::thread_rng();
        let id = PlayerId::generate(&mut rng);
        assert_eq!(id.as_str().len(), ID_LEN);
    }

    #[test]
    fn ids_round_trip_through_json() {
        let mut rng = rand::thread_rng();
        let id = PlayerId::generate(&mut rng);
        let json = serde_json::to_string(&id).unwrap();
        let back: PlayerId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
