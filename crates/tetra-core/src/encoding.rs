//! Hex (de)serialisation for byte fields. The UI layer has always shown key
//! material as hex, so the JSON forms keep that.

use serde::{Deserialize, Deserializer, Serializer};
use zeroize::Zeroizing;

pub mod hex_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = Zeroizing::new(String::deserialize(d)?);
        hex::decode(s.trim()).map_err(serde::de::Error::custom)
    }
}

pub mod hex_secret {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &Zeroizing<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        let encoded = Zeroizing::new(hex::encode(bytes.as_slice()));
        s.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Zeroizing<Vec<u8>>, D::Error> {
        let s = Zeroizing::new(String::deserialize(d)?);
        hex::decode(s.trim())
            .map(Zeroizing::new)
            .map_err(serde::de::Error::custom)
    }
}
