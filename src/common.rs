use std::fmt;
use std::str::FromStr;

use hex::ToHex;
use once_cell::sync::OnceCell;
use serde::{
    de::{self, Deserialize, Deserializer, Visitor},
    Serialize, Serializer,
};

/// Opaque 128-bit tenant identifier. The engine only ever compares and hashes
/// it; minting identifiers belongs to the layer above.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct ProjectId(u128);

/// Internal account address. The engine always operates in the internal
/// address space; the external shift that hides service accounts belongs to
/// the API adapter.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Address(u64);

// ProjectId

impl ProjectId {
    #[inline(always)]
    pub fn new(raw: u128) -> Self {
        Self(raw)
    }

    #[inline(always)]
    pub fn raw(&self) -> u128 {
        self.0
    }

    /// Deterministic identifier derived from a seed (splitmix64, two draws).
    /// For tools and tests that need reproducible project populations.
    pub fn from_seed(seed: u64) -> Self {
        fn next(state: &mut u64) -> u64 {
            *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut z = *state;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            z ^ (z >> 31)
        }
        let mut state = seed;
        let hi = next(&mut state) as u128;
        let lo = next(&mut state) as u128;
        Self((hi << 64) | lo)
    }
}

impl From<u128> for ProjectId {
    fn from(raw: u128) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for ProjectId {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        Ok(Self(u128::from_str_radix(s, 16).map_err(|_| ())?))
    }
}

impl Serialize for ProjectId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}", self))
    }
}

impl<'de> Deserialize<'de> for ProjectId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdVisitor;
        impl<'de> Visitor<'de> for IdVisitor {
            type Value = ProjectId;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a 128-bit hex identifier")
            }

            fn visit_str<E>(self, value: &str) -> std::result::Result<ProjectId, E>
            where
                E: de::Error,
            {
                ProjectId::from_str(value)
                    .map_err(|_| E::custom("malformed project identifier"))
            }
        }
        deserializer.deserialize_str(IdVisitor)
    }
}

// Address

impl Address {
    /// The fixed service account created at emulator bootstrap. It signs the
    /// canonical create-account transaction and sits outside the ordinal user
    /// address space.
    #[inline]
    pub fn service() -> &'static Self {
        static V: OnceCell<Address> = OnceCell::new();
        V.get_or_init(|| Address(0))
    }

    /// Address of the `ordinal`-th account created since bootstrap (1-based;
    /// ordinal 0 is the service account).
    #[inline(always)]
    pub fn from_ordinal(ordinal: u64) -> Self {
        Self(ordinal)
    }

    #[inline(always)]
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Fixed-width hex form used in event payloads, e.g.
    /// `0x0000000000000006`.
    pub fn to_hex(&self) -> String {
        format!("0x{}", self.0.to_be_bytes().encode_hex::<String>())
    }
}

impl From<u64> for Address {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Address {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        Ok(Self(u64::from_str_radix(s, 16).map_err(|_| ())?))
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AddrVisitor;
        impl<'de> Visitor<'de> for AddrVisitor {
            type Value = Address;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a hex address starting with `0x`")
            }

            fn visit_str<E>(self, value: &str) -> std::result::Result<Address, E>
            where
                E: de::Error,
            {
                Address::from_str(value)
                    .map_err(|_| E::custom("malformed address"))
            }
        }
        deserializer.deserialize_str(AddrVisitor)
    }
}

// Errors

/// Infrastructure failures surfaced by the engine. Program errors from user
/// scripts never appear here; they are data embedded in the returned record.
#[derive(Clone, Debug)]
pub enum Error {
    /// Project, account or record does not exist.
    NotFound(String),
    /// A previously-successful persisted execution failed during replay. The
    /// cache entry is dropped and the log is left untouched.
    ReplayDivergence { project: ProjectId, index: u64 },
    /// The store rejected or failed a persistence operation.
    Store(String),
    /// The emulator runtime itself failed (bootstrap or internal error). The
    /// instance is dropped and never cached.
    Emulator(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(what) => write!(f, "not found: {}", what),
            Error::ReplayDivergence { project, index } => write!(
                f,
                "replay divergence in project {} at execution index {}",
                project, index
            ),
            Error::Store(msg) => write!(f, "store failure: {}", msg),
            Error::Emulator(msg) => write!(f, "emulator failure: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_roundtrip() {
        let a = Address::from_ordinal(6);
        assert_eq!(a.to_hex(), "0x0000000000000006");
        assert_eq!("0x0000000000000006".parse::<Address>().unwrap(), a);
        assert_eq!(*Address::service(), Address::from(0));
    }

    #[test]
    fn test_serde_hex_strings() {
        let a = Address::from_ordinal(6);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            r#""0x0000000000000006""#
        );
        let back: Address =
            serde_json::from_str(r#""0x0000000000000006""#).unwrap();
        assert_eq!(back, a);

        let id = ProjectId::new(0xabc);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(serde_json::from_str::<ProjectId>(&json).unwrap(), id);
    }

    #[test]
    fn test_project_id_from_seed() {
        assert_eq!(ProjectId::from_seed(7), ProjectId::from_seed(7));
        assert_ne!(ProjectId::from_seed(7), ProjectId::from_seed(8));
        assert_ne!(ProjectId::from_seed(0), ProjectId::new(0));
    }

    #[test]
    fn test_project_id_parse() {
        let id = ProjectId::new(0xdead_beef);
        let s = format!("{}", id);
        assert_eq!(s.len(), 32);
        assert_eq!(s.parse::<ProjectId>().unwrap(), id);
    }
}
