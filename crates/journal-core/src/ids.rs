use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use rand::RngCore;

/// Number of random bytes behind a public entry id.
pub const PUBLIC_ID_BYTES: usize = 12;

/// Length of the hex encoding of a public entry id.
pub const PUBLIC_ID_LEN: usize = PUBLIC_ID_BYTES * 2;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(
    /// Externally visible entry identifier: 24 lowercase hex characters.
    PublicId
);
branded_id!(
    /// Decentralized identifier of a signed-in account (`did:plc:...`).
    /// Doubles as the session id entries are partitioned by.
    AccountDid
);

impl PublicId {
    /// Draw a fresh identifier from 12 bytes of OS-seeded randomness.
    pub fn generate() -> Self {
        let mut bytes = [0u8; PUBLIC_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let mut out = String::with_capacity(PUBLIC_ID_LEN);
        for b in bytes {
            let _ = write!(out, "{b:02x}");
        }
        Self(out)
    }

    /// Whether the value has the shape of a generated id.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == PUBLIC_ID_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl AccountDid {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
