//! Serde helpers for the string-encoded scalars used by CometBFT and the
//! Cosmos REST gateway: int64 values travel as decimal strings, byte arrays
//! as base64, and addresses as upper-case hex.

use serde::Deserialize;

/// Either a JSON number or a decimal string. Some node builds emit `round`
/// and `power` as numbers, others as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrStr {
    Num(u64),
    Str(String),
}

impl NumOrStr {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            NumOrStr::Num(n) => Ok(n),
            NumOrStr::Str(s) => s.trim().parse::<u64>().map_err(E::custom),
        }
    }
}

pub mod dec_u64 {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(val: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&val.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        super::NumOrStr::deserialize(deserializer)?.into_u64()
    }
}

pub mod dec_u64_opt {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(val: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match val {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<super::NumOrStr> = Option::deserialize(deserializer)?;
        match opt {
            // The REST gateway renders unset int64 fields as "".
            Some(super::NumOrStr::Str(s)) if s.trim().is_empty() => Ok(None),
            Some(v) => Ok(Some(v.into_u64::<D::Error>()?)),
            None => Ok(None),
        }
    }
}

pub mod b64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(val: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(val))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            Some(s) => STANDARD.decode(s.trim()).map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

pub mod b64_bytes_opt {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(val: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match val {
            Some(v) => serializer.serialize_str(&STANDARD.encode(v)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => Ok(Some(
                STANDARD.decode(s.trim()).map_err(serde::de::Error::custom)?,
            )),
            None => Ok(None),
        }
    }
}

/// List of base64 byte strings; `null` decodes to an empty list.
pub mod b64_bytes_list {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{self, ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(val: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(val.len()))?;
        for item in val {
            seq.serialize_element(&STANDARD.encode(item))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<Vec<String>> = Option::deserialize(deserializer)?;
        opt.unwrap_or_default()
            .iter()
            .map(|s| STANDARD.decode(s.trim()).map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Base64 on the wire, upper-case hex in memory. Vote info carries
/// validator addresses as base64 while commit signatures use hex; this
/// normalizes both to the hex form used as the storage key.
pub mod b64_as_hex {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(val: &str, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bytes = hex::decode(val).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = STANDARD.decode(s.trim()).map_err(serde::de::Error::custom)?;
        Ok(hex::encode_upper(bytes))
    }
}

/// Hex string normalized to upper case, empty string for a missing value.
pub mod hex_upper {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(val: &str, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(val)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        let s = opt.unwrap_or_default();
        let s = s.strip_prefix("0x").unwrap_or(&s);
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(serde::de::Error::custom(format!("invalid hex string: {s}")));
        }
        Ok(s.to_ascii_uppercase())
    }
}
