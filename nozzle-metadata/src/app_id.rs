use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of the canonical textual form of an [`AppId`].
const APP_ID_LEN: usize = 36;

/// Offsets of the dashes within the canonical textual form.
const DASHES: [usize; 4] = [8, 13, 18, 23];

/// The 128-bit identifier of an application as carried by firehose envelopes.
///
/// The identifier is transported as two little-endian 64-bit words. Its canonical textual form
/// follows the UUID layout `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`, where the first three groups
/// hold the bytes of the low word and the last two groups the bytes of the high word:
///
/// ```
/// use nozzle_metadata::AppId;
///
/// let app_id = AppId::new(0x0706050403020100, 0x0f0e0d0c0b0a0908);
/// assert_eq!(app_id.to_string(), "00010203-0405-0607-0809-0a0b0c0d0e0f");
/// ```
///
/// The variant and version bits are not validated, every value has a textual form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppId {
    /// The low word, holding the first eight bytes of the identifier.
    pub low: u64,
    /// The high word, holding the last eight bytes of the identifier.
    pub high: u64,
}

impl AppId {
    /// The all-zero identifier, attached to platform traffic that belongs to no application.
    pub const NIL: Self = Self::new(0, 0);

    /// Creates an identifier from its two words.
    pub const fn new(low: u64, high: u64) -> Self {
        Self { low, high }
    }

    /// Returns `true` if this is the all-zero identifier.
    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let low = self.low.to_le_bytes();
        let high = self.high.to_le_bytes();

        let mut buf = [b'-'; APP_ID_LEN];
        let groups = [
            (&low[0..4], 0..8),
            (&low[4..6], 9..13),
            (&low[6..8], 14..18),
            (&high[0..2], 19..23),
            (&high[2..8], 24..36),
        ];

        for (bytes, range) in groups {
            hex::encode_to_slice(bytes, &mut buf[range]).map_err(|_| fmt::Error)?;
        }

        let s = std::str::from_utf8(&buf).map_err(|_| fmt::Error)?;
        f.write_str(s)
    }
}

/// An error parsing an [`AppId`] from its textual form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid application id")]
pub struct ParseAppIdError;

impl FromStr for AppId {
    type Err = ParseAppIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.as_bytes();
        if s.len() != APP_ID_LEN || DASHES.iter().any(|&i| s[i] != b'-') {
            return Err(ParseAppIdError);
        }

        let mut low = [0u8; 8];
        let mut high = [0u8; 8];

        hex::decode_to_slice(&s[0..8], &mut low[0..4]).map_err(|_| ParseAppIdError)?;
        hex::decode_to_slice(&s[9..13], &mut low[4..6]).map_err(|_| ParseAppIdError)?;
        hex::decode_to_slice(&s[14..18], &mut low[6..8]).map_err(|_| ParseAppIdError)?;
        hex::decode_to_slice(&s[19..23], &mut high[0..2]).map_err(|_| ParseAppIdError)?;
        hex::decode_to_slice(&s[24..36], &mut high[2..8]).map_err(|_| ParseAppIdError)?;

        Ok(Self::new(u64::from_le_bytes(low), u64::from_le_bytes(high)))
    }
}

impl Serialize for AppId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AppId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <std::borrow::Cow<'_, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
