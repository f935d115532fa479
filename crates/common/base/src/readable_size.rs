// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Human readable byte sizes for configuration values such as `8MiB`.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use snafu::{OptionExt, ResultExt, Snafu};

const UNIT: u64 = 1;
const KIB: u64 = UNIT * 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ParseSizeError {
    #[snafu(display("Empty size string"))]
    Empty,

    #[snafu(display("Invalid size number in '{input}'"))]
    InvalidNumber {
        input:  String,
        source: std::num::ParseFloatError,
    },

    #[snafu(display("Unknown size unit '{unit}' in '{input}'"))]
    UnknownUnit { input: String, unit: String },
}

/// A byte count that reads and prints as `512KiB`, `8MiB`, `1GiB`.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::From,
    derive_more::Into,
)]
pub struct ReadableSize(pub u64);

impl ReadableSize {
    #[must_use]
    pub const fn kb(count: u64) -> Self { Self(count * KIB) }

    #[must_use]
    pub const fn mb(count: u64) -> Self { Self(count * MIB) }

    #[must_use]
    pub const fn gb(count: u64) -> Self { Self(count * GIB) }

    #[must_use]
    pub const fn as_bytes(self) -> u64 { self.0 }

    /// Byte count clamped to `usize`, for APIs that take in-memory lengths.
    #[must_use]
    pub fn as_usize(self) -> usize { usize::try_from(self.0).unwrap_or(usize::MAX) }
}

impl fmt::Display for ReadableSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.0;
        if size == 0 {
            write!(f, "0B")
        } else if size % GIB == 0 {
            write!(f, "{}GiB", size / GIB)
        } else if size % MIB == 0 {
            write!(f, "{}MiB", size / MIB)
        } else if size % KIB == 0 {
            write!(f, "{}KiB", size / KIB)
        } else {
            write!(f, "{size}B")
        }
    }
}

impl FromStr for ReadableSize {
    type Err = ParseSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        snafu::ensure!(!input.is_empty(), EmptySnafu);

        let split = input
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(input.len());
        let (number, unit) = input.split_at(split);
        let unit = unit.trim();

        let multiplier = match unit.to_ascii_lowercase().as_str() {
            "" | "b" => Some(UNIT),
            "k" | "kb" | "kib" => Some(KIB),
            "m" | "mb" | "mib" => Some(MIB),
            "g" | "gb" | "gib" => Some(GIB),
            _ => None,
        }
        .context(UnknownUnitSnafu { input, unit })?;

        let number: f64 = number.parse().context(InvalidNumberSnafu { input })?;
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let bytes = (number * multiplier as f64) as u64;
        Ok(Self(bytes))
    }
}

impl Serialize for ReadableSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ReadableSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SizeVisitor;

        impl de::Visitor<'_> for SizeVisitor {
            type Value = ReadableSize;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte count or a size string like \"8MiB\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(ReadableSize(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map(ReadableSize)
                    .map_err(|_| E::custom("size must not be negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(SizeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_units() {
        assert_eq!("8MiB".parse::<ReadableSize>().unwrap(), ReadableSize::mb(8));
        assert_eq!("512kb".parse::<ReadableSize>().unwrap(), ReadableSize::kb(512));
        assert_eq!("1 GiB".parse::<ReadableSize>().unwrap(), ReadableSize::gb(1));
        assert_eq!("1024".parse::<ReadableSize>().unwrap(), ReadableSize(1024));
        assert_eq!("1.5k".parse::<ReadableSize>().unwrap(), ReadableSize(1536));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            "".parse::<ReadableSize>(),
            Err(ParseSizeError::Empty)
        ));
        assert!(matches!(
            "12parsecs".parse::<ReadableSize>(),
            Err(ParseSizeError::UnknownUnit { .. })
        ));
    }

    #[test]
    fn display_picks_largest_exact_unit() {
        assert_eq!(ReadableSize::mb(100).to_string(), "100MiB");
        assert_eq!(ReadableSize::kb(1536).to_string(), "1536KiB");
        assert_eq!(ReadableSize(1000).to_string(), "1000B");
    }

    #[test]
    fn serde_accepts_numbers_and_strings() {
        let from_str: ReadableSize = serde_json::from_str("\"8MiB\"").unwrap();
        let from_num: ReadableSize = serde_json::from_str("1024").unwrap();
        assert_eq!(from_str, ReadableSize::mb(8));
        assert_eq!(from_num, ReadableSize::kb(1));
        assert_eq!(serde_json::to_string(&from_str).unwrap(), "\"8MiB\"");
    }
}
