use std::str::FromStr;

// Epoch of the first representable timestamp in generated IDs.
// Subtracting it keeps the high bit zero for the next ~34 years,
// making ID representations equivalent for both signed and
// unsigned 64-bit integers.
const ID_EPOCH_MILLIS: u64 = 1_600_000_000_000;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id([u8; 8]);

impl Id {
    pub fn new(b: [u8; 8]) -> Self {
        Self(b)
    }

    /// Constructs an `Id` whose big-endian integer value is `v`.
    /// Mostly useful for fixtures.
    pub fn from_u64(v: u64) -> Self {
        Self(v.to_be_bytes())
    }

    pub fn from_hex(hex: &str) -> Result<Self, <Self as std::str::FromStr>::Err> {
        Self::from_str(hex)
    }

    /// Constructs a new `Id` from the given parts, or panics if a part is out of range.
    pub fn from_parts(timestamp: u64, seq: u16, shard: u16) -> Self {
        assert!(seq <= (1 << 13) - 1, "sequence number out of range");
        assert!(shard <= (1 << 10) - 1, "shard id out of range");
        let int_val = timestamp << 23 | (seq as u64) << 10 | shard as u64;
        Self::new(int_val.to_be_bytes())
    }

    /// Returns a tuple of (timestamp, sequence number, shard id)
    pub fn into_parts(self) -> (u64, u16, u16) {
        const SEQ_MASK: u64 = (1u64 << 13) - 1;
        const SHARD_MASK: u64 = (1u64 << 10) - 1;

        let int_val = u64::from_be_bytes(self.0);
        let timestamp = int_val >> 23;

        let seq = ((int_val >> 10) & SEQ_MASK) as u16;
        let shard = (int_val & SHARD_MASK) as u16;
        (timestamp, seq, shard)
    }
}

impl std::str::FromStr for Id {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.replace(':', "");
        let u = u64::from_str_radix(&s, 16)?;
        Ok(Self(u.to_be_bytes()))
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.0.iter() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl serde::Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        format!("{self}").serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let str_val = std::borrow::Cow::<'de, str>::deserialize(deserializer)?;
        Id::from_str(str_val.as_ref()).map_err(|err| D::Error::custom(format!("invalid id: {err}")))
    }
}

// Ids are stored as BIGINT. The high bit is zero for generated ids,
// so the signed representation orders identically.
#[cfg(feature = "sqlx-support")]
impl sqlx::Type<sqlx::postgres::Postgres> for Id {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <i64 as sqlx::Type<sqlx::postgres::Postgres>>::type_info()
    }
}

#[cfg(feature = "sqlx-support")]
impl sqlx::postgres::PgHasArrayType for Id {
    fn array_type_info() -> sqlx::postgres::PgTypeInfo {
        <i64 as sqlx::postgres::PgHasArrayType>::array_type_info()
    }
}

#[cfg(feature = "sqlx-support")]
impl sqlx::Encode<'_, sqlx::postgres::Postgres> for Id {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <i64 as sqlx::Encode<'_, sqlx::postgres::Postgres>>::encode_by_ref(
            &i64::from_be_bytes(self.0),
            buf,
        )
    }
}

#[cfg(feature = "sqlx-support")]
impl sqlx::Decode<'_, sqlx::postgres::Postgres> for Id {
    fn decode(value: sqlx::postgres::PgValueRef<'_>) -> Result<Self, sqlx::error::BoxDynError> {
        <i64 as sqlx::Decode<'_, sqlx::postgres::Postgres>>::decode(value)
            .map(|i| Self(i.to_be_bytes()))
    }
}

/// Generates unique, monotonically increasing IDs.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    shard: u16,
    seq: u16,
    last_timestamp: u64,
}
impl IdGenerator {
    /// Return a new generator with the given shard id.
    pub fn new(shard: u16) -> Self {
        Self {
            shard,
            seq: 0,
            last_timestamp: 0,
        }
    }

    /// Generate and return the next unique id.
    pub fn next(&mut self) -> Id {
        let mut timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
            .saturating_sub(ID_EPOCH_MILLIS);
        // Ensure that the timestamp is monotonically increasing, which is not guaranteed
        // by the system time.
        timestamp = timestamp.max(self.last_timestamp);

        if timestamp == self.last_timestamp {
            // Roll over into the next millisecond rather than overflow the sequence.
            if self.seq >= (1 << 13) - 1 {
                self.last_timestamp += 1;
                timestamp += 1;
                self.seq = 0;
            } else {
                self.seq += 1;
            }
        } else {
            self.seq = 0;
            self.last_timestamp = timestamp;
        }
        Id::from_parts(timestamp, self.seq, self.shard)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_id_generation() {
        let mut gen = IdGenerator::new(789);

        let mut prev_id = gen.next();
        for i in 0..20000 {
            let id = gen.next();
            let (timestamp, seq, shard) = id.into_parts();
            assert_eq!(gen.shard, shard, "shard mismatch");
            assert_eq!(gen.last_timestamp, timestamp, "i: {i}, timestamp mismatch");
            assert!(
                id > prev_id,
                "i: {i}, ids must increase monotonically, prev: {prev_id}, next: {id}",
            );
            let round_tripped = Id::from_parts(timestamp, seq, shard);
            assert_eq!(id, round_tripped, "round trip failed at {i}");
            prev_id = id;
        }
    }

    #[test]
    fn test_id_text_forms() {
        let id = Id::from_u64(0x0102_0304_0a0b_0c0d);
        assert_eq!(id.to_string(), "010203040a0b0c0d");
        assert_eq!(Id::from_hex("01:02:03:04:0a:0b:0c:0d").unwrap(), id);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""010203040a0b0c0d""#);
        assert_eq!(serde_json::from_str::<Id>(&json).unwrap(), id);
        assert!(serde_json::from_str::<Id>(r#""not-hex""#).is_err());
    }
}
