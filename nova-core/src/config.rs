//! Serde helpers shared by the typed config structs.

/// (De)serialize a `Duration` as whole milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "super::duration_ms")]
        wait: Duration,
    }

    #[test]
    fn durations_are_plain_milliseconds() {
        let json = serde_json::to_string(&Holder { wait: Duration::from_millis(1500) }).unwrap();
        assert_eq!(json, r#"{"wait":1500}"#);
        let back: Holder = serde_json::from_str(r#"{"wait":250}"#).unwrap();
        assert_eq!(back.wait, Duration::from_millis(250));
    }
}
