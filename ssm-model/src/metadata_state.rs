use crate::error::{ModelError, Result};
use chrono::{DateTime, Utc};
use serde::de::{Error as DeError, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// `titleCooldownsUtc` as it appears on disk: a JSON object keyed by normalized title key.
///
/// Wrapped in a newtype so deserialization can reject duplicate keys per spec — plain
/// `BTreeMap<String, _>` deserialization silently keeps the last occurrence of a repeated key,
/// which would hide a corrupt or hand-edited state file instead of surfacing it as a parse error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CooldownMap(BTreeMap<String, DateTime<Utc>>);

impl CooldownMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&DateTime<Utc>> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: String, value: DateTime<Utc>) -> Result<()> {
        if key.trim().is_empty() {
            return Err(ModelError::InvalidMetadataState(
                "cooldown key must not be empty".into(),
            ));
        }
        self.0.insert(key, value.with_timezone(&Utc));
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DateTime<Utc>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for CooldownMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CooldownMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct CooldownMapVisitor;

        impl<'de> Visitor<'de> for CooldownMapVisitor {
            type Value = CooldownMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of normalized title key to UTC timestamp")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut out = BTreeMap::new();
                while let Some((key, value)) = access.next_entry::<String, DateTime<Utc>>()? {
                    if key.trim().is_empty() {
                        return Err(A::Error::custom("cooldown key must not be empty"));
                    }
                    if out.insert(key.clone(), value).is_some() {
                        return Err(A::Error::custom(format!("duplicate cooldown key: {key}")));
                    }
                }
                Ok(CooldownMap(out))
            }
        }

        deserializer.deserialize_map(CooldownMapVisitor)
    }
}

/// Immutable on-disk snapshot: per-title cooldown expiries plus the sticky-fallback expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataStateSnapshot {
    pub title_cooldowns_utc: CooldownMap,
    pub sticky_flaresolverr_until_utc: Option<DateTime<Utc>>,
}

impl MetadataStateSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_cooldown_active(&self, title_key: &str, now: DateTime<Utc>) -> bool {
        self.title_cooldowns_utc
            .get(title_key)
            .is_some_and(|expiry| *expiry > now)
    }

    pub fn is_sticky_fallback_active(&self, now: DateTime<Utc>) -> bool {
        self.sticky_flaresolverr_until_utc
            .is_some_and(|until| until > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_cooldown_keys() {
        let json = r#"{"titleCooldownsUtc":{"a":"2026-01-01T00:00:00Z","a":"2026-01-02T00:00:00Z"}}"#;
        let result: std::result::Result<MetadataStateSnapshot, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn empty_snapshot_round_trips() {
        let snapshot = MetadataStateSnapshot::empty();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: MetadataStateSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, parsed);
    }
}
