use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// A logical vector clock: agent id -> non-negative tick count.
///
/// Serialises as a plain JSON object (`{"agent": 3, ...}`). Deserialisation
/// treats a JSON `null` as an empty clock and rejects negative or
/// non-finite tick values, per the wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorClock {
    ticks: BTreeMap<String, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ticks(ticks: BTreeMap<String, u64>) -> Self {
        Self { ticks }
    }

    /// The tick for `agent`, or 0 if the agent has never ticked.
    pub fn get(&self, agent: &str) -> u64 {
        self.ticks.get(agent).copied().unwrap_or(0)
    }

    pub fn set(&mut self, agent: &str, value: u64) {
        self.ticks.insert(agent.to_string(), value);
    }

    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.ticks.keys().map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.ticks.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Canonical JSON encoding used by the `vector_clocks.clock_data` column.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("vector clock serialises infallibly")
    }

    /// Parses the JSON wire format, rejecting negative or non-finite ticks.
    /// A JSON `null` document is treated as an empty clock.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| Error::Validation(format!("invalid clock JSON: {e}")))?;
        Self::from_value(value)
    }

    fn from_value(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Null => Ok(Self::default()),
            serde_json::Value::Object(map) => {
                let mut ticks = BTreeMap::new();
                for (agent, v) in map {
                    let n = v.as_f64().ok_or_else(|| {
                        Error::Validation(format!("clock tick for {agent} is not a number"))
                    })?;
                    if !n.is_finite() {
                        return Err(Error::Validation(format!(
                            "clock tick for {agent} is not finite"
                        )));
                    }
                    if n < 0.0 {
                        return Err(Error::Validation(format!(
                            "clock tick for {agent} is negative"
                        )));
                    }
                    if n.fract() != 0.0 {
                        return Err(Error::Validation(format!(
                            "clock tick for {agent} is not an integer"
                        )));
                    }
                    ticks.insert(agent, n as u64);
                }
                Ok(Self { ticks })
            }
            _ => Err(Error::Validation(
                "clock document must be a JSON object or null".to_string(),
            )),
        }
    }
}

impl Serialize for VectorClock {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.ticks.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VectorClock {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_document_is_empty_clock() {
        let clock = VectorClock::from_json("null").unwrap();
        assert!(clock.is_empty());
    }

    #[test]
    fn rejects_negative_ticks() {
        let err = VectorClock::from_json(r#"{"a": -1}"#).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn rejects_non_finite_ticks() {
        // serde_json cannot represent NaN/Infinity directly, but a caller
        // may hand us a document built from an untrusted float; exercise
        // the fractional rejection path instead, which is reachable via JSON.
        let err = VectorClock::from_json(r#"{"a": 1.5}"#).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn missing_agent_defaults_to_zero() {
        let clock = VectorClock::from_json(r#"{"a": 3}"#).unwrap();
        assert_eq!(clock.get("a"), 3);
        assert_eq!(clock.get("b"), 0);
    }

    #[test]
    fn round_trips_through_json() {
        let mut clock = VectorClock::new();
        clock.set("a", 2);
        clock.set("b", 5);
        let round = VectorClock::from_json(&clock.to_json()).unwrap();
        assert_eq!(clock, round);
    }
}
