//! Manager packet type and its `Key: Value` line codec

use crate::{
    constants::LINE_TERMINATOR,
    error::{AmiError, AmiResult},
    fields::Field,
};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    value: String,
}

/// One Manager protocol message: an action, a response or an event.
///
/// Fields keep insertion order. Names are compared ignoring ASCII case, and
/// the spelling seen first is the one written back out by [`encode`](Self::encode).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    fields: IndexMap<String, Entry>,
}

fn normalize(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl Packet {
    /// Create an empty packet
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a field value by name (case-insensitive).
    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        self.fields
            .get(&normalize(name.as_ref()))
            .map(|e| e.value.as_str())
    }

    /// Whether a field is present.
    pub fn contains(&self, name: impl AsRef<str>) -> bool {
        self.fields
            .contains_key(&normalize(name.as_ref()))
    }

    /// Set or overwrite a field.
    ///
    /// Overwriting keeps the field's original position and spelling.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .fields
            .entry(normalize(&name))
        {
            indexmap::map::Entry::Occupied(mut slot) => {
                slot.get_mut()
                    .value = value;
            }
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(Entry { name, value });
            }
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Remove a field, returning its value if it existed.
    pub fn remove(&mut self, name: impl AsRef<str>) -> Option<String> {
        self.fields
            .shift_remove(&normalize(name.as_ref()))
            .map(|e| e.value)
    }

    /// Fields in order as `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .values()
            .map(|e| (e.name.as_str(), e.value.as_str()))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields
            .len()
    }

    /// `true` if the packet has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields
            .is_empty()
    }

    /// `ActionID` correlation field.
    pub fn action_id(&self) -> Option<&str> {
        self.get(Field::ActionId)
    }

    /// `Event` field naming the event type.
    pub fn event(&self) -> Option<&str> {
        self.get(Field::Event)
    }

    /// `Response` status field.
    pub fn response(&self) -> Option<&str> {
        self.get(Field::Response)
    }

    /// `Message` field, the human-readable text on responses.
    pub fn message(&self) -> Option<&str> {
        self.get(Field::Message)
    }

    /// Whether this is an event with the given name (case-insensitive).
    pub fn is_event(&self, name: impl AsRef<str>) -> bool {
        self.event()
            .is_some_and(|e| e.eq_ignore_ascii_case(name.as_ref()))
    }

    /// Decode one packet from raw text.
    ///
    /// Lines are consumed up to, not including, the first blank line; both
    /// `\r\n` and `\n` endings are accepted. Each line is split at its first
    /// `:` and both sides are trimmed. A non-blank line with no `:` fails the
    /// whole decode with [`AmiError::MalformedPacket`].
    ///
    /// ```
    /// # use asterisk_ami_tokio::Packet;
    /// let packet = Packet::decode("Response: Success\r\nActionID: 1\r\n\r\n").unwrap();
    /// assert_eq!(packet.get("response"), Some("Success"));
    /// assert_eq!(packet.action_id(), Some("1"));
    /// ```
    pub fn decode(raw: &str) -> AmiResult<Self> {
        let mut packet = Packet::new();

        for line in raw.split('\n') {
            let line = line.trim_end_matches('\r');
            if line
                .trim()
                .is_empty()
            {
                break;
            }

            match line.split_once(':') {
                Some((key, value)) => packet.insert(key.trim(), value.trim()),
                None => {
                    return Err(AmiError::MalformedPacket {
                        line: line.to_string(),
                    })
                }
            }
        }

        Ok(packet)
    }

    /// Encode to wire format: `Key: Value\r\n` per field in insertion order,
    /// then the blank-line terminator.
    pub fn encode(&self) -> String {
        use std::fmt::Write;
        let mut result = String::new();
        for (name, value) in self.iter() {
            let _ = write!(result, "{}: {}{}", name, value, LINE_TERMINATOR);
        }
        result.push_str(LINE_TERMINATOR);
        result
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl<K, V> FromIterator<(K, V)> for Packet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut packet = Packet::new();
        for (k, v) in iter {
            packet.insert(k, v);
        }
        packet
    }
}

impl Serialize for Packet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

impl<'de> Deserialize<'de> for Packet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = IndexMap::<String, String>::deserialize(deserializer)?;
        Ok(map
            .into_iter()
            .collect())
    }
}
