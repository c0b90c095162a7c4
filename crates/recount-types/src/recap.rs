use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// The LLM-derived recap card: a suggested title, a prose recap, and five
/// bounded bullet lists, each item optionally anchored to a transcript line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmartRecap {
    pub suggested_title: String,
    pub recap: String,
    pub went_well: Vec<AnnotatedItem>,
    pub went_bad: Vec<AnnotatedItem>,
    pub human_suggestions: Vec<AnnotatedItem>,
    pub environment_suggestions: Vec<AnnotatedItem>,
    pub default_context_suggestions: Vec<AnnotatedItem>,
}

/// Reference to a transcript line, as returned by the model. The model is
/// asked for the integer `id` attribute from the assembled XML, but older
/// prompts produced strings, so both decode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MessageRef {
    #[default]
    None,
    Index(i64),
    Uuid(String),
}

/// One recap bullet. Decodes from three accepted shapes:
/// a bare string (legacy), `{text, message_id}`, and `{text}`.
/// `message_id` values of any other JSON type (null, bool, float with
/// fraction) silently clear the reference while preserving the text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotatedItem {
    pub text: String,
    pub message_ref: MessageRef,
}

impl AnnotatedItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            message_ref: MessageRef::None,
        }
    }

    pub fn with_uuid(text: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            message_ref: MessageRef::Uuid(uuid.into()),
        }
    }
}

impl Serialize for AnnotatedItem {
    /// Canonical form: `{"text": ..., "message_id": ...}` with `message_id`
    /// omitted when there is no reference. Index refs serialize as their
    /// number so a decode/encode cycle is lossless pre-resolution.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("text", &self.text)?;
        match &self.message_ref {
            MessageRef::None => {}
            MessageRef::Index(idx) => map.serialize_entry("message_id", idx)?,
            MessageRef::Uuid(uuid) => {
                if !uuid.is_empty() {
                    map.serialize_entry("message_id", uuid)?;
                }
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AnnotatedItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ItemVisitor;

        impl<'de> Visitor<'de> for ItemVisitor {
            type Value = AnnotatedItem;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or an object with text and optional message_id")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(AnnotatedItem::new(v))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(AnnotatedItem::new(v))
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut item = AnnotatedItem::default();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "text" => item.text = map.next_value()?,
                        "message_id" => {
                            let value: serde_json::Value = map.next_value()?;
                            item.message_ref = match value {
                                serde_json::Value::Number(n) if n.is_i64() => {
                                    MessageRef::Index(n.as_i64().unwrap_or_default())
                                }
                                serde_json::Value::String(s) if !s.is_empty() => {
                                    MessageRef::Uuid(s)
                                }
                                _ => MessageRef::None,
                            };
                        }
                        _ => {
                            let _ = map.next_value::<de::IgnoredAny>()?;
                        }
                    }
                }
                Ok(item)
            }
        }

        deserializer.deserialize_any(ItemVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bare_string() {
        let item: AnnotatedItem = serde_json::from_str(r#""kept tests green""#).unwrap();
        assert_eq!(item.text, "kept tests green");
        assert_eq!(item.message_ref, MessageRef::None);
    }

    #[test]
    fn decodes_object_with_integer_id() {
        let item: AnnotatedItem =
            serde_json::from_str(r#"{"text": "fixed the race", "message_id": 7}"#).unwrap();
        assert_eq!(item.text, "fixed the race");
        assert_eq!(item.message_ref, MessageRef::Index(7));
    }

    #[test]
    fn decodes_object_with_string_id() {
        let item: AnnotatedItem =
            serde_json::from_str(r#"{"text": "fixed", "message_id": "uuid-9"}"#).unwrap();
        assert_eq!(item.message_ref, MessageRef::Uuid("uuid-9".to_string()));
    }

    #[test]
    fn decodes_object_without_id() {
        let item: AnnotatedItem = serde_json::from_str(r#"{"text": "plain"}"#).unwrap();
        assert_eq!(item.text, "plain");
        assert_eq!(item.message_ref, MessageRef::None);
    }

    #[test]
    fn null_and_bool_ids_clear_the_reference() {
        for raw in [
            r#"{"text": "a", "message_id": null}"#,
            r#"{"text": "a", "message_id": true}"#,
        ] {
            let item: AnnotatedItem = serde_json::from_str(raw).unwrap();
            assert_eq!(item.text, "a");
            assert_eq!(item.message_ref, MessageRef::None);
        }
    }

    #[test]
    fn round_trips_to_canonical_form() {
        for (raw, canonical) in [
            (r#""legacy text""#, r#"{"text":"legacy text"}"#),
            (
                r#"{"text":"anchored","message_id":3}"#,
                r#"{"text":"anchored","message_id":3}"#,
            ),
            (r#"{"text":"plain"}"#, r#"{"text":"plain"}"#),
            (
                r#"{"text":"cleared","message_id":null}"#,
                r#"{"text":"cleared"}"#,
            ),
        ] {
            let item: AnnotatedItem = serde_json::from_str(raw).unwrap();
            assert_eq!(serde_json::to_string(&item).unwrap(), canonical);
        }
    }

    #[test]
    fn empty_uuid_is_omitted_on_encode() {
        let item = AnnotatedItem {
            text: "t".to_string(),
            message_ref: MessageRef::Uuid(String::new()),
        };
        assert_eq!(serde_json::to_string(&item).unwrap(), r#"{"text":"t"}"#);
    }
}
