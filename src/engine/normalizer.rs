use serde_json::Value;

use crate::error::NormalizeError;
use crate::models::{EventType, NewEvent};

/// Turns a raw external payload into a canonical queue event. Pure: the
/// caller owns insertion.
pub struct Normalizer;

impl Normalizer {
    /// Validates the fields the event type requires, assigns the fixed
    /// priority for the type, and resolves the gift streak flag. Gifts
    /// always come out with `repeat_end` set to `Some`: the source's streak
    /// flag when present, otherwise `true` (a gift with no streak info is a
    /// complete streak of one). Non-gifts carry `None`.
    pub fn normalize(
        event_type: EventType,
        payload: Value,
        service_id: Option<String>,
    ) -> Result<NewEvent, NormalizeError> {
        Self::validate(event_type, &payload)?;

        let repeat_end = match event_type {
            EventType::Gift => Some(
                payload
                    .get("repeat_end")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(true),
            ),
            _ => None,
        };

        Ok(NewEvent {
            event_type,
            payload,
            priority: event_type.priority(),
            service_id,
            repeat_end,
        })
    }

    fn validate(event_type: EventType, payload: &Value) -> Result<(), NormalizeError> {
        match event_type {
            EventType::Gift => {
                Self::require_str(event_type, payload, "username")?;
                Self::require_str(event_type, payload, "gift_name")?;
            }
            EventType::Chat => {
                Self::require_str(event_type, payload, "username")?;
                Self::require_str(event_type, payload, "comment")?;
            }
            EventType::Donation => {
                Self::require_str(event_type, payload, "username")?;
            }
            EventType::Follow | EventType::Like | EventType::Share | EventType::Subscribe => {
                Self::require_str(event_type, payload, "username")?;
            }
            EventType::ViewerCount => {
                if payload.get("count").and_then(|v| v.as_i64()).is_none() {
                    return Err(Self::invalid(event_type, "missing numeric field 'count'"));
                }
            }
            EventType::Unknown => {}
        }

        Ok(())
    }

    fn require_str(
        event_type: EventType,
        payload: &Value,
        field: &str,
    ) -> Result<(), NormalizeError> {
        match payload.get(field).and_then(|v| v.as_str()) {
            Some(s) if !s.is_empty() => Ok(()),
            _ => Err(Self::invalid(
                event_type,
                &format!("missing required field '{}'", field),
            )),
        }
    }

    fn invalid(event_type: EventType, reason: &str) -> NormalizeError {
        NormalizeError::InvalidPayload {
            event_type: format!("{:?}", event_type).to_lowercase(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_priority_table() {
        assert_eq!(EventType::Gift.priority(), 100);
        assert_eq!(EventType::Donation.priority(), 100);
        assert_eq!(EventType::Follow.priority(), 50);
        assert_eq!(EventType::Share.priority(), 15);
        assert_eq!(EventType::Chat.priority(), 10);
        assert_eq!(EventType::Like.priority(), 5);
        assert_eq!(EventType::ViewerCount.priority(), 1);
        assert_eq!(EventType::Unknown.priority(), 0);
    }

    #[test]
    fn test_gift_requires_sender() {
        let result = Normalizer::normalize(
            EventType::Gift,
            json!({"gift_name": "Rose", "count": 1}),
            None,
        );

        assert!(matches!(
            result,
            Err(NormalizeError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_gift_resolves_repeat_end() {
        let open = Normalizer::normalize(
            EventType::Gift,
            json!({"username": "a", "gift_name": "Rose", "repeat_end": false}),
            None,
        )
        .unwrap();
        assert_eq!(open.repeat_end, Some(false));

        let no_flag = Normalizer::normalize(
            EventType::Gift,
            json!({"username": "a", "gift_name": "Rose"}),
            None,
        )
        .unwrap();
        assert_eq!(no_flag.repeat_end, Some(true));
    }

    #[test]
    fn test_non_gift_has_no_repeat_end() {
        let event = Normalizer::normalize(
            EventType::Chat,
            json!({"username": "a", "comment": "hi"}),
            None,
        )
        .unwrap();

        assert_eq!(event.repeat_end, None);
        assert_eq!(event.priority, 10);
    }

    #[test]
    fn test_viewer_count_requires_count() {
        assert!(Normalizer::normalize(EventType::ViewerCount, json!({}), None).is_err());
        assert!(Normalizer::normalize(EventType::ViewerCount, json!({"count": 42}), None).is_ok());
    }
}
