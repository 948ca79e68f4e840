//! Action building and response handling

use crate::{
    constants::{RESPONSE_ERROR, RESPONSE_FOLLOWS, RESPONSE_GOODBYE, RESPONSE_SUCCESS},
    error::{AmiError, AmiResult},
    fields::Field,
    packet::Packet,
};
use std::fmt;
use std::str::FromStr;

/// Validate that a user-provided string contains no line breaks.
///
/// Packets are line-delimited; an embedded newline would let a parameter
/// value smuggle extra fields or a whole extra action onto the wire.
fn validate_no_newlines(s: &str, context: &str) -> AmiResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(AmiError::Protocol {
            message: format!("{} must not contain newlines", context),
        });
    }
    Ok(())
}

/// Correlation token linking an action to its response and events.
///
/// Allocated from a per-connection counter, so it never repeats while the
/// connection is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(u64);

impl ActionId {
    /// Wrap a raw id value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw id value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Whether a packet's `ActionID` field refers to this id.
    pub fn matches(&self, packet: &Packet) -> bool {
        packet
            .action_id()
            .and_then(|raw| {
                raw.parse::<ActionId>()
                    .ok()
            })
            == Some(*self)
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ActionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse()
            .map(ActionId)
    }
}

/// An action to send to the PBX.
///
/// Parameters keep the order they were added in. Optional parameters given
/// as `None` are left out of the packet entirely; `Some("")` is sent as an
/// empty value.
///
/// ```
/// use asterisk_ami_tokio::{Action, ActionId};
///
/// let action = Action::new("ContextCreate")
///     .field("Context", "local_extensions")
///     .optional("Registrar", None::<&str>);
/// let wire = action.to_wire_format(ActionId::new(1)).unwrap();
/// assert_eq!(
///     wire,
///     "Action: ContextCreate\r\nActionID: 1\r\nContext: local_extensions\r\n\r\n"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    name: String,
    params: Vec<(String, String)>,
}

impl Action {
    /// Start building an action with the given `Action:` name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Add a parameter.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .push((name.into(), value.into()));
        self
    }

    /// Add a parameter only if a value is specified.
    pub fn optional<V: Into<String>>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.field(name, v),
            None => self,
        }
    }

    /// Action name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameters in insertion order.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Validate all fields, then build the outgoing packet.
    ///
    /// `Action` comes first and `ActionID` second; parameters named
    /// `Action` or `ActionID` are rejected so the envelope can't be spoofed.
    pub fn to_packet(&self, id: ActionId) -> AmiResult<Packet> {
        validate_no_newlines(&self.name, "action name")?;

        let mut packet = Packet::new()
            .with(Field::Action.as_str(), self.name.clone())
            .with(Field::ActionId.as_str(), id.to_string());

        for (name, value) in &self.params {
            validate_no_newlines(name, "parameter name")?;
            validate_no_newlines(value, "parameter value")?;
            if name.contains(':') {
                return Err(AmiError::protocol_error(format!(
                    "parameter name {:?} must not contain ':'",
                    name
                )));
            }
            if Field::Action.matches(name) || Field::ActionId.matches(name) {
                return Err(AmiError::protocol_error(format!(
                    "parameter {:?} is reserved",
                    name
                )));
            }
            packet.insert(name.clone(), value.clone());
        }

        Ok(packet)
    }

    /// Wire-format string for this action under `id`.
    pub fn to_wire_format(&self, id: ActionId) -> AmiResult<String> {
        Ok(self
            .to_packet(id)?
            .encode())
    }
}

/// `Response:` field classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResponseStatus {
    /// `Success`
    Success,
    /// `Error`; the `Message` field explains why.
    Error,
    /// `Follows`, used by actions that stream a text body.
    Follows,
    /// `Goodbye`, the reply to `Logoff`.
    Goodbye,
    /// Any other value.
    Other,
}

impl ResponseStatus {
    fn from_field(value: &str) -> Self {
        if value.eq_ignore_ascii_case(RESPONSE_SUCCESS) {
            ResponseStatus::Success
        } else if value.eq_ignore_ascii_case(RESPONSE_ERROR) {
            ResponseStatus::Error
        } else if value.eq_ignore_ascii_case(RESPONSE_FOLLOWS) {
            ResponseStatus::Follows
        } else if value.eq_ignore_ascii_case(RESPONSE_GOODBYE) {
            ResponseStatus::Goodbye
        } else {
            ResponseStatus::Other
        }
    }
}

/// Response packet correlated to an action.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerResponse {
    action: String,
    packet: Packet,
    status: ResponseStatus,
}

impl ManagerResponse {
    /// Wrap a response packet for the named action.
    ///
    /// Fails with [`AmiError::Protocol`] if there is no `Response` field.
    pub fn new(action: impl Into<String>, packet: Packet) -> AmiResult<Self> {
        let status = packet
            .response()
            .map(ResponseStatus::from_field)
            .ok_or_else(|| AmiError::protocol_error("Response packet has no Response field"))?;
        Ok(Self {
            action: action.into(),
            packet,
            status,
        })
    }

    /// Classification of the `Response` field.
    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    /// `true` unless the status is `Error`.
    pub fn is_success(&self) -> bool {
        self.status != ResponseStatus::Error
    }

    /// `Message` field, if any.
    pub fn message(&self) -> Option<&str> {
        self.packet
            .message()
    }

    /// Look up a response field by name.
    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        self.packet
            .get(name)
    }

    /// The underlying packet.
    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    /// Consume into the underlying packet.
    pub fn into_packet(self) -> Packet {
        self.packet
    }

    /// Convert to result based on the response status.
    ///
    /// ```
    /// # use asterisk_ami_tokio::{ManagerResponse, Packet};
    /// let packet = Packet::new()
    ///     .with("Response", "Error")
    ///     .with("Message", "No such context");
    /// let resp = ManagerResponse::new("ContextDestroy", packet).unwrap();
    /// assert!(resp.into_result().is_err());
    /// ```
    pub fn into_result(self) -> AmiResult<Self> {
        match self.status {
            ResponseStatus::Error => {
                let message = self
                    .message()
                    .unwrap_or("")
                    .to_string();
                Err(AmiError::ActionFailed {
                    action: self.action,
                    message,
                })
            }
            _ => Ok(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_id_matches() {
        let id = ActionId::new(2);
        assert!(id.matches(&Packet::new().with("ActionID", "2")));
        assert!(id.matches(&Packet::new().with("actionid", " 2")));
        assert!(!id.matches(&Packet::new().with("ActionID", "20")));
        assert!(!id.matches(&Packet::new().with("ActionID", "abc")));
        assert!(!id.matches(&Packet::new().with("Event", "ExtensionInfo")));
    }

    #[test]
    fn test_optional_none_is_dropped() {
        let action = Action::new("ContextDestroy")
            .field("Context", "default")
            .optional("Registrar", None::<String>);
        let packet = action
            .to_packet(ActionId::new(7))
            .unwrap();
        assert!(!packet.contains("Registrar"));
        assert_eq!(packet.len(), 3);
    }

    #[test]
    fn test_optional_empty_is_sent() {
        let action = Action::new("ContextCreate")
            .field("Context", "default")
            .optional("Registrar", Some(""));
        let wire = action
            .to_wire_format(ActionId::new(1))
            .unwrap();
        assert!(wire.contains("Registrar: \r\n"));
    }

    #[test]
    fn test_envelope_order() {
        let packet = Action::new("SetGlobalVar")
            .field("Variable", "FOO")
            .field("Value", "bar")
            .to_packet(ActionId::new(3))
            .unwrap();
        let names: Vec<_> = packet
            .iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(names, vec!["Action", "ActionID", "Variable", "Value"]);
    }

    #[test]
    fn test_rejects_newline_injection() {
        let action = Action::new("SetGlobalVar")
            .field("Variable", "FOO")
            .field("Value", "bar\r\n\r\nAction: Logoff");
        assert!(matches!(
            action.to_packet(ActionId::new(1)),
            Err(AmiError::Protocol { .. })
        ));
    }

    #[test]
    fn test_rejects_reserved_parameter() {
        let action = Action::new("Ping").field("actionid", "99");
        assert!(action
            .to_packet(ActionId::new(1))
            .is_err());
    }

    #[test]
    fn test_response_status() {
        let ok = ManagerResponse::new("Ping", Packet::new().with("Response", "Success")).unwrap();
        assert_eq!(ok.status(), ResponseStatus::Success);
        assert!(ok
            .into_result()
            .is_ok());

        let follows =
            ManagerResponse::new("Command", Packet::new().with("Response", "Follows")).unwrap();
        assert_eq!(follows.status(), ResponseStatus::Follows);
        assert!(follows.is_success());
    }

    #[test]
    fn test_response_error_maps_to_action_failed() {
        let packet = Packet::new()
            .with("Response", "Error")
            .with("ActionID", "4")
            .with("Message", "Variable not found");
        let err = ManagerResponse::new("GetGlobalVar", packet)
            .unwrap()
            .into_result()
            .unwrap_err();
        match err {
            AmiError::ActionFailed { action, message } => {
                assert_eq!(action, "GetGlobalVar");
                assert_eq!(message, "Variable not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_response_without_status_field() {
        let err = ManagerResponse::new("Ping", Packet::new().with("ActionID", "1")).unwrap_err();
        assert!(matches!(err, AmiError::Protocol { .. }));
    }
}
