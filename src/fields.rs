//! Typed field and event names used by the Manager protocol.

/// Error returned when parsing an unrecognized field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFieldError(pub String);

impl std::fmt::Display for ParseFieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown manager field: {}", self.0)
    }
}

impl std::error::Error for ParseFieldError {}

/// Error returned when parsing an unrecognized event name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventNameError(pub String);

impl std::fmt::Display for ParseEventNameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown manager event: {}", self.0)
    }
}

impl std::error::Error for ParseEventNameError {}

define_wire_enum! {
    error_type: ParseFieldError,
    /// Field names that appear in actions, responses and events.
    ///
    /// Use with [`Packet::get()`](crate::Packet::get) for type-safe lookups.
    /// Lookups are case-insensitive, so `ActionID` and `ActionId` both match.
    pub enum Field {
        Action => "Action",
        ActionId => "ActionID",
        Response => "Response",
        Message => "Message",
        Event => "Event",
        Context => "Context",
        Exten => "Exten",
        Extension => "Extension",
        Priority => "Priority",
        Application => "Application",
        AppData => "AppData",
        ApplicationData => "ApplicationData",
        Registrar => "Registrar",
        Replace => "Replace",
        Variable => "Variable",
        Value => "Value",
    }
}

define_wire_enum! {
    error_type: ParseEventNameError,
    /// Event names emitted by the dialplan dump actions.
    pub enum EventName {
        ContextDump => "ContextDump",
        ExtensionInfo => "ExtensionInfo",
        ExtensionPriorityInfo => "ExtensionPriorityInfo",
        ContextDumpComplete => "ContextDumpComplete",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_wire_spelling() {
        assert_eq!(Field::ActionId.to_string(), "ActionID");
        assert_eq!(Field::AppData.to_string(), "AppData");
        assert_eq!(
            EventName::ContextDumpComplete.to_string(),
            "ContextDumpComplete"
        );
    }

    #[test]
    fn from_str_case_insensitive() {
        assert_eq!("actionid".parse::<Field>(), Ok(Field::ActionId));
        assert_eq!("ACTIONID".parse::<Field>(), Ok(Field::ActionId));
        assert_eq!(
            "extensionpriorityinfo".parse::<EventName>(),
            Ok(EventName::ExtensionPriorityInfo)
        );
    }

    #[test]
    fn matches_ignores_case() {
        assert!(Field::ActionId.matches("ActionId"));
        assert!(EventName::ExtensionInfo.matches("EXTENSIONINFO"));
        assert!(!EventName::ExtensionInfo.matches("ExtensionPriorityInfo"));
    }

    #[test]
    fn from_str_unknown() {
        let err = "X-Not-A-Field".parse::<Field>();
        assert_eq!(
            err.unwrap_err()
                .to_string(),
            "unknown manager field: X-Not-A-Field"
        );
    }
}
