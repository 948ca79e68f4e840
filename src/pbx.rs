//! Dialplan and global variable actions
//!
//! These need `pbx_config` loaded on the PBX. The bulk dump runs as an
//! [`EventCollection`] over [`AmiClient::collect`].

use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::{
    action::{Action, ManagerResponse},
    app::Application,
    connection::AmiClient,
    correlator::{CompletionSentinel, Dispatch, EventCollection, EventHandler, IgnoreEvent},
    dialplan::{Context, Extension},
    error::{AmiError, AmiResult},
    fields::{EventName, Field},
    packet::Packet,
};

/// Dumped context: extension pattern, then priority number, then the
/// remaining priority fields (`Application`, `AppData`, ...).
pub type ContextDump = BTreeMap<String, BTreeMap<u32, Packet>>;

/// Fields describing where a priority lives; removed from dumped priorities.
const LOCATION_FIELDS: [Field; 6] = [
    Field::Event,
    Field::ActionId,
    Field::Exten,
    Field::Priority,
    Field::Context,
    Field::Registrar,
];

fn required<'a>(event: &'a Packet, field: Field) -> Result<&'a str, AmiError> {
    event
        .get(field)
        .ok_or_else(|| {
            AmiError::protocol_error(format!(
                "{} event without {} field",
                event
                    .event()
                    .unwrap_or("?"),
                field
            ))
        })
}

/// `ExtensionInfo`: one per extension, before its priorities.
struct ExtensionInfo;

impl EventHandler<ContextDump> for ExtensionInfo {
    fn event_name(&self) -> &str {
        EventName::ExtensionInfo.as_str()
    }

    fn handle(&mut self, event: &Packet, dump: &mut ContextDump) -> Dispatch {
        match required(event, Field::Exten) {
            Ok(exten) => {
                dump.entry(exten.to_string())
                    .or_default();
                Dispatch::Continue
            }
            Err(e) => Dispatch::Failed(e),
        }
    }
}

/// `ExtensionPriorityInfo`: one per priority.
///
/// Entries whose `Priority` is not a number (`hint`) are not dialplan steps
/// and are left out of the dump.
struct ExtensionPriorityInfo;

impl ExtensionPriorityInfo {
    fn record(event: &Packet, dump: &mut ContextDump) -> AmiResult<()> {
        let exten = required(event, Field::Exten)?;
        let raw = required(event, Field::Priority)?;
        let Ok(priority) = raw
            .trim()
            .parse::<u32>()
        else {
            trace!("[COLLECT] Skipping {} priority {:?}", exten, raw);
            return Ok(());
        };

        let mut fields = event.clone();
        for field in LOCATION_FIELDS {
            fields.remove(field);
        }
        dump.entry(exten.to_string())
            .or_default()
            .insert(priority, fields);
        Ok(())
    }
}

impl EventHandler<ContextDump> for ExtensionPriorityInfo {
    fn event_name(&self) -> &str {
        EventName::ExtensionPriorityInfo.as_str()
    }

    fn handle(&mut self, event: &Packet, dump: &mut ContextDump) -> Dispatch {
        match Self::record(event, dump) {
            Ok(()) => Dispatch::Continue,
            Err(e) => Dispatch::Failed(e),
        }
    }
}

fn context_dump_collection() -> EventCollection<ContextDump> {
    EventCollection::new(ContextDump::new())
        .with_handler(ExtensionInfo)
        .with_handler(ExtensionPriorityInfo)
        .with_handler(IgnoreEvent::new(EventName::ContextDump.as_str()))
        .with_handler(CompletionSentinel::new(
            EventName::ContextDumpComplete.as_str(),
        ))
}

impl AmiClient {
    /// Set global `variable` to `value`.
    pub async fn set_global_var(&self, variable: &str, value: &str) -> AmiResult<ManagerResponse> {
        let action = Action::new("SetGlobalVar")
            .field(Field::Variable.as_str(), variable)
            .field(Field::Value.as_str(), value);
        self.send(&action)
            .await
    }

    /// Value of global `variable`.
    ///
    /// If the PBX reports an error (variable not set) and `default` is given,
    /// returns the default instead of [`AmiError::ActionFailed`].
    pub async fn get_global_var(&self, variable: &str, default: Option<&str>) -> AmiResult<String> {
        let action = Action::new("GetGlobalVar").field(Field::Variable.as_str(), variable);
        let response = match self
            .send(&action)
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_action_failed() => {
                return match default {
                    Some(default) => {
                        debug!("Global {} not set, using default", variable);
                        Ok(default.to_string())
                    }
                    None => Err(e),
                };
            }
            Err(e) => return Err(e),
        };

        response
            .get(variable)
            .map(str::to_string)
            .ok_or_else(|| {
                AmiError::protocol_error(format!("GetGlobalVar response lacks {} field", variable))
            })
    }

    /// Create an empty context.
    pub async fn context_create(
        &self,
        context: &str,
        registrar: Option<&str>,
    ) -> AmiResult<ManagerResponse> {
        let action = Action::new("ContextCreate")
            .field(Field::Context.as_str(), context)
            .optional(Field::Registrar.as_str(), registrar);
        self.send(&action)
            .await
    }

    /// Destroy a context.
    pub async fn context_destroy(
        &self,
        context: &str,
        registrar: Option<&str>,
    ) -> AmiResult<ManagerResponse> {
        let action = Action::new("ContextDestroy")
            .field(Field::Context.as_str(), context)
            .optional(Field::Registrar.as_str(), registrar);
        self.send(&action)
            .await
    }

    /// Dump every extension and priority of `context`.
    ///
    /// Collects `ExtensionInfo` / `ExtensionPriorityInfo` events tagged with
    /// the action's id until `ContextDumpComplete`. Fails with
    /// [`AmiError::Timeout`] if the sentinel does not arrive within the
    /// collection deadline.
    pub async fn context_dump(&self, context: &str) -> AmiResult<ContextDump> {
        let action = Action::new("ContextDump").field(Field::Context.as_str(), context);
        let dump = self
            .collect(&action, context_dump_collection())
            .await?;
        debug!("Dumped {} extensions from {}", dump.len(), context);
        Ok(dump)
    }

    /// Dump `context` and build its in-memory model.
    pub async fn fetch_context(&self, context: &str) -> AmiResult<Context> {
        let dump = self
            .context_dump(context)
            .await?;
        Ok(Context::from_dump(context, &dump)?)
    }

    /// Add one priority to an extension.
    ///
    /// With `replace`, an existing priority with the same number is
    /// overwritten instead of failing.
    pub async fn extension_add(
        &self,
        context: &str,
        exten: &str,
        priority: u32,
        app: &dyn Application,
        replace: bool,
    ) -> AmiResult<ManagerResponse> {
        let action = Action::new("DialplanExtensionAdd")
            .field(Field::Context.as_str(), context)
            .field(Field::Extension.as_str(), exten)
            .field(Field::Priority.as_str(), priority.to_string())
            .field(Field::Application.as_str(), app.name())
            .field(Field::ApplicationData.as_str(), app.args())
            .optional(Field::Replace.as_str(), replace.then_some("true"));
        self.send(&action)
            .await
    }

    /// Remove one priority, or the whole extension when `priority` is `None`.
    pub async fn extension_remove(
        &self,
        context: &str,
        exten: &str,
        priority: Option<u32>,
    ) -> AmiResult<ManagerResponse> {
        let action = Action::new("DialplanExtensionRemove")
            .field(Field::Context.as_str(), context)
            .field(Field::Extension.as_str(), exten)
            .optional(Field::Priority.as_str(), priority.map(|p| p.to_string()));
        self.send(&action)
            .await
    }

    /// Push every priority of `exten` into `context`, replacing existing ones.
    ///
    /// Stops at the first failure; priorities already added stay.
    pub async fn install_extension(&self, context: &str, exten: &Extension) -> AmiResult<()> {
        for priority in exten.priorities() {
            self.extension_add(context, exten.pattern(), priority.number, priority, true)
                .await?;
        }
        debug!(
            "Installed {} priorities of {} into {}",
            exten
                .priorities()
                .len(),
            exten.pattern(),
            context
        );
        Ok(())
    }

    /// End the Manager session. The PBX answers `Goodbye` and closes.
    pub async fn logoff(&self) -> AmiResult<ManagerResponse> {
        self.send(&Action::new("Logoff"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionId;

    fn dump_event(name: &str) -> Packet {
        Packet::new()
            .with("Event", name)
            .with("ActionID", "7")
    }

    #[test]
    fn test_dump_collection_builds_nested_map() {
        let mut collection = context_dump_collection();
        collection.bind(ActionId::new(7));

        let header = dump_event("ContextDump").with("Context", "local_extensions");
        assert!(matches!(collection.dispatch(&header), Dispatch::Continue));

        let info = dump_event("ExtensionInfo").with("Exten", "100");
        assert!(matches!(collection.dispatch(&info), Dispatch::Continue));

        let prio = dump_event("ExtensionPriorityInfo")
            .with("Context", "local_extensions")
            .with("Exten", "100")
            .with("Priority", "1")
            .with("Application", "Dial")
            .with("AppData", "Zap/G1")
            .with("Registrar", "pbx_config");
        assert!(matches!(collection.dispatch(&prio), Dispatch::Continue));

        let done = dump_event("ContextDumpComplete");
        assert!(matches!(collection.dispatch(&done), Dispatch::Done));

        let dump = collection.into_accumulator();
        let fields = &dump["100"][&1];
        let names: Vec<&str> = fields
            .iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(names, vec!["Application", "AppData"]);
        assert_eq!(fields.get("AppData"), Some("Zap/G1"));
    }

    #[test]
    fn test_priority_without_extension_info() {
        let mut collection = context_dump_collection();
        collection.bind(ActionId::new(7));
        let prio = dump_event("ExtensionPriorityInfo")
            .with("Exten", "s")
            .with("Priority", "2")
            .with("Application", "Hangup");
        assert!(matches!(collection.dispatch(&prio), Dispatch::Continue));
        assert!(collection.accumulator()["s"].contains_key(&2));
    }

    #[test]
    fn test_hint_priority_skipped() {
        let mut collection = context_dump_collection();
        collection.bind(ActionId::new(7));
        let hint = dump_event("ExtensionPriorityInfo")
            .with("Exten", "100")
            .with("Priority", "hint")
            .with("Application", "SIP/100");
        assert!(matches!(collection.dispatch(&hint), Dispatch::Continue));
        let step = dump_event("ExtensionPriorityInfo")
            .with("Exten", "100")
            .with("Priority", "1")
            .with("Application", "Dial")
            .with("AppData", "SIP/100");
        assert!(matches!(collection.dispatch(&step), Dispatch::Continue));
        assert!(matches!(
            collection.dispatch(&dump_event("ContextDumpComplete")),
            Dispatch::Done
        ));

        let dump = collection.into_accumulator();
        assert_eq!(dump["100"].len(), 1);
        assert_eq!(dump["100"][&1].get("Application"), Some("Dial"));
    }

    #[test]
    fn test_priority_missing_fails() {
        let mut collection = context_dump_collection();
        collection.bind(ActionId::new(7));
        let prio = dump_event("ExtensionPriorityInfo").with("Exten", "s");
        assert!(matches!(
            collection.dispatch(&prio),
            Dispatch::Failed(AmiError::Protocol { .. })
        ));
    }

    #[test]
    fn test_extension_info_requires_exten() {
        let mut collection = context_dump_collection();
        collection.bind(ActionId::new(7));
        assert!(matches!(
            collection.dispatch(&dump_event("ExtensionInfo")),
            Dispatch::Failed(_)
        ));
    }
}
