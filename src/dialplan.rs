//! In-memory dialplan: contexts, extensions and their priorities

use crate::{app::Application, fields::Field, pbx::ContextDump};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Result alias for dialplan model operations.
pub type DialplanResult<T> = Result<T, DialplanError>;

/// Problems with a dialplan instance or an application's options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DialplanError {
    #[error("pattern {0:?} is not legal")]
    IllegalPattern(String),
    #[error("context {0:?} already exists")]
    DuplicateContext(String),
    #[error("extension {pattern:?} already exists in context {context:?}")]
    DuplicateExtension { context: String, pattern: String },
    #[error("extension {pattern:?} already has priority {priority}")]
    DuplicatePriority { pattern: String, priority: u32 },
    #[error("no extension {0:?}")]
    UnknownExtension(String),
    #[error("no context {0:?}")]
    UnknownContext(String),
    #[error("unknown Dial option {0:?}")]
    UnknownDialOption(String),
    #[error("invalid value {value:?} for Dial option {option:?}")]
    InvalidDialOption { option: String, value: String },
    #[error("invalid context dump: {0}")]
    InvalidDump(String),
    #[error("extension {0:?} has no priority number left")]
    PriorityOverflow(String),
}

fn is_pattern_char(c: char) -> bool {
    c.is_ascii_digit()
        || matches!(
            c,
            'X' | 'x' | 'Z' | 'z' | 'N' | 'n' | '.' | '!' | '[' | ']' | '-' | '*' | '#' | '+'
        )
}

/// Whether `pattern` is a legal extension pattern.
///
/// Literal extensions are letters, digits and `* # + -`
/// (`100`, `s`, `*97`, `s-BUSY`). Match patterns start with `_` followed by
/// digits and the pattern characters `X Z N . ! [ ] -`, in either case.
pub fn pattern_legal(pattern: &str) -> bool {
    match pattern.strip_prefix('_') {
        Some(rest) => {
            !rest.is_empty()
                && rest
                    .chars()
                    .all(is_pattern_char)
        }
        None => {
            !pattern.is_empty()
                && pattern
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '#' | '+' | '-'))
        }
    }
}

/// One numbered step of an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Priority {
    /// Priority number, starting at 1.
    pub number: u32,
    /// Application name.
    pub application: String,
    /// Pipe-delimited application arguments.
    pub app_data: String,
}

impl Priority {
    /// Priority running `app`.
    pub fn new(number: u32, app: &dyn Application) -> Self {
        Self {
            number,
            application: app
                .name()
                .to_string(),
            app_data: app.args(),
        }
    }
}

impl Application for Priority {
    fn name(&self) -> &str {
        &self.application
    }

    fn args(&self) -> String {
        self.app_data
            .clone()
    }
}

/// A pattern within a context, with its ordered priorities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pattern: String,
    priorities: Vec<Priority>,
}

impl Extension {
    /// New extension. Fails if the pattern is not legal.
    pub fn new(pattern: impl ToString) -> DialplanResult<Self> {
        let pattern = pattern.to_string();
        if !pattern_legal(&pattern) {
            return Err(DialplanError::IllegalPattern(pattern));
        }
        Ok(Self {
            pattern,
            priorities: Vec::new(),
        })
    }

    /// Extension pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Priorities in ascending order.
    pub fn priorities(&self) -> &[Priority] {
        &self.priorities
    }

    /// Look up a priority by number.
    pub fn priority(&self, number: u32) -> Option<&Priority> {
        self.priorities
            .iter()
            .find(|p| p.number == number)
    }

    /// Number the next appended priority would get.
    ///
    /// Fails once the last priority is `u32::MAX`.
    pub fn next_priority(&self) -> DialplanResult<u32> {
        match self
            .priorities
            .last()
        {
            None => Ok(1),
            Some(last) => last
                .number
                .checked_add(1)
                .ok_or_else(|| DialplanError::PriorityOverflow(self.pattern.clone())),
        }
    }

    /// Add a priority, keeping the list ordered.
    pub fn add_priority(&mut self, priority: Priority) -> DialplanResult<()> {
        match self
            .priorities
            .binary_search_by_key(&priority.number, |p| p.number)
        {
            Ok(_) => Err(DialplanError::DuplicatePriority {
                pattern: self
                    .pattern
                    .clone(),
                priority: priority.number,
            }),
            Err(pos) => {
                self.priorities
                    .insert(pos, priority);
                Ok(())
            }
        }
    }

    /// Add `app` at `priority`, or after the last priority when `None`.
    /// Returns the number used.
    pub fn add_application(
        &mut self,
        app: &dyn Application,
        priority: Option<u32>,
    ) -> DialplanResult<u32> {
        let number = match priority {
            Some(number) => number,
            None => self.next_priority()?,
        };
        self.add_priority(Priority::new(number, app))?;
        Ok(number)
    }

    /// Builder-style [`add_application`](Self::add_application) appending at the end.
    pub fn then(mut self, app: &dyn Application) -> DialplanResult<Self> {
        self.add_application(app, None)?;
        Ok(self)
    }
}

/// A named routing scope holding extensions keyed by pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    name: String,
    extensions: BTreeMap<String, Extension>,
}

impl Context {
    /// Empty context.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extensions: BTreeMap::new(),
        }
    }

    /// Context name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add an extension. Fails if its pattern is already present.
    pub fn add_extension(&mut self, exten: Extension) -> DialplanResult<()> {
        if self
            .extensions
            .contains_key(exten.pattern())
        {
            return Err(DialplanError::DuplicateExtension {
                context: self
                    .name
                    .clone(),
                pattern: exten.pattern,
            });
        }
        self.extensions
            .insert(
                exten
                    .pattern
                    .clone(),
                exten,
            );
        Ok(())
    }

    /// Remove an extension by pattern.
    pub fn remove_extension(&mut self, pattern: &str) -> DialplanResult<Extension> {
        self.extensions
            .remove(pattern)
            .ok_or_else(|| DialplanError::UnknownExtension(pattern.to_string()))
    }

    /// Look up an extension by pattern.
    pub fn extension(&self, pattern: &str) -> Option<&Extension> {
        self.extensions
            .get(pattern)
    }

    /// Extensions ordered by pattern.
    pub fn extensions(&self) -> impl Iterator<Item = &Extension> {
        self.extensions
            .values()
    }

    /// Build a context from a `ContextDump` result.
    ///
    /// Each priority needs an `Application` field; a missing `AppData` is an
    /// empty argument string.
    pub fn from_dump(name: impl Into<String>, dump: &ContextDump) -> DialplanResult<Self> {
        let mut context = Context::new(name);
        for (pattern, priorities) in dump {
            let mut exten = Extension::new(pattern)?;
            for (&number, fields) in priorities {
                let application = fields
                    .get(Field::Application)
                    .ok_or_else(|| {
                        DialplanError::InvalidDump(format!(
                            "{}:{} has no Application",
                            pattern, number
                        ))
                    })?;
                exten.add_priority(Priority {
                    number,
                    application: application.to_string(),
                    app_data: fields
                        .get(Field::AppData)
                        .unwrap_or("")
                        .to_string(),
                })?;
            }
            context.add_extension(exten)?;
        }
        Ok(context)
    }
}

/// The whole dialplan: contexts keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialplan {
    contexts: BTreeMap<String, Context>,
}

impl Dialplan {
    /// Empty dialplan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a context. Fails if the name is already present.
    pub fn add_context(&mut self, context: Context) -> DialplanResult<()> {
        if self
            .contexts
            .contains_key(context.name())
        {
            return Err(DialplanError::DuplicateContext(context.name));
        }
        self.contexts
            .insert(
                context
                    .name
                    .clone(),
                context,
            );
        Ok(())
    }

    /// Remove a context by name.
    pub fn remove_context(&mut self, name: &str) -> DialplanResult<Context> {
        self.contexts
            .remove(name)
            .ok_or_else(|| DialplanError::UnknownContext(name.to_string()))
    }

    /// Look up a context by name.
    pub fn context(&self, name: &str) -> Option<&Context> {
        self.contexts
            .get(name)
    }

    /// Contexts ordered by name.
    pub fn contexts(&self) -> impl Iterator<Item = &Context> {
        self.contexts
            .values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{Dial, GenericApp};
    use crate::packet::Packet;

    #[test]
    fn test_pattern_legal() {
        assert!(pattern_legal("100"));
        assert!(pattern_legal("s"));
        assert!(pattern_legal("*97"));
        assert!(pattern_legal("_9NXXXXXX"));
        assert!(pattern_legal("_X."));
        assert!(pattern_legal("_[1-5]XX"));
        assert!(!pattern_legal(""));
        assert!(!pattern_legal("_"));
        assert!(!pattern_legal("has space"));
        assert!(!pattern_legal("_abc"));
    }

    #[test]
    fn test_macro_and_lowercase_patterns_legal() {
        assert!(pattern_legal("s-BUSY"));
        assert!(pattern_legal("s-NOANSWER"));
        assert!(pattern_legal("_9nxx"));
        assert!(pattern_legal("_1zx."));
        assert!(Extension::new("s-CHANUNAVAIL").is_ok());
        assert!(!pattern_legal("s_busy"));
    }

    #[test]
    fn test_priority_number_exhausted() {
        let mut exten = Extension::new(100).unwrap();
        exten
            .add_application(&GenericApp::bare("Hangup"), Some(u32::MAX))
            .unwrap();
        assert_eq!(
            exten.next_priority(),
            Err(DialplanError::PriorityOverflow("100".into()))
        );
        assert_eq!(
            exten.add_application(&GenericApp::bare("Hangup"), None),
            Err(DialplanError::PriorityOverflow("100".into()))
        );
        assert_eq!(
            exten
                .priorities()
                .len(),
            1
        );
    }

    #[test]
    fn test_extension_rejects_illegal_pattern() {
        assert_eq!(
            Extension::new("bad pattern"),
            Err(DialplanError::IllegalPattern("bad pattern".into()))
        );
    }

    #[test]
    fn test_add_application_numbers_sequentially() {
        let mut exten = Extension::new(100).unwrap();
        assert_eq!(
            exten
                .add_application(&Dial::new(["Zap/G1"]), None)
                .unwrap(),
            1
        );
        assert_eq!(
            exten
                .add_application(&GenericApp::bare("Congestion"), None)
                .unwrap(),
            2
        );
        assert_eq!(
            exten
                .add_application(&GenericApp::bare("Hangup"), Some(10))
                .unwrap(),
            10
        );
        assert_eq!(exten.next_priority(), Ok(11));
        assert_eq!(
            exten
                .priority(1)
                .unwrap()
                .render(),
            "Dial(Zap/G1)"
        );
    }

    #[test]
    fn test_priorities_stay_sorted() {
        let mut exten = Extension::new("s").unwrap();
        exten
            .add_application(&GenericApp::bare("Hangup"), Some(3))
            .unwrap();
        exten
            .add_application(&GenericApp::bare("Answer"), Some(1))
            .unwrap();
        let numbers: Vec<u32> = exten
            .priorities()
            .iter()
            .map(|p| p.number)
            .collect();
        assert_eq!(numbers, vec![1, 3]);
    }

    #[test]
    fn test_duplicate_priority() {
        let mut exten = Extension::new(101).unwrap();
        exten
            .add_application(&GenericApp::bare("Answer"), Some(1))
            .unwrap();
        let err = exten
            .add_application(&GenericApp::bare("Hangup"), Some(1))
            .unwrap_err();
        assert_eq!(
            err,
            DialplanError::DuplicatePriority {
                pattern: "101".into(),
                priority: 1
            }
        );
    }

    #[test]
    fn test_context_duplicate_extension() {
        let mut context = Context::new("local_extensions");
        context
            .add_extension(Extension::new(100).unwrap())
            .unwrap();
        assert!(matches!(
            context.add_extension(Extension::new(100).unwrap()),
            Err(DialplanError::DuplicateExtension { .. })
        ));
        assert!(context
            .remove_extension("100")
            .is_ok());
        assert!(context
            .remove_extension("100")
            .is_err());
    }

    #[test]
    fn test_dialplan_duplicate_context() {
        let mut dialplan = Dialplan::new();
        dialplan
            .add_context(Context::new("default"))
            .unwrap();
        assert_eq!(
            dialplan.add_context(Context::new("default")),
            Err(DialplanError::DuplicateContext("default".into()))
        );
        assert_eq!(
            dialplan
                .contexts()
                .count(),
            1
        );
    }

    #[test]
    fn test_context_from_dump() {
        let mut dump = ContextDump::new();
        dump.entry("100".to_string())
            .or_default()
            .insert(
                1,
                Packet::new()
                    .with("Application", "Dial")
                    .with("AppData", "Zap/G1"),
            );
        dump.entry("100".to_string())
            .or_default()
            .insert(2, Packet::new().with("Application", "Hangup"));

        let context = Context::from_dump("local_extensions", &dump).unwrap();
        let exten = context
            .extension("100")
            .unwrap();
        assert_eq!(
            exten
                .priorities()
                .len(),
            2
        );
        assert_eq!(
            exten
                .priority(1)
                .unwrap()
                .app_data,
            "Zap/G1"
        );
        assert_eq!(
            exten
                .priority(2)
                .unwrap()
                .render(),
            "Hangup()"
        );
    }

    #[test]
    fn test_context_from_dump_requires_application() {
        let mut dump = ContextDump::new();
        dump.entry("100".to_string())
            .or_default()
            .insert(1, Packet::new().with("AppData", "x"));
        assert!(matches!(
            Context::from_dump("c", &dump),
            Err(DialplanError::InvalidDump(_))
        ));
    }
}
