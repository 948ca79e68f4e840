//! Dialplan application builders.
//!
//! Each application renders to a name plus a pipe-delimited argument string,
//! which is what a priority stores and what `DialplanExtensionAdd` sends as
//! `Application` / `ApplicationData`.

mod dial;

pub use dial::{Dial, DialOption};

/// Argument separator used between application arguments.
pub const ARG_SEPARATOR: char = '|';

/// A dialplan application with its arguments.
pub trait Application: Send + Sync {
    /// Application name, e.g. `Dial`.
    fn name(&self) -> &str;

    /// Pipe-delimited argument string (possibly empty).
    fn args(&self) -> String;

    /// `Name(args)` as it would appear in a dialplan.
    fn render(&self) -> String {
        format!("{}({})", self.name(), self.args())
    }
}

/// Join argument slots with `|`, dropping trailing empty slots.
pub(crate) fn join_args<'a>(slots: impl IntoIterator<Item = &'a str>) -> String {
    let mut slots: Vec<&str> = slots
        .into_iter()
        .collect();
    while slots
        .last()
        .is_some_and(|s| s.is_empty())
    {
        slots.pop();
    }
    slots.join("|")
}

/// Any application given as a name and positional arguments.
///
/// ```
/// use asterisk_ami_tokio::app::{Application, GenericApp};
///
/// let app = GenericApp::new("VoicemailMain", ["${CALLERID}", "s"]);
/// assert_eq!(app.render(), "VoicemailMain(${CALLERID}|s)");
/// assert_eq!(GenericApp::bare("Hangup").render(), "Hangup()");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericApp {
    name: String,
    args: Vec<String>,
}

impl GenericApp {
    /// Application with positional arguments.
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args
                .into_iter()
                .map(Into::into)
                .collect(),
        }
    }

    /// Application without arguments, e.g. `Hangup` or `Congestion`.
    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, Vec::<String>::new())
    }
}

impl Application for GenericApp {
    fn name(&self) -> &str {
        &self.name
    }

    fn args(&self) -> String {
        join_args(
            self.args
                .iter()
                .map(String::as_str),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_args_drops_trailing_empty() {
        assert_eq!(join_args(["a", "", "b", "", ""]), "a||b");
        assert_eq!(join_args(["", ""]), "");
    }

    #[test]
    fn test_generic_app() {
        let app = GenericApp::new("Playback", ["voicemail-unavail"]);
        assert_eq!(app.name(), "Playback");
        assert_eq!(app.args(), "voicemail-unavail");
        assert_eq!(GenericApp::bare("Congestion").args(), "");
    }
}
