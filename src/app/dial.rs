//! The `Dial` application and its typed options.

use super::{join_args, Application};
use crate::dialplan::{DialplanError, DialplanResult};
use std::fmt::Write;

/// One `Dial` option.
///
/// Flag options render as a single letter in the options slot; options that
/// carry a value render as `Letter(value)`. `Timeout` and `Url` have slots
/// of their own.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DialOption {
    /// `t`: allow the called user to transfer the call.
    CalleeForward,
    /// `T`: allow the calling user to transfer the call.
    CallerForward,
    /// `x`: allow the called user to attended-transfer the call.
    CalleeAttended,
    /// `X`: allow the calling user to attended-transfer the call.
    CallerAttended,
    /// `h`: allow the called user to hang up.
    CalleeHangup,
    /// `H`: allow the calling user to hang up.
    CallerHangup,
    /// `P` or `P(db)`: privacy mode, optionally with its database.
    Privacy(Option<String>),
    /// `f`: force CallerID to that of the calling extension.
    ForceCallerId,
    /// `r`: indicate ringing to the calling party.
    IndicateRing,
    /// `m`: play on-hold music to the calling party.
    IndicateMusic,
    /// `M(macro)`: run a macro on connection.
    ConnectExec(String),
    /// `C`: reset the CDR for this call.
    ResetCdr,
    /// `g`: continue in the context if the destination hangs up.
    HangupContinue,
    /// `A(file)`: play a file to the callee on connection.
    Announce(String),
    /// `S(n)`: hang up `n` seconds after connection.
    ConnectSecs(u32),
    /// `D(digits)`: send DTMF to the callee before connecting.
    SendDtmf(String),
    /// Seconds to wait for an answer.
    Timeout(u32),
    /// URL sent to the callee.
    Url(String),
}

fn parse_secs(key: &str, value: &str) -> DialplanResult<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| DialplanError::InvalidDialOption {
            option: key.to_string(),
            value: value.to_string(),
        })
}

impl DialOption {
    /// Build an option from its keyword name.
    ///
    /// Flag options ignore `value`. Unknown keywords fail with
    /// [`DialplanError::UnknownDialOption`].
    ///
    /// ```
    /// use asterisk_ami_tokio::app::DialOption;
    ///
    /// assert_eq!(
    ///     DialOption::parse("connect_exec", "fpo").unwrap(),
    ///     DialOption::ConnectExec("fpo".into())
    /// );
    /// assert!(DialOption::parse("teleport", "").is_err());
    /// ```
    pub fn parse(key: &str, value: &str) -> DialplanResult<Self> {
        let option = match key {
            "callee_forward" => DialOption::CalleeForward,
            "caller_forward" => DialOption::CallerForward,
            "callee_attended" => DialOption::CalleeAttended,
            "caller_attended" => DialOption::CallerAttended,
            "callee_hangup" => DialOption::CalleeHangup,
            "caller_hangup" => DialOption::CallerHangup,
            "privacy" => DialOption::Privacy(None),
            "privacy_db" => DialOption::Privacy(Some(value.to_string())),
            "force_callerid" => DialOption::ForceCallerId,
            "indicate_ring" => DialOption::IndicateRing,
            "indicate_music" => DialOption::IndicateMusic,
            "connect_exec" => DialOption::ConnectExec(value.to_string()),
            "reset_cdr" => DialOption::ResetCdr,
            "hangup_continue" => DialOption::HangupContinue,
            "announce" => DialOption::Announce(value.to_string()),
            "connect_secs" => DialOption::ConnectSecs(parse_secs(key, value)?),
            "send_dtmf" => DialOption::SendDtmf(value.to_string()),
            "timeout" => DialOption::Timeout(parse_secs(key, value)?),
            "url" => DialOption::Url(value.to_string()),
            _ => return Err(DialplanError::UnknownDialOption(key.to_string())),
        };
        Ok(option)
    }

    /// Single-letter flag, for options without a value.
    fn flag(&self) -> Option<char> {
        Some(match self {
            DialOption::CalleeForward => 't',
            DialOption::CallerForward => 'T',
            DialOption::CalleeAttended => 'x',
            DialOption::CallerAttended => 'X',
            DialOption::CalleeHangup => 'h',
            DialOption::CallerHangup => 'H',
            DialOption::ForceCallerId => 'f',
            DialOption::IndicateRing => 'r',
            DialOption::IndicateMusic => 'm',
            DialOption::ResetCdr => 'C',
            DialOption::HangupContinue => 'g',
            _ => return None,
        })
    }

    /// Write this option into the options slot. `Timeout`/`Url` write nothing.
    fn write_flag(&self, out: &mut String) {
        if let Some(flag) = self.flag() {
            out.push(flag);
            return;
        }
        let _ = match self {
            DialOption::Privacy(None) => write!(out, "P"),
            DialOption::Privacy(Some(db)) => write!(out, "P({})", db),
            DialOption::ConnectExec(m) => write!(out, "M({})", m),
            DialOption::Announce(file) => write!(out, "A({})", file),
            DialOption::ConnectSecs(n) => write!(out, "S({})", n),
            DialOption::SendDtmf(digits) => write!(out, "D({})", digits),
            _ => Ok(()),
        };
    }
}

/// The standard `Dial` application.
///
/// ```
/// use asterisk_ami_tokio::app::{Application, Dial, DialOption};
///
/// let dial = Dial::new(["sip/101", "sip/102"])
///     .option(DialOption::Timeout(60))
///     .option(DialOption::Announce("/etc/asterisk/sounds/connected".into()))
///     .option(DialOption::ConnectExec("fpo".into()));
/// assert_eq!(
///     dial.render(),
///     "Dial(sip/101&sip/102|60|A(/etc/asterisk/sounds/connected)M(fpo))"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dial {
    channels: Vec<String>,
    options: Vec<DialOption>,
}

impl Dial {
    /// Dial one or more channels in parallel.
    pub fn new<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channels: channels
                .into_iter()
                .map(Into::into)
                .collect(),
            options: Vec::new(),
        }
    }

    /// Add an option. A later `Timeout`, `Url` or `Privacy` replaces an earlier one.
    pub fn option(mut self, option: DialOption) -> Self {
        self.set_option(option);
        self
    }

    /// Add an option in place.
    pub fn set_option(&mut self, option: DialOption) {
        let same_kind = std::mem::discriminant(&option);
        let singular = matches!(
            option,
            DialOption::Timeout(_) | DialOption::Url(_) | DialOption::Privacy(_)
        );
        if singular {
            self.options
                .retain(|o| std::mem::discriminant(o) != same_kind);
        }
        if !self
            .options
            .contains(&option)
        {
            self.options
                .push(option);
        }
    }

    /// Build from keyword/value pairs, rejecting unknown keywords.
    ///
    /// `privacy_db` implies `privacy`.
    pub fn from_keywords<'a, I, C, S>(channels: C, options: I) -> DialplanResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut dial = Dial::new(channels);
        for (key, value) in options {
            let option = DialOption::parse(key, value)?;
            // Plain `privacy` must not clobber a database already given.
            if option == DialOption::Privacy(None)
                && dial
                    .options
                    .iter()
                    .any(|o| matches!(o, DialOption::Privacy(Some(_))))
            {
                continue;
            }
            dial.set_option(option);
        }
        Ok(dial)
    }

    /// Channels dialled.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Options in the order they were added.
    pub fn options(&self) -> &[DialOption] {
        &self.options
    }
}

impl Application for Dial {
    fn name(&self) -> &str {
        "Dial"
    }

    fn args(&self) -> String {
        let mut timeout = String::new();
        let mut url = String::new();
        let mut flags = String::new();

        for option in &self.options {
            match option {
                DialOption::Timeout(secs) => timeout = secs.to_string(),
                DialOption::Url(u) => url = u.clone(),
                other => other.write_flag(&mut flags),
            }
        }

        let channels = self
            .channels
            .join("&");
        join_args([
            channels.as_str(),
            timeout.as_str(),
            flags.as_str(),
            url.as_str(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_only() {
        assert_eq!(Dial::new(["Zap/G1"]).args(), "Zap/G1");
    }

    #[test]
    fn test_flags_without_timeout_keep_empty_slot() {
        let dial = Dial::new(["SIP/100"])
            .option(DialOption::CalleeForward)
            .option(DialOption::CallerForward);
        assert_eq!(dial.args(), "SIP/100||tT");
    }

    #[test]
    fn test_url_slot() {
        let dial = Dial::new(["SIP/100"]).option(DialOption::Url("http://example.com".into()));
        assert_eq!(dial.args(), "SIP/100|||http://example.com");
    }

    #[test]
    fn test_privacy_with_database() {
        let dial = Dial::new(["SIP/100"]).option(DialOption::Privacy(Some("privdb".into())));
        assert_eq!(dial.args(), "SIP/100||P(privdb)");
    }

    #[test]
    fn test_value_options() {
        let dial = Dial::new(["SIP/100"])
            .option(DialOption::ConnectSecs(30))
            .option(DialOption::SendDtmf("123#".into()))
            .option(DialOption::ResetCdr);
        assert_eq!(dial.args(), "SIP/100||S(30)D(123#)C");
    }

    #[test]
    fn test_later_timeout_replaces_earlier() {
        let dial = Dial::new(["SIP/100"])
            .option(DialOption::Timeout(10))
            .option(DialOption::Timeout(20));
        assert_eq!(dial.args(), "SIP/100|20");
        assert_eq!(
            dial.options()
                .len(),
            1
        );
    }

    #[test]
    fn test_duplicate_flag_added_once() {
        let dial = Dial::new(["SIP/100"])
            .option(DialOption::IndicateRing)
            .option(DialOption::IndicateRing);
        assert_eq!(dial.args(), "SIP/100||r");
    }

    #[test]
    fn test_from_keywords() {
        let dial = Dial::from_keywords(
            ["sip/101"],
            [
                ("privacy_db", "mydb"),
                ("privacy", ""),
                ("timeout", "45"),
                ("hangup_continue", ""),
            ],
        )
        .unwrap();
        assert_eq!(dial.args(), "sip/101|45|P(mydb)g");
    }

    #[test]
    fn test_from_keywords_rejects_unknown() {
        let err = Dial::from_keywords(["sip/101"], [("bogus", "1")]).unwrap_err();
        assert_eq!(err, DialplanError::UnknownDialOption("bogus".into()));
    }

    #[test]
    fn test_from_keywords_rejects_bad_number() {
        let err = Dial::from_keywords(["sip/101"], [("timeout", "soon")]).unwrap_err();
        assert!(matches!(err, DialplanError::InvalidDialOption { .. }));
    }
}
