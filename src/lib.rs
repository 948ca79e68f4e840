//! Asterisk Manager Interface (AMI) client for Rust
//!
//! This crate provides an async client for the Asterisk Manager Interface,
//! with `ActionID` correlation of responses and of the event streams that
//! bulk queries answer with, plus an in-memory model of the dialplan.
//!
//! # Architecture
//!
//! The library uses a split reader/writer design:
//! - [`AmiClient`] (Clone + Send) sends actions from any task
//! - [`AmiEventStream`] receives unscoped events from a background reader task
//!
//! The reader task is the only consumer of the transport. Responses go to
//! the caller that sent the matching `ActionID`; events tagged with the
//! `ActionID` of a running collection go to that collection; everything else
//! goes to the [`AmiEventStream`].
//!
//! The client starts on an already authenticated transport. Logging in is
//! left to the caller.
//!
//! # Examples
//!
//! ## Sending actions
//!
//! ```rust,no_run
//! use asterisk_ami_tokio::{AmiClient, AmiError};
//! use tokio::net::TcpStream;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AmiError> {
//!     let stream = TcpStream::connect(("localhost", asterisk_ami_tokio::DEFAULT_AMI_PORT)).await?;
//!     // ... read the banner and log in on `stream` first ...
//!     let (client, _events) = AmiClient::start(stream);
//!
//!     client.context_create("local_extensions", None).await?;
//!     client.set_global_var("TRUNK", "Zap/G1").await?;
//!     let trunk = client.get_global_var("TRUNK", Some("Zap/G2")).await?;
//!     println!("trunk: {}", trunk);
//!     Ok(())
//! }
//! ```
//!
//! ## Dumping a context
//!
//! ```rust,no_run
//! # use asterisk_ami_tokio::{AmiClient, AmiError};
//! # async fn run(client: AmiClient) -> Result<(), AmiError> {
//! let dump = client.context_dump("local_extensions").await?;
//! for (exten, priorities) in &dump {
//!     for (priority, fields) in priorities {
//!         println!("{} {} {}", exten, priority, fields.get("Application").unwrap_or("?"));
//!     }
//! }
//!
//! let context = client.fetch_context("local_extensions").await?;
//! println!("{} extensions", context.extensions().count());
//! # Ok(())
//! # }
//! ```
//!
//! ## Building extensions
//!
//! ```rust
//! use asterisk_ami_tokio::app::{Application, Dial, DialOption, GenericApp};
//! use asterisk_ami_tokio::Extension;
//!
//! let exten = Extension::new("100")
//!     .unwrap()
//!     .then(&Dial::new(["SIP/100"]).option(DialOption::Timeout(20)))
//!     .unwrap()
//!     .then(&GenericApp::new("VoiceMail", ["100", "u"]))
//!     .unwrap();
//!
//! assert_eq!(exten.priorities()[0].render(), "Dial(SIP/100|20)");
//! assert_eq!(exten.priorities()[1].number, 2);
//! ```
//!
//! Push it to the PBX with [`AmiClient::install_extension`].
//!
//! ## Custom bulk queries
//!
//! Any action answered by `ActionID`-tagged events and a completion event
//! can be collected with an [`EventCollection`]:
//!
//! ```rust,no_run
//! use asterisk_ami_tokio::{
//!     Action, AmiClient, AmiError, CompletionSentinel, Dispatch, EventCollection, EventHandler,
//!     Packet,
//! };
//!
//! struct PeerNames;
//!
//! impl EventHandler<Vec<String>> for PeerNames {
//!     fn event_name(&self) -> &str {
//!         "PeerEntry"
//!     }
//!
//!     fn handle(&mut self, event: &Packet, names: &mut Vec<String>) -> Dispatch {
//!         if let Some(name) = event.get("ObjectName") {
//!             names.push(name.to_string());
//!         }
//!         Dispatch::Continue
//!     }
//! }
//!
//! # async fn run(client: AmiClient) -> Result<(), AmiError> {
//! let peers = client
//!     .collect(
//!         &Action::new("SIPpeers"),
//!         EventCollection::new(Vec::new())
//!             .with_handler(PeerNames)
//!             .with_handler(CompletionSentinel::new("PeerlistComplete")),
//!     )
//!     .await?;
//! println!("{:?}", peers);
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod macros;

pub mod action;
pub mod app;
pub mod connection;
pub mod correlator;
pub mod dialplan;
pub mod error;
pub mod fields;
pub mod packet;
pub mod pbx;

pub mod constants;
pub(crate) mod protocol;

pub use action::{Action, ActionId, ManagerResponse, ResponseStatus};
pub use connection::{AmiClient, AmiEventStream, AmiOptions, ConnectionStatus, DisconnectReason};
pub use constants::DEFAULT_AMI_PORT;
pub use correlator::{
    CompletionSentinel, Dispatch, EventCollection, EventHandler, IgnoreEvent, Subscription,
};
pub use dialplan::{
    Context, Dialplan, DialplanError, DialplanResult, Extension, Priority,
};
pub use error::{AmiError, AmiResult};
pub use fields::{EventName, Field, ParseEventNameError, ParseFieldError};
pub use packet::Packet;
pub use pbx::ContextDump;
pub use protocol::{PacketKind, PacketParser};
