//! Protocol constants and configuration values

/// Default Asterisk Manager Interface TCP port
pub const DEFAULT_AMI_PORT: u16 = 5038;

/// Socket buffer size for reading from the transport (64KB)
pub const SOCKET_BUF_SIZE: usize = 65536;

/// Maximum size of a single packet (1MB). A `ContextDump` priority event is a
/// few hundred bytes; anything near this limit means the stream is garbage.
pub const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// Maximum total buffer size (4MB) - safety limit to prevent runaway memory
pub const MAX_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Greeting line the PBX sends when a connection opens
pub const BANNER_PREFIX: &str = "Asterisk Call Manager/";

/// Line terminator emitted on the wire. Both `\r\n` and `\n` are accepted on read.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Response status values
pub const RESPONSE_SUCCESS: &str = "Success";
pub const RESPONSE_ERROR: &str = "Error";
pub const RESPONSE_FOLLOWS: &str = "Follows";
pub const RESPONSE_GOODBYE: &str = "Goodbye";

/// Default response timeout in milliseconds
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 5000;

/// Default deadline for a bounded event collection in milliseconds
pub const DEFAULT_COLLECT_TIMEOUT_MS: u64 = 10_000;

/// Maximum number of queued unscoped events before dropping
pub const MAX_EVENT_QUEUE_SIZE: usize = 1000;
