//! # Command Names and Arguments
//!
//! Well-known commands the broker itself understands. Every other command is
//! opaque to the broker and is routed through a dispatch table by name.

use serde_json::{Map, Value};

/// Argument bag of a command: a JSON object keyed by argument name.
pub type Arguments = Map<String, Value>;

/// Challenge/response authentication. Reachable before a connection is trusted.
pub const AUTHENTICATE: &str = "Authenticate";

/// Rack registration, issued once by the rack after it trusts the region.
pub const REGISTER_RACK_CONTROLLER: &str = "RegisterRackController";

/// Asks the peer for its event-loop name.
pub const IDENTIFY: &str = "Identify";

/// Liveness probe.
pub const PING: &str = "Ping";

/// Commands an unauthenticated connection may invoke.
pub const UNAUTHENTICATED_COMMANDS: &[&str] = &[AUTHENTICATE];

/// Idempotent, argument-free rack commands whose results may be memoised
/// per connection.
pub const CACHEABLE_COMMANDS: &[&str] = &[
    "DescribePowerTypes",
    "DescribeNOSTypes",
    "GetControllerType",
    "GetTimeConfiguration",
];

/// True if `command` may run on a connection that has not been trusted yet.
pub fn allowed_unauthenticated(command: &str) -> bool {
    UNAUTHENTICATED_COMMANDS.contains(&command)
}

/// True if results of `command` may be served from the call cache.
pub fn is_cacheable(command: &str) -> bool {
    CACHEABLE_COMMANDS.contains(&command)
}

/// Build an argument bag from a JSON value; anything but an object is empty.
pub fn arguments_from(value: Value) -> Arguments {
    match value {
        Value::Object(map) => map,
        _ => Arguments::new(),
    }
}
