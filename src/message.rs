//! Wire message schema: the eight reserved command tokens and their
//! positional payloads (see the protocol spec's component design, §4.2).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A reserved wire command. Unrecognized tokens round-trip through
/// [`Command::Other`] rather than failing to deserialize, so the dispatcher
/// can reply with an `ERR` naming the offending token instead of a bare
/// framing error.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    Auth,
    Ok,
    Ping,
    Pong,
    Call,
    Res,
    Exc,
    Err,
    Quit,
    Other(String),
}

impl Command {
    fn as_str(&self) -> &str {
        match self {
            Command::Auth => "AUTH",
            Command::Ok => "OK",
            Command::Ping => "PING",
            Command::Pong => "PONG",
            Command::Call => "CALL",
            Command::Res => "RES",
            Command::Exc => "EXC",
            Command::Err => "ERR",
            Command::Quit => "QUIT",
            Command::Other(s) => s,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Command {
    fn from(s: &str) -> Self {
        match s {
            "AUTH" => Command::Auth,
            "OK" => Command::Ok,
            "PING" => Command::Ping,
            "PONG" => Command::Pong,
            "CALL" => Command::Call,
            "RES" => Command::Res,
            "EXC" => Command::Exc,
            "ERR" => Command::Err,
            "QUIT" => Command::Quit,
            other => Command::Other(other.to_owned()),
        }
    }
}

impl Serialize for Command {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Command::from(s.as_str()))
    }
}

/// One framed unit on the wire: `{"cmd": "...", "payload": [...]}` followed
/// by a single `\n`. Payload elements are positional; see the table in the
/// protocol spec's §4.2 for the shape each command expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub cmd: Command,
    #[serde(default)]
    pub payload: Vec<Value>,
}

impl Message {
    pub fn new(cmd: Command, payload: Vec<Value>) -> Self {
        Self { cmd, payload }
    }

    pub fn auth(authkey: impl Into<String>) -> Self {
        Self::new(Command::Auth, vec![Value::String(authkey.into())])
    }

    pub fn ok() -> Self {
        Self::new(Command::Ok, vec![])
    }

    pub fn ping(timestamp: f64) -> Self {
        Self::new(Command::Ping, vec![timestamp.into()])
    }

    pub fn pong(timestamp: Value) -> Self {
        Self::new(Command::Pong, vec![timestamp])
    }

    pub fn call(name: impl Into<String>, args: Vec<Value>, kwargs: serde_json::Map<String, Value>) -> Self {
        Self::new(
            Command::Call,
            vec![Value::String(name.into()), Value::Array(args), Value::Object(kwargs)],
        )
    }

    pub fn res(value: Value) -> Self {
        Self::new(Command::Res, vec![value])
    }

    pub fn exc(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            Command::Exc,
            vec![Value::String(class.into()), Value::String(message.into())],
        )
    }

    pub fn err(reason: impl Into<String>) -> Self {
        Self::new(Command::Err, vec![Value::String(reason.into())])
    }

    pub fn quit() -> Self {
        Self::new(Command::Quit, vec![])
    }

    /// Encode this message as a single newline-terminated line, the unit
    /// [`crate::connection::Connection::send`] writes in one `write_all`.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let msg = Message::call("greet", vec!["world".into()], serde_json::Map::new());
        let encoded = msg.encode().unwrap();
        assert_eq!(encoded.last(), Some(&b'\n'));
        let decoded: Message = serde_json::from_slice(&encoded[..encoded.len() - 1]).unwrap();
        assert_eq!(decoded.cmd, Command::Call);
        assert_eq!(decoded.payload[0], Value::String("greet".into()));
    }

    #[test]
    fn unknown_command_round_trips_as_other() {
        let raw = br#"{"cmd":"XXXX","payload":[]}"#;
        let decoded: Message = serde_json::from_slice(raw).unwrap();
        assert_eq!(decoded.cmd, Command::Other("XXXX".into()));
        assert_eq!(decoded.cmd.to_string(), "XXXX");
    }

    #[test]
    fn missing_payload_defaults_to_empty() {
        let raw = br#"{"cmd":"QUIT"}"#;
        let decoded: Message = serde_json::from_slice(raw).unwrap();
        assert!(decoded.payload.is_empty());
    }
}
