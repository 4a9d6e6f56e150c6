//! STOMP 1.2 frame encoding and parsing

use std::fmt;

use crate::{FeedError, Result};

/// Frame terminator
const NUL: char = '\0';

/// STOMP frame commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // Client frames
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,

    // Server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    fn parse(line: &str) -> Option<Self> {
        let command = match line {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "CONNECTED" => Command::Connected,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            _ => return None,
        };
        Some(command)
    }

    /// CONNECT and CONNECTED headers are never escaped, for 1.0 compatibility.
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol version agreed in the CONNECTED frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Version {
    V1_0,
    V1_1,
    #[default]
    V1_2,
}

impl Version {
    /// Version named by a CONNECTED `version` header.
    ///
    /// A broker that omits the header speaks 1.0.
    pub fn negotiated(header: Option<&str>) -> Self {
        match header.map(str::trim) {
            Some("1.2") => Version::V1_2,
            Some("1.1") => Version::V1_1,
            _ => Version::V1_0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Version::V1_0 => "1.0",
            Version::V1_1 => "1.1",
            Version::V1_2 => "1.2",
        }
    }

    /// 1.0 has no header escapes; a backslash in a header value is literal.
    fn escapes_headers(self) -> bool {
        self != Version::V1_0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    /// Create a frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: String::new() }
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of the first header named `name`.
    ///
    /// Repeated headers are legal; only the first occurrence is significant.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    /// All headers in wire order
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Serialize to wire format, including the NUL terminator.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(32 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                push_escaped(&mut out, name);
                out.push(':');
                push_escaped(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push(NUL);
        out
    }
}

fn push_escaped(out: &mut String, raw: &str) {
    for ch in raw.chars() {
        match ch {
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
}

fn unescape(raw: &str) -> Result<String> {
    if !raw.contains('\\') {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                return Err(FeedError::protocol(format!("undefined header escape '\\{other}'")));
            }
            None => return Err(FeedError::protocol("dangling '\\' in header")),
        }
    }
    Ok(out)
}

/// Split off one line, accepting both LF and CRLF endings.
fn take_line(input: &str) -> Option<(&str, &str)> {
    let (line, rest) = input.split_once('\n')?;
    Some((line.strip_suffix('\r').unwrap_or(line), rest))
}

/// Parse every frame in a WebSocket message, assuming STOMP 1.2.
///
/// Heart-beat EOLs between frames are skipped, so a message consisting only
/// of EOLs yields no frames.
pub fn parse_frames(input: &str) -> Result<Vec<Frame>> {
    parse_frames_as(input, Version::V1_2)
}

/// Parse every frame in a WebSocket message sent under `version`.
pub fn parse_frames_as(input: &str, version: Version) -> Result<Vec<Frame>> {
    let mut frames = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start_matches(['\r', '\n']);
        if rest.is_empty() {
            return Ok(frames);
        }
        let (frame, remaining) = parse_one(rest, version)?;
        frames.push(frame);
        rest = remaining;
    }
}

fn parse_one(input: &str, version: Version) -> Result<(Frame, &str)> {
    let (command_line, mut rest) =
        take_line(input).ok_or_else(|| FeedError::protocol("frame has no command line"))?;
    let command = Command::parse(command_line)
        .ok_or_else(|| FeedError::protocol(format!("unknown command '{command_line}'")))?;

    let mut frame = Frame::new(command);
    loop {
        let (line, remaining) =
            take_line(rest).ok_or_else(|| FeedError::protocol("unterminated header block"))?;
        rest = remaining;
        if line.is_empty() {
            break;
        }

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FeedError::protocol(format!("header without ':' in {command}")))?;
        let (name, value) = if command.escapes_headers() && version.escapes_headers() {
            (unescape(name)?, unescape(value)?)
        } else {
            (name.to_string(), value.to_string())
        };
        frame.headers.push((name, value));
    }

    let body_len = match frame.get("content-length") {
        Some(length) => length
            .trim()
            .parse::<usize>()
            .map_err(|_| FeedError::protocol(format!("invalid content-length '{length}'")))?,
        None => rest.find(NUL).ok_or_else(|| FeedError::protocol("frame is not NUL-terminated"))?,
    };

    let body = rest
        .get(..body_len)
        .ok_or_else(|| FeedError::protocol("content-length exceeds frame"))?;
    let remaining = rest[body_len..]
        .strip_prefix(NUL)
        .ok_or_else(|| FeedError::protocol("frame body is not followed by NUL"))?;

    frame.body = body.to_string();
    Ok((frame, remaining))
}
