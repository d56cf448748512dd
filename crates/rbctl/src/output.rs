use serde::Serialize;

/// A command result that can be printed both as JSON and for a terminal.
pub trait Report: Serialize {
    fn human(&self) -> String;
}

/// Prints command results: one JSON object per line with `--json`, plain
/// text otherwise. Errors go to stderr in both modes.
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Final result of a command
    pub fn report<T: Report>(&self, command: &str, data: &T) {
        if self.json {
            println!("{}", to_json(&Envelope::ok(command, Some(data), None)));
        } else {
            println!("{}", data.human());
        }
    }

    /// Result of a command that only changed something
    pub fn done(&self, command: &str, message: &str) {
        if self.json {
            println!("{}", to_json(&Envelope::<()>::ok(command, None, Some(message))));
        } else {
            println!("{}", message);
        }
    }

    /// One intermediate record of a streaming command (replay steps)
    pub fn record<T: Report>(&self, kind: &str, data: &T) {
        if self.json {
            println!("{}", to_json(&Record { record: kind, data }));
        } else {
            println!("  {}", data.human());
        }
    }

    pub fn error(&self, message: &str) {
        if self.json {
            eprintln!("{}", to_json(&Envelope::<()>::error(message)));
        } else {
            eprintln!("Error: {}", message);
        }
    }
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
}

pub(crate) fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
}

/// `a, b, c`, or `-` when empty.
pub(crate) fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl<'a, T: Serialize> Envelope<'a, T> {
    fn ok(command: &'a str, data: Option<&'a T>, message: Option<&'a str>) -> Self {
        Self {
            ok: true,
            command: Some(command),
            data,
            message,
            error: None,
        }
    }

    fn error(error: &'a str) -> Self {
        Self {
            ok: false,
            command: None,
            data: None,
            message: None,
            error: Some(error),
        }
    }
}

#[derive(Serialize)]
struct Record<'a, T: Serialize> {
    record: &'a str,
    #[serde(flatten)]
    data: &'a T,
}
