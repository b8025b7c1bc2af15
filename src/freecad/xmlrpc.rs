//! XML-RPC codec over `serde_json::Value`.
//!
//! Values map as follows:
//!
//! | JSON | XML-RPC |
//! |------|---------|
//! | `null` | `<nil/>` |
//! | bool | `<boolean>` |
//! | integer in i32 range | `<int>` |
//! | other integer | `<i8>` |
//! | float | `<double>` |
//! | string | `<string>` |
//! | array | `<array>` |
//! | object | `<struct>` |
//!
//! On the way back `<base64>` and `<dateTime.iso8601>` decode to strings,
//! and a `<value>` without a type element is a string.

use std::iter::Peekable;
use std::vec::IntoIter;

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Number, Value};

use crate::freecad::XmlRpcError;

/// Encodes a `methodCall` document.
#[must_use]
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?><methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        encode_value(param, &mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

/// Encodes a successful `methodResponse` document.
#[must_use]
pub fn encode_response(value: &Value) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?><methodResponse><params><param>");
    encode_value(value, &mut out);
    out.push_str("</param></params></methodResponse>");
    out
}

/// Encodes a `fault` `methodResponse` document.
#[must_use]
pub fn encode_fault(code: i64, message: &str) -> String {
    let fault = serde_json::json!({ "faultCode": code, "faultString": message });
    let mut out = String::from("<?xml version=\"1.0\"?><methodResponse><fault>");
    encode_value(&fault, &mut out);
    out.push_str("</fault></methodResponse>");
    out
}

fn encode_value(value: &Value, out: &mut String) {
    out.push_str("<value>");
    match value {
        Value::Null => out.push_str("<nil/>"),
        Value::Bool(b) => {
            out.push_str("<boolean>");
            out.push_str(if *b { "1" } else { "0" });
            out.push_str("</boolean>");
        }
        Value::Number(n) => encode_number(n, out),
        Value::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</string>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(item, out);
            }
            out.push_str("</data></array>");
        }
        Value::Object(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                encode_value(member, out);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

fn encode_number(n: &Number, out: &mut String) {
    if let Some(i) = n.as_i64() {
        let tag = if i32::try_from(i).is_ok() { "int" } else { "i8" };
        out.push_str(&format!("<{tag}>{i}</{tag}>"));
    } else if let Some(f) = n.as_f64() {
        out.push_str(&format!("<double>{f}</double>"));
    }
}

/// Decodes a `methodResponse` document into its single return value.
///
/// # Errors
///
/// Returns [`XmlRpcError::Fault`] for fault responses and
/// [`XmlRpcError::Malformed`] for anything that is not a valid response.
pub fn decode_response(xml: &str) -> Result<Value, XmlRpcError> {
    let mut cursor = Cursor::new(tokenize(xml)?);
    cursor.expect_start("methodResponse")?;

    let outcome = match cursor.next_structural()? {
        Token::Start(tag) if tag == "params" => {
            let value = if cursor.at_end("params") {
                Value::Null
            } else {
                cursor.expect_start("param")?;
                let value = cursor.parse_value()?;
                cursor.expect_end("param")?;
                value
            };
            cursor.expect_end("params")?;
            Ok(value)
        }
        Token::Start(tag) if tag == "fault" => {
            let fault = cursor.parse_value()?;
            cursor.expect_end("fault")?;
            Err(XmlRpcError::Fault {
                code: fault
                    .get("faultCode")
                    .and_then(Value::as_i64)
                    .unwrap_or_default(),
                message: fault
                    .get("faultString")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
        }
        other => return Err(unexpected("<params> or <fault>", &other)),
    };

    cursor.expect_end("methodResponse")?;
    outcome
}

/// Decodes a `methodCall` document into the method name and its parameters.
///
/// # Errors
///
/// Returns [`XmlRpcError::Malformed`] if the document is not a valid call.
pub fn decode_call(xml: &str) -> Result<(String, Vec<Value>), XmlRpcError> {
    let mut cursor = Cursor::new(tokenize(xml)?);
    cursor.expect_start("methodCall")?;
    cursor.expect_start("methodName")?;
    let method = cursor.take_text().trim().to_string();
    cursor.expect_end("methodName")?;

    let mut params = Vec::new();
    match cursor.next_structural()? {
        Token::Empty(tag) if tag == "params" => {}
        Token::Start(tag) if tag == "params" => {
            while !cursor.at_end("params") {
                cursor.expect_start("param")?;
                params.push(cursor.parse_value()?);
                cursor.expect_end("param")?;
            }
            cursor.expect_end("params")?;
        }
        Token::End(tag) if tag == "methodCall" => return Ok((method, params)),
        other => return Err(unexpected("<params>", &other)),
    }

    cursor.expect_end("methodCall")?;
    Ok((method, params))
}

/// Flattened XML events, with text and CDATA already unescaped and merged.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Start(String),
    End(String),
    Empty(String),
    Text(String),
}

fn tokenize(xml: &str) -> Result<Vec<Token>, XmlRpcError> {
    let mut reader = Reader::from_str(xml);
    let mut tokens = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlRpcError::malformed(e.to_string()))?;
        match event {
            Event::Start(e) => tokens.push(Token::Start(tag_name(e.name().as_ref())?)),
            Event::End(e) => tokens.push(Token::End(tag_name(e.name().as_ref())?)),
            Event::Empty(e) => tokens.push(Token::Empty(tag_name(e.name().as_ref())?)),
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|e| XmlRpcError::malformed(e.to_string()))?;
                push_text(&mut tokens, &text);
            }
            Event::CData(e) => {
                let bytes = e.into_inner();
                let text = std::str::from_utf8(&bytes)
                    .map_err(|e| XmlRpcError::malformed(e.to_string()))?;
                push_text(&mut tokens, text);
            }
            Event::Eof => break,
            // declarations, comments, processing instructions, doctype
            _ => {}
        }
    }

    Ok(tokens)
}

fn tag_name(raw: &[u8]) -> Result<String, XmlRpcError> {
    std::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|e| XmlRpcError::malformed(e.to_string()))
}

fn push_text(tokens: &mut Vec<Token>, text: &str) {
    if let Some(Token::Text(previous)) = tokens.last_mut() {
        previous.push_str(text);
    } else {
        tokens.push(Token::Text(text.to_string()));
    }
}

fn unexpected(expected: &str, found: &Token) -> XmlRpcError {
    let found = match found {
        Token::Start(tag) => format!("<{tag}>"),
        Token::End(tag) => format!("</{tag}>"),
        Token::Empty(tag) => format!("<{tag}/>"),
        Token::Text(text) => format!("text {text:?}"),
    };
    XmlRpcError::malformed(format!("expected {expected}, found {found}"))
}

struct Cursor {
    tokens: Peekable<IntoIter<Token>>,
}

impl Cursor {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into_iter().peekable(),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.tokens.peek(), Some(Token::Text(t)) if t.trim().is_empty()) {
            self.tokens.next();
        }
    }

    fn next_structural(&mut self) -> Result<Token, XmlRpcError> {
        self.skip_whitespace();
        self.tokens
            .next()
            .ok_or_else(|| XmlRpcError::malformed("unexpected end of document"))
    }

    fn at_end(&mut self, tag: &str) -> bool {
        self.skip_whitespace();
        matches!(self.tokens.peek(), Some(Token::End(t)) if t == tag)
    }

    /// Consumes text up to the next element boundary, verbatim.
    fn take_text(&mut self) -> String {
        let mut text = String::new();
        while let Some(Token::Text(t)) = self.tokens.peek() {
            text.push_str(t);
            self.tokens.next();
        }
        text
    }

    fn expect_start(&mut self, tag: &str) -> Result<(), XmlRpcError> {
        match self.next_structural()? {
            Token::Start(t) if t == tag => Ok(()),
            other => Err(unexpected(&format!("<{tag}>"), &other)),
        }
    }

    fn expect_end(&mut self, tag: &str) -> Result<(), XmlRpcError> {
        match self.next_structural()? {
            Token::End(t) if t == tag => Ok(()),
            other => Err(unexpected(&format!("</{tag}>"), &other)),
        }
    }

    fn parse_value(&mut self) -> Result<Value, XmlRpcError> {
        match self.next_structural()? {
            Token::Empty(tag) if tag == "value" => return Ok(Value::String(String::new())),
            Token::Start(tag) if tag == "value" => {}
            other => return Err(unexpected("<value>", &other)),
        }

        let text = self.take_text();
        let value = match self
            .tokens
            .next()
            .ok_or_else(|| XmlRpcError::malformed("unexpected end of document"))?
        {
            Token::End(tag) if tag == "value" => return Ok(Value::String(text)),
            Token::Start(tag) => self.parse_typed(&tag)?,
            Token::Empty(tag) => empty_typed(&tag)?,
            other => return Err(unexpected("a typed value", &other)),
        };

        self.expect_end("value")?;
        Ok(value)
    }

    fn parse_typed(&mut self, tag: &str) -> Result<Value, XmlRpcError> {
        match tag {
            "array" => self.parse_array(),
            "struct" => self.parse_struct(),
            "nil" => {
                self.expect_end(tag)?;
                Ok(Value::Null)
            }
            _ => {
                let text = self.take_text();
                self.expect_end(tag)?;
                scalar(tag, text)
            }
        }
    }

    fn parse_array(&mut self) -> Result<Value, XmlRpcError> {
        let mut items = Vec::new();
        match self.next_structural()? {
            Token::Empty(tag) if tag == "data" => {}
            Token::Start(tag) if tag == "data" => {
                while !self.at_end("data") {
                    items.push(self.parse_value()?);
                }
                self.expect_end("data")?;
            }
            other => return Err(unexpected("<data>", &other)),
        }
        self.expect_end("array")?;
        Ok(Value::Array(items))
    }

    fn parse_struct(&mut self) -> Result<Value, XmlRpcError> {
        let mut members = Map::new();
        while !self.at_end("struct") {
            self.expect_start("member")?;
            self.expect_start("name")?;
            let name = self.take_text();
            self.expect_end("name")?;
            let value = self.parse_value()?;
            self.expect_end("member")?;
            members.insert(name, value);
        }
        self.expect_end("struct")?;
        Ok(Value::Object(members))
    }
}

fn scalar(tag: &str, text: String) -> Result<Value, XmlRpcError> {
    match tag {
        "string" => Ok(Value::String(text)),
        "int" | "i4" | "i8" => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| XmlRpcError::malformed(format!("invalid integer {text:?}"))),
        "boolean" => match text.trim() {
            "1" | "true" => Ok(Value::Bool(true)),
            "0" | "false" => Ok(Value::Bool(false)),
            other => Err(XmlRpcError::malformed(format!("invalid boolean {other:?}"))),
        },
        "double" => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| XmlRpcError::malformed(format!("invalid double {text:?}"))),
        "base64" => Ok(Value::String(
            text.chars().filter(|c| !c.is_whitespace()).collect(),
        )),
        "dateTime.iso8601" => Ok(Value::String(text.trim().to_string())),
        other => Err(XmlRpcError::malformed(format!(
            "unsupported value type <{other}>"
        ))),
    }
}

fn empty_typed(tag: &str) -> Result<Value, XmlRpcError> {
    match tag {
        "nil" => Ok(Value::Null),
        "string" | "base64" => Ok(Value::String(String::new())),
        "array" => Ok(Value::Array(Vec::new())),
        "struct" => Ok(Value::Object(Map::new())),
        other => Err(XmlRpcError::malformed(format!("empty <{other}/> value"))),
    }
}
