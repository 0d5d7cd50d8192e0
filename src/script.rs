//! 脚本运行时接缝：参数值、JSON 编解码与回调宿主。
//!
//! 远程调用与注册命令都不直接接触脚本虚拟机，只通过这里的 trait 把参数列表交给宿主。

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::commands::RegisteredCommands;
use crate::remote::CallScope;

/// 元素在 JSON 里的编码前缀（`"^E^<id>"`）。
const ELEMENT_PREFIX: &str = "^E^";

/// 脚本会话句柄，用于归属判断和会话销毁时的批量清理。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// 脚本函数引用（回调或命令处理器）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionRef(pub i32);

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    /// 原样保留的字节串（fetch 响应体），不要求是合法 UTF-8。
    Bytes(Vec<u8>),
    Element(u32),
    List(Vec<ArgValue>),
    Map(BTreeMap<String, ArgValue>),
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::String(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::String(s)
    }
}

impl From<Vec<u8>> for ArgValue {
    fn from(bytes: Vec<u8>) -> Self {
        ArgValue::Bytes(bytes)
    }
}

impl From<&[u8]> for ArgValue {
    fn from(bytes: &[u8]) -> Self {
        ArgValue::Bytes(bytes.to_vec())
    }
}

impl From<f64> for ArgValue {
    fn from(n: f64) -> Self {
        ArgValue::Number(n)
    }
}

impl From<i32> for ArgValue {
    fn from(n: i32) -> Self {
        ArgValue::Number(f64::from(n))
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Bool(b)
    }
}

impl ArgValue {
    /// 字符串与字节串的原始字节，其余类型为 None。
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ArgValue::String(s) => Some(s.as_bytes()),
            ArgValue::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    /// JSON 无法承载任意字节，字节串按 UTF-8 有损转换。
    pub fn to_json(&self) -> Value {
        match self {
            ArgValue::Nil => Value::Null,
            ArgValue::Bool(b) => Value::Bool(*b),
            ArgValue::Number(n) => number_to_json(*n),
            ArgValue::String(s) => Value::String(s.clone()),
            ArgValue::Bytes(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
            ArgValue::Element(id) => Value::String(format!("{ELEMENT_PREFIX}{id}")),
            ArgValue::List(items) => Value::Array(items.iter().map(ArgValue::to_json).collect()),
            ArgValue::Map(map) => {
                let mut out = Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), v.to_json());
                }
                Value::Object(out)
            }
        }
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => ArgValue::Nil,
            Value::Bool(b) => ArgValue::Bool(*b),
            Value::Number(n) => ArgValue::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => match s
                .strip_prefix(ELEMENT_PREFIX)
                .and_then(|id| id.parse::<u32>().ok())
            {
                Some(id) => ArgValue::Element(id),
                None => ArgValue::String(s.clone()),
            },
            Value::Array(items) => ArgValue::List(items.iter().map(ArgValue::from_json).collect()),
            Value::Object(map) => ArgValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), ArgValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

// 整数值写成 JSON 整数，避免服务端看到 `42.0`。
fn number_to_json(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a json array, got {0}")]
    NotAnArray(&'static str),
}

pub fn encode_arguments_json(args: &[ArgValue]) -> String {
    Value::Array(args.iter().map(ArgValue::to_json).collect()).to_string()
}

pub fn decode_arguments_json(raw: &str) -> Result<Vec<ArgValue>, DecodeError> {
    let value: Value = serde_json::from_str(raw.trim())?;
    match value {
        Value::Array(items) => Ok(items.iter().map(ArgValue::from_json).collect()),
        Value::Null => Err(DecodeError::NotAnArray("null")),
        Value::Bool(_) => Err(DecodeError::NotAnArray("bool")),
        Value::Number(_) => Err(DecodeError::NotAnArray("number")),
        Value::String(_) => Err(DecodeError::NotAnArray("string")),
        Value::Object(_) => Err(DecodeError::NotAnArray("object")),
    }
}

/// 远程调用结果的接收方。
///
/// 回调期间拿到 `CallScope`，可以提交后续调用、中止其他调用或清理会话；
/// 同一批次里尚未交付的完成通知仍会逐个做存在性检查。
pub trait ScriptHost {
    fn call_function(
        &mut self,
        scope: &mut CallScope<'_>,
        session: SessionId,
        function: FunctionRef,
        args: Vec<ArgValue>,
    );
}

/// 命令处理器的调用方。
///
/// 处理器拿到注册表的可变引用，可以在分发途中注销（包括注销自己）或新增命令。
pub trait CommandHost {
    fn call_command_handler(
        &mut self,
        commands: &mut RegisteredCommands,
        session: SessionId,
        handler: FunctionRef,
        args: Vec<ArgValue>,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_survive_the_wire() {
        let args = vec![
            ArgValue::from("hello"),
            ArgValue::from(42),
            ArgValue::from(1.5),
            ArgValue::from(true),
            ArgValue::Element(17),
        ];
        let wire = encode_arguments_json(&args);
        assert_eq!(wire, r#"["hello",42,1.5,true,"^E^17"]"#);
        assert_eq!(decode_arguments_json(&wire).unwrap(), args);
    }

    #[test]
    fn nested_values_decode_to_lists_and_maps() {
        let decoded = decode_arguments_json(r#"[[1,2],{"a":null}]"#).unwrap();
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), ArgValue::Nil);
        assert_eq!(
            decoded,
            vec![
                ArgValue::List(vec![ArgValue::from(1), ArgValue::from(2)]),
                ArgValue::Map(map),
            ]
        );
    }

    #[test]
    fn non_array_payload_is_rejected() {
        assert!(matches!(
            decode_arguments_json(r#"{"x":1}"#),
            Err(DecodeError::NotAnArray("object"))
        ));
        assert!(matches!(
            decode_arguments_json("<html>"),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn bytes_keep_raw_content_and_degrade_on_the_wire() {
        let raw = vec![0x89, b'P', b'N', b'G', 0xFF];
        let value = ArgValue::from(raw.clone());
        assert_eq!(value.as_bytes(), Some(raw.as_slice()));
        assert_eq!(ArgValue::from("ok").as_bytes(), Some(&b"ok"[..]));
        assert_eq!(ArgValue::from(1).as_bytes(), None);
        assert_eq!(
            encode_arguments_json(&[ArgValue::from(&b"plain"[..])]),
            r#"["plain"]"#
        );
    }

    #[test]
    fn empty_argument_list_encodes_as_empty_array() {
        assert_eq!(encode_arguments_json(&[]), "[]");
        assert!(decode_arguments_json("[]").unwrap().is_empty());
    }
}
