//! # Init Message
//!
//! The message that asks the cluster to start a transform job. It carries the
//! rendered script and how the sandbox should be fed.
//!
//! ```json
//! { "action": "start", "value": { "name": "upper", "code": "# etl-script v1\n...", ... } }
//! ```

use serde::Deserialize;
use serde::Serialize;

use crate::callable::Mode;
use crate::consts::Action;
use crate::consts::ArgType;
use crate::consts::Communication;
use crate::consts::DEFAULT_CHUNK_SIZE;
use crate::error::MessageError;
use crate::render::RenderedScript;

const MAX_NAME_LEN: usize = 32;

/// Action envelope around a message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMsg<T> {
    pub action: Action,
    pub value: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitCodeMsg {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub communication: Communication,
    #[serde(default)]
    pub arg_type: ArgType,
    /// `0` hands each object to the sandbox whole.
    #[serde(default)]
    pub chunk_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl InitCodeMsg {
    /// Streaming scripts get [`DEFAULT_CHUNK_SIZE`]; single-shot scripts are unchunked.
    pub fn new(name: impl Into<String>, script: &RenderedScript) -> Self {
        let chunk_size = match script.mode() {
            Mode::SingleShot => 0,
            Mode::Streaming => DEFAULT_CHUNK_SIZE,
        };
        Self {
            name: name.into(),
            code: script.as_str().to_string(),
            communication: Communication::default(),
            arg_type: ArgType::default(),
            chunk_size,
            timeout_secs: None,
        }
    }

    pub fn communication(mut self, communication: Communication) -> Self {
        self.communication = communication;
        self
    }

    pub fn arg_type(mut self, arg_type: ArgType) -> Self {
        self.arg_type = arg_type;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn validate(&self) -> Result<(), MessageError> {
        if !valid_name(&self.name) {
            return Err(MessageError::InvalidName(self.name.clone()));
        }
        if self.code.is_empty() {
            return Err(MessageError::EmptyCode);
        }
        if self.communication == Communication::Io && self.arg_type == ArgType::Url {
            return Err(MessageError::Incompatible { communication: self.communication, arg_type: self.arg_type });
        }
        Ok(())
    }

    /// Validates and wraps the message in a `start` action.
    pub fn to_json(&self) -> Result<String, MessageError> {
        self.validate()?;
        let msg = ActionMsg { action: Action::Start, value: self };
        Ok(serde_json::to_string(&msg)?)
    }

    /// Parses a `start` action and validates its body.
    pub fn from_json(json: &str) -> Result<Self, MessageError> {
        let msg: ActionMsg<InitCodeMsg> = serde_json::from_str(json)?;
        if msg.action != Action::Start {
            return Err(MessageError::UnexpectedAction(msg.action));
        }
        msg.value.validate()?;
        Ok(msg.value)
    }
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    name.len() <= MAX_NAME_LEN && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
