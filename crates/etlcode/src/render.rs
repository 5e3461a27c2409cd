//! # Template Renderer
//!
//! Produces the script the sandbox runs from a [`TransformSpec`].
//!
//! ## Pipeline
//!
//! For each slot of the mode's skeleton, in order: check the callable's shape,
//! serialize it against the catalog, encode it as text, fill the slot. The first
//! failure aborts rendering and nothing partial is returned.

use std::fmt;
use std::sync::Arc;
use std::sync::OnceLock;

use crate::callable::Callable;
use crate::callable::Mode;
use crate::callable::TransformSpec;
use crate::catalog::Catalog;
use crate::error::EncodingError;
use crate::error::RenderError;
use crate::error::SerializationError;
use crate::error::TemplateError;
use crate::serialize;
use crate::template::Skeleton;
use crate::text;

/// A serialized callable in its text-safe form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedCallable(String);

impl EncodedCallable {
    /// Serializes and encodes `callable`.
    pub fn encode(callable: &Callable, catalog: &Catalog) -> Result<Self, SerializationError> {
        let bytes = serialize::serialize(callable, catalog)?;
        Ok(Self(text::encode(&bytes)))
    }

    /// Wraps text that claims to be an encoded callable.
    pub fn from_text(text: impl Into<String>) -> Result<Self, EncodingError> {
        let text = text.into();
        if let Some((offset, byte)) = text.bytes().enumerate().find(|(_, b)| !text::is_text_safe_byte(*b)) {
            return Err(EncodingError::InvalidSymbol { offset, byte });
        }
        Ok(Self(text))
    }

    pub(crate) fn from_raw(text: &str) -> Self {
        Self(text.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes back to the serialized callable bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        text::decode(&self.0)
    }
}

/// A complete script, ready to ship inside an init message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderedScript {
    mode: Mode,
    text: Arc<str>,
}

impl RenderedScript {
    pub(crate) fn new(mode: Mode, text: String) -> Self {
        Self { mode, text: Arc::from(text) }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl AsRef<str> for RenderedScript {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for RenderedScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Renders specs against a particular catalog.
#[derive(Debug, Clone, Copy)]
pub struct Renderer<'c> {
    catalog: &'c Catalog,
}

impl<'c> Renderer<'c> {
    pub fn new(catalog: &'c Catalog) -> Self {
        Self { catalog }
    }

    pub fn render(&self, spec: &TransformSpec) -> Result<RenderedScript, RenderError> {
        let skeleton = Skeleton::for_mode(spec.mode())?;
        let mut builder = skeleton.builder();

        for (&(slot, expected), callable) in skeleton.slots().iter().zip(spec.callables()) {
            if callable.shape() != expected {
                return Err(TemplateError::WrongShape {
                    slot: slot.name(),
                    expected,
                    found: callable.shape(),
                }
                .into());
            }
            let encoded = EncodedCallable::encode(callable, self.catalog)?;
            builder.fill(slot, callable.shape(), encoded)?;
        }

        let script = builder.finish()?;
        tracing::debug!(mode = %script.mode(), bytes = script.len(), "rendered script");
        Ok(script)
    }
}

/// Renders `spec` against the builtin catalog.
pub fn render(spec: &TransformSpec) -> Result<RenderedScript, RenderError> {
    static BUILTIN: OnceLock<Catalog> = OnceLock::new();
    Renderer::new(BUILTIN.get_or_init(Catalog::builtin)).render(spec)
}
