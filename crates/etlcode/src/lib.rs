//! # Etlcode
//!
//! Packages a user transform into a self-contained script a remote sandbox can
//! run without any shared code beyond the [`Catalog`].
//!
//! ## Architecture
//!
//! ```text
//! TransformSpec ─serialize─▶ bytes ─encode─▶ text ─fill─▶ RenderedScript ─▶ InitCodeMsg
//! ```
//!
//! - **Callables**: A catalog id plus explicitly declared captured [`Value`]s.
//! - **Serializer**: Writes callables as etlpack variants with a version field.
//! - **Encoder**: Standard base64, safe inside a quoted script literal.
//! - **Renderer**: Fills the mode's skeleton and appends an integrity line.
//!
//! The sandbox side (parsing, reconstructing, serving) lives in `etlrun`.
//!
//! [`Value`]: etlpack::Value

mod builtin;
pub mod callable;
pub mod catalog;
pub mod consts;
pub mod error;
pub mod message;
pub mod render;
pub mod serialize;
pub mod template;
pub mod text;


pub use callable::Callable;
pub use callable::Capture;
pub use callable::Mode;
pub use callable::Shape;
pub use callable::TransformSpec;
pub use catalog::Catalog;
pub use catalog::Finish;
pub use catalog::Kind;
pub use catalog::Requirement;
pub use catalog::Stage;
pub use catalog::StageError;
pub use catalog::StageResult;
pub use consts::Action;
pub use consts::ArgType;
pub use consts::Communication;
pub use consts::DEFAULT_CHUNK_SIZE;
pub use error::CatalogError;
pub use error::EncodingError;
pub use error::MessageError;
pub use error::ReconstructionError;
pub use error::RenderError;
pub use error::ScriptError;
pub use error::SerializationError;
pub use error::TemplateError;
pub use message::InitCodeMsg;
pub use render::EncodedCallable;
pub use render::RenderedScript;
pub use render::Renderer;
pub use render::render;
pub use serialize::SERIALIZER_VERSION;
pub use serialize::deserialize;
pub use serialize::serialize;
pub use template::ParsedScript;
pub use template::Skeleton;
pub use template::Slot;

pub use etlpack::Value;
