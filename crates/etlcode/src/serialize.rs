//! # Callable Serializer
//!
//! Turns a [`Callable`] into portable bytes and back.
//!
//! ## Wire form
//!
//! ```text
//! Variant("callable") {
//!     Map {
//!         "version":  U32,
//!         "shape":    Str,
//!         "func":     Str,
//!         "captured": Map { key: Value, ... },
//!     }
//! }
//! ```
//!
//! Unknown map fields are skipped so newer clients can add metadata without
//! breaking older sandboxes. The version field is not negotiable.

use etlpack::Decoder;
use etlpack::Encoder;
use etlpack::Value;

use crate::callable::Callable;
use crate::callable::Capture;
use crate::callable::Shape;
use crate::catalog::Catalog;
use crate::error::ReconstructionError;
use crate::error::SerializationError;

/// Version written into every serialized callable.
pub const SERIALIZER_VERSION: u32 = 1;

const CALLABLE: &str = "callable";

/// Serializes `callable` after checking that `catalog` can rebuild it.
pub fn serialize(callable: &Callable, catalog: &Catalog) -> Result<Vec<u8>, SerializationError> {
    catalog.validate(callable)?;

    let mut enc = Encoder::new();
    enc.variant_begin(CALLABLE)?;
    enc.map_begin()?;

    enc.variant_begin("version")?;
    enc.u32(SERIALIZER_VERSION)?;
    enc.variant_end()?;

    enc.variant_begin("shape")?;
    enc.str(callable.shape().name())?;
    enc.variant_end()?;

    enc.variant_begin("func")?;
    enc.str(callable.func())?;
    enc.variant_end()?;

    enc.variant_begin("captured")?;
    etlpack::encode_value(&mut enc, &Value::from(callable.captured().clone()))?;
    enc.variant_end()?;

    enc.map_end()?;
    enc.variant_end()?;
    Ok(enc.into_bytes()?)
}

/// Decodes bytes produced by [`serialize`].
///
/// This only restores the description; use [`Catalog::reconstruct`] to bind it.
pub fn deserialize(bytes: &[u8]) -> Result<Callable, ReconstructionError> {
    let mut dec = Decoder::new(bytes);
    let (name, mut body) = dec.variant()?;
    if name != CALLABLE {
        return Err(ReconstructionError::NotACallable(name.to_string()));
    }
    dec.finish()?;

    let mut map = body.map()?;
    let mut version = None;
    let mut shape = None;
    let mut func = None;
    let mut captured = None;

    while let Some((key, mut val)) = map.next()? {
        match key {
            "version" => version = Some(val.u32()?),
            "shape" => shape = Some(val.str()?),
            "func" => func = Some(val.str()?),
            "captured" => captured = Some(etlpack::decode_value(&mut val)?),
            _ => val.skip()?,
        }
    }
    body.finish()?;

    let version = version.ok_or(ReconstructionError::MissingField("version"))?;
    if version != SERIALIZER_VERSION {
        return Err(ReconstructionError::VersionMismatch { expected: SERIALIZER_VERSION, found: version });
    }

    let shape_name = shape.ok_or(ReconstructionError::MissingField("shape"))?;
    let shape = Shape::from_name(shape_name)
        .ok_or_else(|| ReconstructionError::UnknownShape(shape_name.to_string()))?;
    let func = func.ok_or(ReconstructionError::MissingField("func"))?;

    let captured = match captured.ok_or(ReconstructionError::MissingField("captured"))? {
        Value::Map(entries) => Capture::from(entries),
        _ => return Err(ReconstructionError::MissingField("captured")),
    };

    Ok(Callable::new(shape, func, captured))
}
