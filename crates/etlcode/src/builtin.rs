//! Builtin catalog functions.

use sha2::Digest;
use sha2::Sha256;

use etlpack::Value;

use crate::callable::Capture;
use crate::catalog::Catalog;
use crate::catalog::Finish;
use crate::catalog::Kind;
use crate::catalog::Requirement;
use crate::catalog::StageError;
use crate::catalog::StageResult;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub(crate) fn install(catalog: &mut Catalog) {
    install_transforms(catalog);
    install_streaming(catalog);
}

fn install_transforms(catalog: &mut Catalog) {
    catalog
        .register_transform("identity", vec![], |_, input| Ok(input.to_vec()))
        .register_transform("uppercase", vec![], |_, input| Ok(input.to_ascii_uppercase()))
        .register_transform("lowercase", vec![], |_, input| Ok(input.to_ascii_lowercase()))
        .register_transform("sha256", vec![], |_, input| {
            Ok(format!("{:x}", Sha256::digest(input)).into_bytes())
        })
        .register_transform(
            "xor",
            vec![Requirement::required("key", Kind::Bytes)],
            |cap, input| {
                let key = key(cap)?;
                Ok(xor(input, key, 0))
            },
        )
        .register_transform(
            "prefix",
            vec![Requirement::required("prefix", Kind::Bytes)],
            |cap, input| {
                let prefix = cap.bytes("prefix").unwrap_or_default();
                let mut out = Vec::with_capacity(prefix.len() + input.len());
                out.extend_from_slice(prefix);
                out.extend_from_slice(input);
                Ok(out)
            },
        )
        .register_transform(
            "replace",
            vec![
                Requirement::required("from", Kind::Bytes),
                Requirement::required("to", Kind::Bytes),
            ],
            |cap, input| {
                let from = cap.bytes("from").unwrap_or_default();
                let to = cap.bytes("to").unwrap_or_default();
                if from.is_empty() {
                    return Err(StageError::new("replace: 'from' is empty"));
                }
                Ok(replace(input, from, to))
            },
        );
}

fn install_streaming(catalog: &mut Catalog) {
    catalog
        .register_setup("noop", vec![], |_| Ok(Value::Unit))
        .register_setup(
            "counter",
            vec![Requirement::optional("start", Kind::U64)],
            |cap| Ok(Value::U64(cap.u64("start").unwrap_or(0))),
        )
        .register_setup("fnv1a", vec![], |_| Ok(Value::U64(FNV_OFFSET)));

    catalog
        .register_chunk("identity", vec![], |_, chunk, _| Ok(chunk.to_vec()))
        .register_chunk("uppercase", vec![], |_, chunk, _| Ok(chunk.to_ascii_uppercase()))
        .register_chunk("count_len", vec![], |_, chunk, state| {
            let n = counter(state, "count_len")?;
            *state = Value::U64(n + chunk.len() as u64);
            Ok(chunk.to_vec())
        })
        .register_chunk(
            "xor",
            vec![Requirement::required("key", Kind::Bytes)],
            |cap, chunk, state| {
                let key = key(cap)?;
                let offset = match &*state {
                    Value::Unit => 0,
                    other => counter(other, "xor")?,
                };
                *state = Value::U64(offset + chunk.len() as u64);
                Ok(xor(chunk, key, (offset % key.len() as u64) as usize))
            },
        )
        .register_chunk("fnv1a", vec![], |_, chunk, state| {
            let mut hash = counter(state, "fnv1a")?;
            for b in chunk {
                hash ^= *b as u64;
                hash = hash.wrapping_mul(FNV_PRIME);
            }
            *state = Value::U64(hash);
            Ok(chunk.to_vec())
        });

    catalog
        .register_teardown("noop", vec![], |_, state| Ok(Finish { tail: Vec::new(), state }))
        .register_teardown("emit_state", vec![], |_, state| {
            Ok(Finish { tail: state.to_string().into_bytes(), state })
        })
        .register_teardown("emit_hex", vec![], |_, state| {
            let v = counter(&state, "emit_hex")?;
            Ok(Finish { tail: format!("{:016x}", v).into_bytes(), state })
        });
}

fn key(cap: &Capture) -> StageResult<&[u8]> {
    match cap.bytes("key") {
        Some(k) if !k.is_empty() => Ok(k),
        _ => Err(StageError::new("xor: 'key' is empty")),
    }
}

fn counter(state: &Value, stage: &str) -> StageResult<u64> {
    state
        .as_u64()
        .ok_or_else(|| StageError::new(format!("{}: expected u64 state, found {}", stage, state.kind())))
}

fn xor(input: &[u8], key: &[u8], offset: usize) -> Vec<u8> {
    input
        .iter()
        .zip(key.iter().cycle().skip(offset))
        .map(|(a, b)| a ^ b)
        .collect()
}

fn replace(input: &[u8], from: &[u8], to: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i..].starts_with(from) {
            out.extend_from_slice(to);
            i += from.len();
        } else {
            out.push(input[i]);
            i += 1;
        }
    }
    out
}
