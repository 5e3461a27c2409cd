use crate::*;
use std::collections::BTreeMap;

// ============================================================================
//  ENCODER / DECODER
// ============================================================================

#[test]
fn test_scalars_roundtrip() -> Result<()> {
    let mut enc = Encoder::new();
    enc.bool(true)?;
    enc.u32(u32::MAX)?;
    enc.u64(7)?;
    enc.s64(i64::MIN)?;
    enc.f64(0.5)?;
    enc.unit()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);

    assert!(dec.bool()?);
    assert_eq!(dec.u32()?, u32::MAX);
    assert_eq!(dec.u64()?, 7);
    assert_eq!(dec.s64()?, i64::MIN);
    assert_eq!(dec.f64()?, 0.5);
    dec.unit()?;
    dec.finish()
}

#[test]
fn test_map_of_variants() -> Result<()> {
    let mut enc = Encoder::new();
    enc.map_begin()?;
    enc.variant_begin("func")?;
    enc.str("uppercase")?;
    enc.variant_end()?;
    enc.variant_begin("key")?;
    enc.bytes(b"\x00\xff")?;
    enc.variant_end()?;
    enc.map_end()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    let mut map = dec.map()?;

    let (k, mut v) = map.next()?.unwrap();
    assert_eq!(k, "func");
    assert_eq!(v.str()?, "uppercase");
    let (k, mut v) = map.next()?.unwrap();
    assert_eq!(k, "key");
    assert_eq!(v.bytes()?, b"\x00\xff");
    assert!(map.next()?.is_none());
    Ok(())
}

#[test]
fn test_skip_unknown_entries() -> Result<()> {
    let mut enc = Encoder::new();
    enc.list_begin()?;
    enc.str("skipped")?;
    enc.list_begin()?;
    enc.u64(1)?;
    enc.list_end()?;
    enc.u64(42)?;
    enc.list_end()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    let mut list = dec.list()?;
    list.next()?.unwrap().skip()?;
    list.next()?.unwrap().skip()?;
    assert_eq!(list.next()?.unwrap().u64()?, 42);
    assert!(list.next()?.is_none());
    Ok(())
}

// ============================================================================
//  STRUCTURAL FAILURE MODES
// ============================================================================

#[test]
fn test_variant_requires_payload() {
    let mut enc = Encoder::new();
    enc.variant_begin("V").unwrap();
    assert_eq!(enc.variant_end(), Err(Error::EmptyVariant));
}

#[test]
fn test_variant_rejects_second_payload() {
    let mut enc = Encoder::new();
    enc.variant_begin("V").unwrap();
    enc.u64(1).unwrap();
    assert_eq!(enc.u64(2), Err(Error::TooManyItems(Scope::Variant)));
}

#[test]
fn test_map_rejects_bare_scalar() {
    let mut enc = Encoder::new();
    enc.map_begin().unwrap();
    assert_eq!(enc.u64(10), Err(Error::InvalidMapEntry));
}

#[test]
fn test_scope_mismatch_and_underflow() {
    let mut enc = Encoder::new();
    assert_eq!(enc.list_end(), Err(Error::ScopeUnderflow));
    enc.list_begin().unwrap();
    assert_eq!(
        enc.map_end(),
        Err(Error::ScopeMismatch { expected: Scope::Map, actual: Scope::List })
    );
    assert!(matches!(enc.into_bytes(), Err(Error::ScopeStillOpen)));
}

#[test]
fn test_truncated_blob() {
    let mut enc = Encoder::new();
    enc.str("hello").unwrap();
    let bytes = enc.into_bytes().unwrap();

    let mut dec = Decoder::new(&bytes[..bytes.len() - 2]);
    assert_eq!(dec.str(), Err(Error::UnexpectedEnd));
}

#[test]
fn test_invalid_tag_and_utf8() {
    let mut dec = Decoder::new(&[0xEE]);
    assert_eq!(dec.peek_tag(), Err(Error::InvalidTag(0xEE)));

    let bad = [Tag::String as u8, 2, 0, 0, 0, 0xC3, 0x28];
    let mut dec = Decoder::new(&bad);
    assert_eq!(dec.str(), Err(Error::InvalidUtf8));
}

// ============================================================================
//  VALUE MODEL
// ============================================================================

fn nested() -> Value {
    let mut inner = BTreeMap::new();
    inner.insert("offset".to_string(), Value::U64(3));
    inner.insert("label".to_string(), Value::from("tar"));
    let mut outer = BTreeMap::new();
    outer.insert("cfg".to_string(), Value::Map(inner));
    outer.insert("keys".to_string(), Value::List(vec![Value::from(&b"k1"[..]), Value::S64(-1)]));
    outer.insert("on".to_string(), Value::Bool(true));
    outer.insert("ratio".to_string(), Value::F64(1.25));
    outer.insert("none".to_string(), Value::Unit);
    Value::Map(outer)
}

#[test]
fn test_value_roundtrip_nested() -> Result<()> {
    let value = nested();
    let bytes = value.to_bytes()?;
    assert_eq!(Value::from_bytes(&bytes)?, value);
    Ok(())
}

#[test]
fn test_value_encoding_is_deterministic() -> Result<()> {
    // Same entries, different insertion order.
    let mut a = BTreeMap::new();
    a.insert("b".to_string(), Value::U64(2));
    a.insert("a".to_string(), Value::U64(1));
    let mut b = BTreeMap::new();
    b.insert("a".to_string(), Value::U64(1));
    b.insert("b".to_string(), Value::U64(2));
    assert_eq!(Value::Map(a).to_bytes()?, Value::Map(b).to_bytes()?);
    Ok(())
}

#[test]
fn test_value_trailing_bytes_rejected() -> Result<()> {
    let mut bytes = Value::U64(1).to_bytes()?;
    bytes.push(Tag::Unit as u8);
    assert_eq!(Value::from_bytes(&bytes), Err(Error::TrailingBytes(1)));
    Ok(())
}

#[test]
fn test_value_depth_limit() {
    let mut value = Value::Unit;
    for _ in 0..MAX_DEPTH {
        value = Value::List(vec![value]);
    }
    assert!(value.to_bytes().is_ok());

    let too_deep = Value::List(vec![value]);
    assert_eq!(too_deep.to_bytes(), Err(Error::TooDeep(MAX_DEPTH + 1)));
}

#[test]
fn test_value_duplicate_key_rejected() -> Result<()> {
    let mut enc = Encoder::new();
    enc.map_begin()?;
    for _ in 0..2 {
        enc.variant_begin("k")?;
        enc.u64(1)?;
        enc.variant_end()?;
    }
    enc.map_end()?;
    let bytes = enc.into_bytes()?;
    assert_eq!(Value::from_bytes(&bytes), Err(Error::DuplicateKey("k".into())));
    Ok(())
}

#[test]
fn test_value_display() {
    assert_eq!(Value::U64(5).to_string(), "5");
    assert_eq!(Value::List(vec![Value::U64(1), Value::from("x")]).to_string(), "[1, x]");
}
