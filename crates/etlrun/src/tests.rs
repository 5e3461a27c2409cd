use crate::*;
use crate::phase::Lifecycle;
use crate::pipeline::split;
use anyhow::Result;
use etlcode::Callable;
use etlcode::Catalog;
use etlcode::CatalogError;
use etlcode::EncodedCallable;
use etlcode::EncodingError;
use etlcode::Finish;
use etlcode::Kind;
use etlcode::Mode;
use etlcode::ReconstructionError;
use etlcode::Renderer;
use etlcode::Requirement;
use etlcode::ScriptError;
use etlcode::Shape;
use etlcode::StageError;
use etlcode::TransformSpec;
use etlcode::Value;
use sha2::Digest;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

type Log = Arc<Mutex<Vec<String>>>;

/// A catalog whose `rec` stages write every call into `log`.
fn recording_catalog(log: &Log) -> Catalog {
    let mut catalog = Catalog::builtin();

    let l = Arc::clone(log);
    catalog.register_setup("rec", vec![], move |_| {
        l.lock().unwrap().push("before".to_string());
        Ok(Value::U64(0))
    });

    let l = Arc::clone(log);
    catalog.register_chunk(
        "rec",
        vec![Requirement::optional("fail_on", Kind::Bytes)],
        move |cap, chunk, state| {
            l.lock().unwrap().push(format!("chunk:{}", String::from_utf8_lossy(chunk)));
            if cap.bytes("fail_on") == Some(chunk) {
                return Err(StageError::new("boom"));
            }
            *state = Value::U64(state.as_u64().unwrap_or(0) + 1);
            Ok(chunk.to_vec())
        },
    );

    let l = Arc::clone(log);
    catalog.register_teardown("rec", vec![], move |_, state| {
        l.lock().unwrap().push("after".to_string());
        Ok(Finish { tail: b"|end".to_vec(), state })
    });

    catalog
        .register_setup("fail", vec![], |_| Err(StageError::new("no setup")))
        .register_teardown("fail", vec![], |_, _| Err(StageError::new("no teardown")));
    catalog
}

fn load_spec(spec: &TransformSpec, catalog: &Catalog) -> Result<Pipeline> {
    let script = Renderer::new(catalog).render(spec)?;
    Ok(load(script.as_str(), catalog)?)
}

fn recorded(before: &str, chunk: Callable, after: &str) -> TransformSpec {
    TransformSpec::streaming(Callable::setup(before), chunk, Callable::teardown(after))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn seal(body: &str) -> String {
    format!("{}check {:x}\n", body, Sha256::digest(body.as_bytes()))
}

// ============================================================================
//  LIFECYCLE
// ============================================================================

#[test]
fn test_streaming_lifecycle() -> Result<()> {
    let mut lc = Lifecycle::new(Mode::Streaming);
    assert_eq!(lc.phase(), Phase::Init);

    match lc.advance(Phase::Transforming) {
        Err(TransitionError { from: Phase::Init, to: Phase::Transforming }) => {}
        other => panic!("expected illegal transition, got {:?}", other),
    }

    lc.advance(Phase::BeforeDone)?;
    lc.advance(Phase::Transforming)?;
    lc.advance(Phase::Transforming)?;
    lc.advance(Phase::AfterDone)?;
    assert!(lc.phase().is_terminal());
    assert!(!lc.phase().is_failure());

    for to in [Phase::Transforming, Phase::AfterDone, Phase::AfterFailed] {
        assert!(!lc.allows(to));
    }
    Ok(())
}

#[test]
fn test_failed_phases_are_terminal() -> Result<()> {
    let mut lc = Lifecycle::new(Mode::Streaming);
    lc.advance(Phase::BeforeDone)?;
    lc.advance(Phase::Transforming)?;
    lc.advance(Phase::TransformFailed)?;
    assert!(lc.phase().is_failure());
    assert!(!lc.allows(Phase::AfterDone));
    assert!(!lc.allows(Phase::Transforming));

    let mut lc = Lifecycle::new(Mode::Streaming);
    lc.advance(Phase::BeforeFailed)?;
    assert!(!lc.allows(Phase::BeforeDone));
    Ok(())
}

#[test]
fn test_single_shot_lifecycle() -> Result<()> {
    let mut lc = Lifecycle::new(Mode::SingleShot);
    assert!(!lc.allows(Phase::BeforeDone));
    lc.advance(Phase::Transforming)?;
    assert!(!lc.allows(Phase::Transforming));
    lc.advance(Phase::AfterDone)?;
    Ok(())
}

// ============================================================================
//  CHUNKING & CONFIG
// ============================================================================

#[test]
fn test_split() {
    assert_eq!(split(b"", 4).count(), 0);
    assert_eq!(split(b"", 0).count(), 0);
    assert_eq!(split(b"abcde", 0).collect::<Vec<_>>(), vec![b"abcde".as_slice()]);
    assert_eq!(
        split(b"abcde", 2).collect::<Vec<_>>(),
        vec![b"ab".as_slice(), b"cd".as_slice(), b"e".as_slice()]
    );
}

#[test]
fn test_config_from_lookup() -> Result<()> {
    let none = HarnessConfig::from_lookup(|_| None)?;
    assert_eq!(none, HarnessConfig::default());
    assert_eq!(none.chunk_size, etlcode::DEFAULT_CHUNK_SIZE);

    let vars: HashMap<&str, &str> = [("ETL_CHUNK_SIZE", "16"), ("ETL_MAX_CONCURRENCY", " 3 ")].into();
    let config = HarnessConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()))?;
    assert_eq!(config.chunk_size, 16);
    assert_eq!(config.max_concurrent_requests, 3);

    match HarnessConfig::from_lookup(|k| (k == "ETL_CHUNK_SIZE").then(|| "big".to_string())) {
        Err(ConfigError { var: "ETL_CHUNK_SIZE", value }) => assert_eq!(value, "big"),
        other => panic!("expected ConfigError, got {:?}", other),
    }
    match HarnessConfig::from_lookup(|k| (k == "ETL_MAX_CONCURRENCY").then(|| "-1".to_string())) {
        Err(ConfigError { var: "ETL_MAX_CONCURRENCY", value }) => assert_eq!(value, "-1"),
        other => panic!("expected ConfigError, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_config_zero_concurrency_means_one() -> Result<()> {
    let built = HarnessConfig::new().chunk_size(0).max_concurrent_requests(0);
    assert_eq!(built.chunk_size, 0);
    assert_eq!(built.max_concurrent_requests, 1);

    let vars: HashMap<&str, &str> = [("ETL_CHUNK_SIZE", "0"), ("ETL_MAX_CONCURRENCY", "0")].into();
    let looked_up = HarnessConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()))?;
    assert_eq!(looked_up, built);
    Ok(())
}

// ============================================================================
//  PIPELINE
// ============================================================================

#[test]
fn test_streaming_order_and_exactly_once() -> Result<()> {
    let log = Log::default();
    let catalog = recording_catalog(&log);
    let pipeline = load_spec(&recorded("rec", Callable::chunk("rec"), "rec"), &catalog)?;
    assert_eq!(pipeline.mode(), Mode::Streaming);

    let response = pipeline.run_chunks(["a", "b", "c"])?;
    assert_eq!(response.body, b"abc|end");
    assert_eq!(response.final_state, Value::U64(3));
    assert_eq!(entries(&log), vec!["before", "chunk:a", "chunk:b", "chunk:c", "after"]);
    Ok(())
}

#[test]
fn test_zero_chunk_request() -> Result<()> {
    let log = Log::default();
    let catalog = recording_catalog(&log);
    let pipeline = load_spec(&recorded("rec", Callable::chunk("rec"), "rec"), &catalog)?;

    let response = pipeline.run(b"", 4)?;
    assert_eq!(response.body, b"|end");
    assert_eq!(response.final_state, Value::U64(0));
    assert_eq!(entries(&log), vec!["before", "after"]);
    Ok(())
}

#[test]
fn test_before_failure_runs_nothing_else() -> Result<()> {
    let log = Log::default();
    let catalog = recording_catalog(&log);
    let pipeline = load_spec(&recorded("fail", Callable::chunk("rec"), "rec"), &catalog)?;

    match pipeline.run(b"abc", 1) {
        Err(RequestError::Stage { phase: Phase::BeforeFailed, error }) => assert_eq!(error.message(), "no setup"),
        other => panic!("expected BeforeFailed, got {:?}", other),
    }
    assert!(entries(&log).is_empty());
    Ok(())
}

#[test]
fn test_transform_failure_skips_after() -> Result<()> {
    let log = Log::default();
    let catalog = recording_catalog(&log);
    let chunk = Callable::chunk("rec").capture("fail_on", b"b".as_slice());
    let pipeline = load_spec(&recorded("rec", chunk, "rec"), &catalog)?;

    let err = pipeline.run_chunks(["a", "b", "c"]).unwrap_err();
    assert_eq!(err.failed_phase(), Some(Phase::TransformFailed));
    assert_eq!(entries(&log), vec!["before", "chunk:a", "chunk:b"]);
    Ok(())
}

#[test]
fn test_after_failure() -> Result<()> {
    let log = Log::default();
    let catalog = recording_catalog(&log);
    let pipeline = load_spec(&recorded("rec", Callable::chunk("rec"), "fail"), &catalog)?;

    let err = pipeline.run_chunks(["a"]).unwrap_err();
    assert_eq!(err.failed_phase(), Some(Phase::AfterFailed));
    assert_eq!(entries(&log), vec!["before", "chunk:a"]);
    Ok(())
}

#[test]
fn test_request_rejects_push_after_failure() -> Result<()> {
    let log = Log::default();
    let catalog = recording_catalog(&log);
    let chunk = Callable::chunk("rec").capture("fail_on", b"x".as_slice());
    let pipeline = load_spec(&recorded("rec", chunk, "rec"), &catalog)?;

    let mut request = pipeline.start()?;
    assert_eq!(request.phase(), Phase::BeforeDone);
    assert!(request.push(b"x").is_err());
    assert_eq!(request.phase(), Phase::TransformFailed);

    match request.push(b"y") {
        Err(RequestError::Transition(TransitionError { from: Phase::TransformFailed, to: Phase::Transforming })) => {}
        other => panic!("expected Transition error, got {:?}", other),
    }
    match request.finish() {
        Err(RequestError::Transition(TransitionError { to: Phase::AfterDone, .. })) => {}
        other => panic!("expected Transition error, got {:?}", other),
    }
    assert_eq!(entries(&log), vec!["before", "chunk:x"]);
    Ok(())
}

#[test]
fn test_single_shot_buffers_chunks() -> Result<()> {
    let pipeline = load_spec(&TransformSpec::single_shot(Callable::transform("uppercase")), &Catalog::builtin())?;
    assert_eq!(pipeline.mode(), Mode::SingleShot);

    let response = pipeline.run_chunks(["he", "llo"])?;
    assert_eq!(response.body, b"HELLO");
    assert_eq!(response.final_state, Value::Unit);
    Ok(())
}

#[test]
fn test_single_shot_failure() -> Result<()> {
    let spec = TransformSpec::single_shot(
        Callable::transform("replace").capture("from", b"".as_slice()).capture("to", b"x".as_slice()),
    );
    let pipeline = load_spec(&spec, &Catalog::builtin())?;
    let err = pipeline.run(b"abc", 0).unwrap_err();
    assert_eq!(err.failed_phase(), Some(Phase::TransformFailed));
    Ok(())
}

#[test]
fn test_pipeline_constructors_check_shapes() -> Result<()> {
    let catalog = Catalog::builtin();
    let upper = catalog.reconstruct(&Callable::transform("uppercase"))?;
    let noop = catalog.reconstruct(&Callable::setup("noop"))?;

    match Pipeline::streaming(noop.clone(), upper.clone(), noop) {
        Err(LoadError::WrongShape { slot: "transform", expected: Shape::Chunk, found: Shape::Transform }) => {}
        other => panic!("expected WrongShape, got {:?}", other),
    }
    Pipeline::single_shot(upper)?;
    Ok(())
}

// ============================================================================
//  LOAD
// ============================================================================

#[test]
fn test_load_rejects_tampered_script() -> Result<()> {
    let catalog = Catalog::builtin();
    let script = Renderer::new(&catalog).render(&TransformSpec::single_shot(Callable::transform("uppercase")))?;
    let tampered = script.as_str().replace("mode single-shot", "mode streaming");

    match load(&tampered, &catalog) {
        Err(LoadError::Script(ScriptError::IntegrityMismatch { .. })) => {}
        other => panic!("expected IntegrityMismatch, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_load_requires_matching_catalog() -> Result<()> {
    let log = Log::default();
    let client = recording_catalog(&log);
    let script = Renderer::new(&client).render(&recorded("rec", Callable::chunk("identity"), "noop"))?;

    match load(script.as_str(), &Catalog::builtin()) {
        Err(LoadError::Reconstruction {
            slot: "before",
            error: ReconstructionError::Catalog(CatalogError::UnknownFunction { shape: Shape::Setup, .. }),
        }) => {}
        other => panic!("expected UnknownFunction, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_load_bad_payload() {
    let body = "# etl-script v1\nmode single-shot\ntransform = decode('not*base64AA')\nserve transform\n";
    match load(&seal(body), &Catalog::builtin()) {
        Err(LoadError::Encoding { slot: "transform", error: EncodingError::InvalidSymbol { offset: 3, byte: b'*' } }) => {}
        other => panic!("expected Encoding error, got {:?}", other),
    }
}

#[test]
fn test_load_wrong_shape_in_slot() -> Result<()> {
    let catalog = Catalog::builtin();
    let before = EncodedCallable::encode(&Callable::setup("noop"), &catalog)?;
    let misplaced = EncodedCallable::encode(&Callable::transform("uppercase"), &catalog)?;
    let after = EncodedCallable::encode(&Callable::teardown("noop"), &catalog)?;

    let body = format!(
        "# etl-script v1\nmode streaming\nbefore = decode('{}')\ntransform = decode('{}')\nafter = decode('{}')\nserve before transform after\n",
        before.as_str(),
        misplaced.as_str(),
        after.as_str()
    );
    match load(&seal(&body), &catalog) {
        Err(LoadError::WrongShape { slot: "transform", expected: Shape::Chunk, found: Shape::Transform }) => {}
        other => panic!("expected WrongShape, got {:?}", other),
    }
    Ok(())
}

// ============================================================================
//  HARNESS
// ============================================================================

/// Yields its chunks, then fails instead of ending the request.
struct Disconnecting(Chunks);

#[async_trait::async_trait]
impl ChunkSource for Disconnecting {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        match self.0.next_chunk().await? {
            Some(chunk) => Ok(Some(chunk)),
            None => Err(SourceError("disconnected".to_string())),
        }
    }
}

fn count(log: &Log, entry: &str) -> usize {
    entries(log).iter().filter(|e| *e == entry).count()
}

#[tokio::test]
async fn test_chunk_failure_leaves_later_requests_alone() -> Result<()> {
    let log = Log::default();
    let catalog = recording_catalog(&log);
    let chunk = Callable::chunk("rec").capture("fail_on", b"bad".as_slice());
    let harness = Harness::new(load_spec(&recorded("rec", chunk, "rec"), &catalog)?, HarnessConfig::default());

    match harness.serve_stream(&mut Chunks::new(["ab", "bad", "cd"])).await {
        Err(RequestError::Stage { phase: Phase::TransformFailed, error }) => assert_eq!(error.message(), "boom"),
        other => panic!("expected TransformFailed, got {:?}", other),
    }
    assert_eq!(count(&log, "after"), 0);
    assert!(!entries(&log).contains(&"chunk:cd".to_string()));

    let response = harness.serve_stream(&mut Chunks::new(["ab", "cde"])).await?;
    assert_eq!(response.final_state, Value::U64(2));
    assert_eq!(response.body, b"abcde|end");
    assert_eq!(count(&log, "before"), 2);
    assert_eq!(count(&log, "after"), 1);
    assert_eq!(entries(&log).last().map(String::as_str), Some("after"));

    assert_eq!(harness.stats(), Stats { served: 1, failed: 1 });
    assert_eq!(harness.in_flight(), 0);
    Ok(())
}

#[tokio::test]
async fn test_source_failure_skips_after() -> Result<()> {
    let log = Log::default();
    let catalog = recording_catalog(&log);
    let harness = Harness::new(
        load_spec(&recorded("rec", Callable::chunk("rec"), "rec"), &catalog)?,
        HarnessConfig::default(),
    );

    harness.serve_stream(&mut Chunks::new(["a"])).await?;
    assert_eq!(count(&log, "after"), 1);

    match harness.serve_stream(&mut Disconnecting(Chunks::new(["b", "c"]))).await {
        Err(RequestError::Source(SourceError(reason))) => assert_eq!(reason, "disconnected"),
        other => panic!("expected Source error, got {:?}", other),
    }
    assert_eq!(count(&log, "before"), 2);
    assert_eq!(count(&log, "chunk:c"), 1);
    assert_eq!(count(&log, "after"), 1);

    assert_eq!(harness.stats(), Stats { served: 1, failed: 1 });
    assert_eq!(harness.in_flight(), 0);
    assert!(harness.in_flight_requests().is_empty());
    Ok(())
}
