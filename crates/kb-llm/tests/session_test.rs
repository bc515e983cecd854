//! Lifecycle and generation scenarios against the scripted backend.

use std::path::Path;

use kb_llm::testing::ScriptedBackend;
use kb_llm::{
    BridgeError, FinishReason, GenerateRequest, InitOutcome, LoadParams, MAX_PIECE_BYTES,
    SamplingParams, Session, SessionState,
};

fn load_params() -> LoadParams {
    LoadParams::new(2048, 4)
}

#[test]
fn test_initialize_is_idempotent() {
    let backend = ScriptedBackend::new();
    let tally = backend.tally();
    let mut session = Session::new(backend);

    let first = session
        .initialize(Path::new("model.gguf"), &load_params())
        .unwrap();
    let second = session
        .initialize(Path::new("model.gguf"), &load_params())
        .unwrap();

    assert_eq!(first, InitOutcome::Loaded);
    assert_eq!(second, InitOutcome::AlreadyLoaded);
    assert_eq!(tally.models_loaded(), 1);
    assert_eq!(tally.live_contexts(), 1);
}

#[test]
fn test_unload_without_session() {
    let backend = ScriptedBackend::new();
    let tally = backend.tally();
    let mut session = Session::new(backend);

    session.unload();

    assert_eq!(session.state(), SessionState::Unloaded);
    assert_eq!(tally.backend_inits(), 0);
    assert_eq!(tally.backend_shutdowns(), 0);
}

#[test]
fn test_generate_before_initialize_fails() {
    let backend = ScriptedBackend::new().reply_text("never");
    let tally = backend.tally();
    let mut session = Session::new(backend);

    let err = session
        .generate(&GenerateRequest::new("Hello", 16, SamplingParams::greedy()))
        .unwrap_err();

    assert!(matches!(err, BridgeError::NotReady));
    assert_eq!(tally.samplers_built(), 0);
}

#[test]
fn test_greedy_is_deterministic() {
    let mut session = Session::new(ScriptedBackend::new().reply_text("Hi, how are you?"));
    session
        .initialize(Path::new("model.gguf"), &load_params())
        .unwrap();

    let request = GenerateRequest::new("Hello", 32, SamplingParams::greedy());
    let runs: Vec<String> = (0..3)
        .map(|_| session.generate(&request).unwrap().text.into_string())
        .collect();

    assert_eq!(runs[0], "Hi, how are you?");
    assert!(runs.iter().all(|r| r == &runs[0]));
}

#[test]
fn test_sampled_generation_respects_limits() {
    let backend = ScriptedBackend::new()
        .reply_text("one ")
        .oversized_piece(MAX_PIECE_BYTES * 3)
        .reply_text(" two three four five six");
    let mut session = Session::new(backend);
    session
        .initialize(Path::new("model.gguf"), &load_params())
        .unwrap();

    let max_tokens = 10;
    let request = GenerateRequest::new(
        "Hello",
        max_tokens,
        SamplingParams {
            temperature: 0.8,
            top_k: 40,
            top_p: 0.95,
        },
    );
    let generation = session.generate(&request).unwrap();

    assert!(generation.completion_tokens <= max_tokens);
    assert_eq!(generation.finish_reason, FinishReason::Length);
    assert_eq!(generation.text.len(), 4 + MAX_PIECE_BYTES + 5);
}

#[test]
fn test_full_lifecycle_scenario() {
    let mut session = Session::new(ScriptedBackend::new().reply_text("Hello! Nice to meet you."));

    assert_eq!(
        session
            .initialize(Path::new("model.gguf"), &LoadParams::new(2048, 4))
            .unwrap(),
        InitOutcome::Loaded
    );

    let request = GenerateRequest::new("Hello", 16, SamplingParams::greedy());
    let generation = session.generate(&request).unwrap();
    assert!(!generation.text.is_empty());
    assert!(generation.completion_tokens <= 16);
    assert_eq!(generation.text.as_str(), "Hello! Nice to m");

    session.unload();
    assert!(matches!(
        session.generate(&request).unwrap_err(),
        BridgeError::NotReady
    ));
}

#[test]
fn test_empty_prompt_fails() {
    let backend = ScriptedBackend::new().reply_text("text");
    let tally = backend.tally();
    let mut session = Session::new(backend);
    session
        .initialize(Path::new("model.gguf"), &load_params())
        .unwrap();

    let err = session
        .generate(&GenerateRequest::new("", 16, SamplingParams::greedy()))
        .unwrap_err();

    assert!(matches!(err, BridgeError::Tokenize(_)));
    assert_eq!(tally.live_samplers(), 0);
}

#[test]
fn test_prompt_decode_failure_releases_sampler() {
    let backend = ScriptedBackend::new()
        .reply_text("text")
        .failing_prompt_decode();
    let tally = backend.tally();
    let mut session = Session::new(backend);
    session
        .initialize(Path::new("model.gguf"), &load_params())
        .unwrap();

    let err = session
        .generate(&GenerateRequest::new("Hello", 16, SamplingParams::greedy()))
        .unwrap_err();

    assert!(matches!(err, BridgeError::PromptEval(_)));
    assert_eq!(tally.samplers_built(), 1);
    assert_eq!(tally.live_samplers(), 0);
    assert!(session.is_ready());
}

#[test]
fn test_model_load_failure_leaves_session_unloaded() {
    let backend = ScriptedBackend::new().failing_model_load();
    let tally = backend.tally();
    let mut session = Session::new(backend);

    let err = session
        .initialize(Path::new("missing.gguf"), &load_params())
        .unwrap_err();

    assert!(matches!(err, BridgeError::ModelLoad { .. }));
    assert_eq!(session.state(), SessionState::Unloaded);
    assert_eq!(tally.backend_inits(), 1);
    assert_eq!(tally.backend_shutdowns(), 1);
}

#[test]
fn test_reinitialize_after_unload() {
    let backend = ScriptedBackend::new().reply_text("ok");
    let tally = backend.tally();
    let mut session = Session::new(backend);

    session
        .initialize(Path::new("a.gguf"), &load_params())
        .unwrap();
    session.unload();
    let outcome = session
        .initialize(Path::new("b.gguf"), &load_params())
        .unwrap();

    assert_eq!(outcome, InitOutcome::Loaded);
    assert_eq!(tally.models_loaded(), 2);
    assert_eq!(tally.live_models(), 1);
    assert_eq!(session.model_path(), Some(Path::new("b.gguf")));
}

#[test]
fn test_independent_sessions() {
    let mut a = Session::new(ScriptedBackend::new().reply_text("alpha"));
    let mut b = Session::new(ScriptedBackend::new().reply_text("beta"));
    a.initialize(Path::new("a.gguf"), &load_params()).unwrap();
    b.initialize(Path::new("b.gguf"), &load_params()).unwrap();

    let request = GenerateRequest::new("Hello", 8, SamplingParams::greedy());
    assert_eq!(a.generate(&request).unwrap().text.as_str(), "alpha");
    assert_eq!(b.generate(&request).unwrap().text.as_str(), "beta");
}
