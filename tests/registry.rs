//! Registry tests through the public API.

use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use tokencount::{encoding_for_model, Config, EncodingName, Registry, TokenizerError};

/// Byte-level table plus merges for "hello" and " world".
fn write_tiny_vocab(dir: &Path, file: &str) {
    let mut lines: Vec<String> = (0..=255u8)
        .map(|b| format!("{} {}", STANDARD.encode([b]), b))
        .collect();
    for (rank, merge) in ["he", "ll", "hell", "hello", " w", "or", " wor", "ld", " world"]
        .iter()
        .enumerate()
    {
        lines.push(format!("{} {}", STANDARD.encode(merge), 256 + rank));
    }
    std::fs::write(dir.join(file), lines.join("\n")).unwrap();
}

#[test]
fn test_registry_from_toml_config() {
    let dir = tempfile::tempdir().unwrap();
    for encoding in EncodingName::all() {
        write_tiny_vocab(dir.path(), encoding.vocab_file());
    }

    let toml = format!(
        "vocab_dir = {:?}\napprox_chars_per_token = 4.0\n",
        dir.path().display().to_string()
    );
    let registry = Registry::new(Config::from_toml_str(&toml).unwrap());
    assert_eq!(registry.config().vocab_dir.as_deref(), Some(dir.path()));

    for &encoding in EncodingName::all() {
        let bpe = registry.get(encoding.as_str()).unwrap();
        assert_eq!(bpe.encode_ordinary("hello world"), vec![259, 264], "{encoding}");
        assert_eq!(bpe.decode(&[259, 264]).unwrap(), "hello world");
        assert_eq!(bpe.pattern(), encoding.pattern());
    }

    let tok = registry.tokenizer_for_model("claude-3-5-sonnet").unwrap();
    assert_eq!(tok.count_tokens("12345678").unwrap(), 2);
}

#[test]
fn test_registry_shares_engines_across_models() {
    let dir = tempfile::tempdir().unwrap();
    write_tiny_vocab(dir.path(), "cl100k_base.tiktoken");
    let registry = Registry::new(Config::default().with_vocab_dir(dir.path()));

    let a = registry.for_model("gpt-4").unwrap();
    let b = registry.for_model("llama-3-8b").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(encoding_for_model("llama-3-8b"), (EncodingName::Cl100kBase, true));
}

#[test]
fn test_registry_errors() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::new(Config::default().with_vocab_dir(dir.path()));

    assert!(matches!(
        registry.get("not_an_encoding"),
        Err(TokenizerError::EncodingNotFound(_))
    ));

    std::fs::write(dir.path().join("o200k_base.tiktoken"), "!!! 0\n").unwrap();
    assert!(matches!(
        registry.tokenizer_for_model("gpt-4o"),
        Err(TokenizerError::Vocab(_))
    ));
}

/// Fixture counts against the real assets.
#[test]
#[ignore = "needs TOKENCOUNT_VOCAB_DIR with real .tiktoken assets"]
fn test_fixture_counts_real_assets() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let registry = Registry::new(Config::from_env());
    for model in ["gpt-4o", "gpt-4"] {
        let tokenizer = registry
            .tokenizer_for_model(model)
            .unwrap_or_else(|err| panic!("{model}: {err}"));
        assert_eq!(tokenizer.count_tokens("Hello, world!").unwrap(), 4, "{model}");
        assert_eq!(
            tokenizer
                .count_tokens("The quick brown fox jumps over the lazy dog.")
                .unwrap(),
            10,
            "{model}"
        );
    }
}
