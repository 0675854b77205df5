//! Integration tests for o200k_base (GPT-4o).
//!
//! These need `o200k_base.tiktoken` in `$TOKENCOUNT_VOCAB_DIR` (or `./vocabs`),
//! so they are ignored by default. Run with `cargo test -- --ignored`; a
//! missing asset then fails the suite.

use std::sync::{Arc, LazyLock};

use tokencount::{Config, CoreBpe, Registry, SpecialTokens, TokenizerError};

/// Shared engine, built once for the whole suite.
static TOKENIZER: LazyLock<Arc<CoreBpe>> = LazyLock::new(|| {
    Registry::new(Config::from_env())
        .get("o200k_base")
        .unwrap_or_else(|err| panic!("o200k_base unavailable: {err}"))
});

fn tokenizer() -> &'static CoreBpe {
    &TOKENIZER
}

// =============================================================================
// Exact Token ID Tests
// =============================================================================

#[test]
#[ignore = "needs TOKENCOUNT_VOCAB_DIR with real .tiktoken assets"]
fn test_o200k_hello_world_tokens() {
    let tokenizer = tokenizer();
    assert_eq!(tokenizer.encode_ordinary("Hello world"), vec![13225, 2375]);
}

#[test]
#[ignore = "needs TOKENCOUNT_VOCAB_DIR with real .tiktoken assets"]
fn test_o200k_hello_world_punctuation_tokens() {
    let tokenizer = tokenizer();
    assert_eq!(
        tokenizer.encode_ordinary("Hello, world!"),
        vec![13225, 11, 2375, 0],
        "Token IDs for 'Hello, world!' changed"
    );
}

#[test]
#[ignore = "needs TOKENCOUNT_VOCAB_DIR with real .tiktoken assets"]
fn test_o200k_chinese_tokens() {
    let tokenizer = tokenizer();
    assert_eq!(tokenizer.encode_ordinary("你好世界"), vec![177519, 28428]);
}

#[test]
#[ignore = "needs TOKENCOUNT_VOCAB_DIR with real .tiktoken assets"]
fn test_o200k_emoji_tokens() {
    let tokenizer = tokenizer();
    assert_eq!(
        tokenizer.encode_ordinary("Hello 🌍 World!"),
        vec![13225, 130321, 235, 5922, 0]
    );
}

#[test]
#[ignore = "needs TOKENCOUNT_VOCAB_DIR with real .tiktoken assets"]
fn test_o200k_fixture_counts() {
    let tokenizer = tokenizer();
    assert_eq!(tokenizer.token_count("Hello, world!"), 4);
    assert_eq!(
        tokenizer.token_count("The quick brown fox jumps over the lazy dog."),
        10
    );
}

// =============================================================================
// Roundtrip
// =============================================================================

#[test]
#[ignore = "needs TOKENCOUNT_VOCAB_DIR with real .tiktoken assets"]
fn test_o200k_encode_decode_roundtrip() {
    let tokenizer = tokenizer();

    let test_cases = [
        "Hello, world!",
        "The quick brown fox jumps over the lazy dog.",
        "Rust is a systems programming language.",
        "1234567890",
        "Special characters: !@#$%^&*()",
        "Multi-line\ntext\nwith\nnewlines",
        "Unicode: こんにちは 世界 🦀",
        "path/to/file.rs\r\n",
        "   trailing   ",
    ];

    for text in test_cases {
        let tokens = tokenizer.encode_ordinary(text);
        let decoded = tokenizer.decode(&tokens).unwrap();
        assert_eq!(decoded, text, "Roundtrip failed for: {:?}", text);
    }
}

#[test]
#[ignore = "needs TOKENCOUNT_VOCAB_DIR with real .tiktoken assets"]
fn test_o200k_code_content() {
    let tokenizer = tokenizer();

    let code = r#"
def hello_world():
    print("Hello, World!")

if __name__ == "__main__":
    hello_world()
"#;

    let tokens = tokenizer.encode_ordinary(code);
    assert_eq!(tokenizer.decode(&tokens).unwrap(), code);
}

#[test]
#[ignore = "needs TOKENCOUNT_VOCAB_DIR with real .tiktoken assets"]
fn test_o200k_empty_input() {
    let tokenizer = tokenizer();
    assert!(tokenizer.encode_ordinary("").is_empty());
    assert_eq!(tokenizer.decode(&[]).unwrap(), "");
}

// =============================================================================
// Special Tokens
// =============================================================================

#[test]
#[ignore = "needs TOKENCOUNT_VOCAB_DIR with real .tiktoken assets"]
fn test_o200k_special_tokens() {
    let tokenizer = tokenizer();

    let tokens = tokenizer.encode_with_special_tokens("Hello<|endoftext|>World");
    assert_eq!(tokens.iter().filter(|&&t| t == 199999).count(), 1);

    let tokens = tokenizer.encode_with_special_tokens("<|endofprompt|>");
    assert_eq!(tokens, vec![200018]);

    assert_eq!(tokenizer.decode(&[199999]).unwrap(), "<|endoftext|>");
    assert_eq!(tokenizer.decode(&[200018]).unwrap(), "<|endofprompt|>");
}

#[test]
#[ignore = "needs TOKENCOUNT_VOCAB_DIR with real .tiktoken assets"]
fn test_o200k_disallowed_special() {
    let tokenizer = tokenizer();

    let text = "end: <|endoftext|>";
    let err = tokenizer
        .encode(text, SpecialTokens::None, SpecialTokens::All)
        .unwrap_err();
    assert!(matches!(
        err,
        TokenizerError::DisallowedSpecialToken { ref token, offset: 5 } if token == "<|endoftext|>"
    ));

    let allowed = ["<|endoftext|>"];
    let tokens = tokenizer
        .encode(text, SpecialTokens::Only(&allowed), SpecialTokens::All)
        .unwrap();
    assert_eq!(tokens.last(), Some(&199999));
    assert_eq!(tokens.iter().filter(|&&t| t == 199999).count(), 1);
}

#[test]
#[ignore = "needs TOKENCOUNT_VOCAB_DIR with real .tiktoken assets"]
fn test_o200k_special_literal_counts_as_text() {
    let tokenizer = tokenizer();
    let tokens = tokenizer.encode_ordinary("<|endoftext|>");
    assert!(tokens.len() > 1);
    assert!(!tokens.contains(&199999));
}

// =============================================================================
// Misc
// =============================================================================

#[test]
#[ignore = "needs TOKENCOUNT_VOCAB_DIR with real .tiktoken assets"]
fn test_o200k_vocab_size() {
    let tokenizer = tokenizer();
    // 199,998 ranks plus special tokens up to 200018
    assert_eq!(tokenizer.vocab_size(), 200019);
}

#[test]
#[ignore = "needs TOKENCOUNT_VOCAB_DIR with real .tiktoken assets"]
fn test_o200k_batch_encode() {
    let tokenizer = tokenizer();

    let texts = vec![
        "Hello, world!".to_string(),
        "How are you?".to_string(),
        "I'm doing great!".to_string(),
    ];

    let batch_tokens = tokenizer.encode_batch(&texts);
    assert_eq!(batch_tokens.len(), 3);
    for (i, text) in texts.iter().enumerate() {
        assert_eq!(batch_tokens[i], tokenizer.encode_ordinary(text), "text {i}: {text:?}");
    }
    assert_eq!(tokenizer.count_batch(&texts)[0], 4);
}
