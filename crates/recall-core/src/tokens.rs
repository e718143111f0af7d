use std::sync::OnceLock;

use tiktoken_rs::{cl100k_base, CoreBPE};

static ENCODER: OnceLock<CoreBPE> = OnceLock::new();

fn encoder() -> &'static CoreBPE {
    // embedded vocabulary, construction cannot fail at runtime
    ENCODER.get_or_init(|| cl100k_base().expect("cl100k_base tokenizer"))
}

/// Token count of `text` under the cl100k encoding. All budgets in the
/// pipeline (buffer sizes, context windows, slot caps) are measured here.
pub fn count_tokens(text: &str) -> usize {
    encoder().encode_with_special_tokens(text).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_stable_and_monotonic() {
        assert_eq!(count_tokens(""), 0);
        let short = count_tokens("hello world");
        let long = count_tokens("hello world, hello world, hello world");
        assert!(short >= 1);
        assert!(long > short);
    }
}
