//! Tokenizer selection for budget accounting, grounded in the original
//! tokenizer factory's model-name substring matching. Unlike the source
//! this is grounded on, unknown models don't raise — they fall back to a
//! chars/4 estimate so the renderer always has a usable counter.

/// Estimates how many tokens a string of rendered prompt text costs.
/// Implemented by a real tiktoken encoding where one applies, and by a
/// cheap heuristic everywhere else.
pub trait TokenCounter: std::fmt::Debug {
    fn count(&self, text: &str) -> usize;
}

/// A real BPE tokenizer, used when the model name matches a known
/// OpenAI/Anthropic-adjacent encoding family.
pub struct TiktokenCounter(tiktoken_rs::CoreBPE);

impl std::fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenCounter").finish_non_exhaustive()
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.0.encode_ordinary(text).len()
    }
}

/// `text.chars().count() / 4`, used for models with no known tiktoken
/// encoding. Crude, but it degrades gracefully rather than refusing to
/// budget at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct CharsFallbackCounter;

impl TokenCounter for CharsFallbackCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count() / 4
    }
}

/// Picks a tokenizer for `model` by substring match: OpenAI model names
/// resolve through `tiktoken_rs::get_bpe_from_model`, Anthropic model
/// names (no public BPE) approximate with `cl100k_base` since it's close
/// enough for budget accounting, and anything else gets the chars/4
/// fallback.
pub fn token_counter_for_model(model: &str) -> Box<dyn TokenCounter> {
    if model.contains("gpt-") || model.contains("o1") || model.contains("o3") {
        if let Ok(bpe) = tiktoken_rs::get_bpe_from_model(model) {
            return Box::new(TiktokenCounter(bpe));
        }
    }
    if model.contains("claude") {
        if let Ok(bpe) = tiktoken_rs::cl100k_base() {
            return Box::new(TiktokenCounter(bpe));
        }
    }
    Box::new(CharsFallbackCounter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_falls_back_to_chars_over_four() {
        let counter = token_counter_for_model("some-unlisted-local-model");
        assert_eq!(counter.count("abcdefgh"), 2);
    }

    #[test]
    fn known_openai_model_resolves_a_real_tokenizer() {
        let counter = token_counter_for_model("gpt-4o");
        // A real BPE won't split "hello world" into 11 tokens the way the
        // chars/4 fallback's arithmetic alone would suggest.
        assert!(counter.count("hello world") < 11);
    }

    #[test]
    fn claude_model_approximates_with_cl100k() {
        let counter = token_counter_for_model("claude-3-5-sonnet-20241022");
        assert!(counter.count("hello world") > 0);
    }
}
