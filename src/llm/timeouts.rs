use std::time::Duration;

const CHAT_TIMEOUT_BASE_SECONDS: u64 = 120;
const CHAT_TIMEOUT_LONG_SECONDS: u64 = 300;
const CHAT_TIMEOUT_EXTENDED_SECONDS: u64 = 600;

const EMBEDDING_TIMEOUT_BASE_SECONDS: u64 = 30;
const EMBEDDING_TIMEOUT_LONG_SECONDS: u64 = 90;

pub fn chat_timeout_for_prompt_chars(prompt_chars: usize) -> Duration {
    let seconds = if prompt_chars >= 120_000 {
        CHAT_TIMEOUT_EXTENDED_SECONDS
    } else if prompt_chars >= 32_000 {
        CHAT_TIMEOUT_LONG_SECONDS
    } else {
        CHAT_TIMEOUT_BASE_SECONDS
    };
    Duration::from_secs(seconds)
}

pub fn embedding_timeout_for_text_chars(text_chars: usize) -> Duration {
    let seconds = if text_chars >= 8_000 {
        EMBEDDING_TIMEOUT_LONG_SECONDS
    } else {
        EMBEDDING_TIMEOUT_BASE_SECONDS
    };
    Duration::from_secs(seconds)
}
