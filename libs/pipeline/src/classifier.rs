use consumer_api::Category;

const ERROR_TOKENS: &[&str] = &["error", "ошибка"];
const TEST_TOKENS: &[&str] = &["test", "тест"];

/// Payload длиннее этого числа символов считается LARGE.
pub const LARGE_THRESHOLD: usize = 100;

/// Определить тип сообщения по содержимому.
///
/// Проверки идут по lower-case payload, первое совпадение выигрывает:
/// JSON (`json` или начинается с `{`) → ERROR → TEST → LARGE → SIMPLE.
pub fn classify(payload: &str) -> Category {
    let lower = payload.to_lowercase();

    if lower.contains("json") || lower.starts_with('{') {
        Category::Json
    } else if ERROR_TOKENS.iter().any(|t| lower.contains(t)) {
        Category::Error
    } else if TEST_TOKENS.iter().any(|t| lower.contains(t)) {
        Category::Test
    } else if lower.chars().count() > LARGE_THRESHOLD {
        Category::Large
    } else {
        Category::Simple
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_by_token_or_brace() {
        assert_eq!(classify("{\"a\":1}"), Category::Json);
        assert_eq!(classify("payload is JSON"), Category::Json);
    }

    #[test]
    fn json_wins_over_error() {
        assert_eq!(classify("{\"x\":1} error"), Category::Json);
        assert_eq!(classify("json error test"), Category::Json);
    }

    #[test]
    fn error_wins_over_test() {
        assert_eq!(classify("an Error during test"), Category::Error);
    }

    #[test]
    fn localized_tokens() {
        assert_eq!(classify("Произошла ОШИБКА"), Category::Error);
        assert_eq!(classify("Тестовое сообщение"), Category::Test);
    }

    #[test]
    fn test_token() {
        assert_eq!(classify("hello test message"), Category::Test);
    }

    #[test]
    fn large_is_strictly_over_threshold() {
        assert_eq!(classify(&"a".repeat(LARGE_THRESHOLD)), Category::Simple);
        assert_eq!(classify(&"a".repeat(LARGE_THRESHOLD + 1)), Category::Large);
    }

    #[test]
    fn brace_prefix_fires_before_length() {
        let padded = format!("{{\"a\":1}}{}", " ".repeat(123));
        assert_eq!(padded.chars().count(), 130);
        assert_eq!(classify(&padded), Category::Json);
    }

    #[test]
    fn leading_whitespace_defeats_brace_prefix() {
        assert_eq!(classify("  {\"a\":1}"), Category::Simple);
    }

    #[test]
    fn fallthrough_is_simple() {
        assert_eq!(classify("hello"), Category::Simple);
        assert_eq!(classify(""), Category::Simple);
    }

    #[test]
    fn deterministic() {
        let long = "z".repeat(200);
        let inputs = ["hello", "{x", "ERROR", "тест", long.as_str()];
        for input in inputs {
            assert_eq!(classify(input), classify(input));
        }
    }
}
