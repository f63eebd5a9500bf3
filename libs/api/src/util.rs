/// Текущее Unix-время в миллисекундах.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Обрезать payload для лога до `max_chars` символов, добавив `...`.
///
/// `None` (tombstone) рендерится как `"null"`.
pub fn truncate_payload(payload: Option<&str>, max_chars: usize) -> String {
    let Some(payload) = payload else {
        return "null".to_string();
    };
    match payload.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &payload[..cut]),
        None => payload.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_payload_is_untouched() {
        assert_eq!(truncate_payload(Some("hello"), 50), "hello");
        assert_eq!(truncate_payload(Some(&"a".repeat(50)), 50), "a".repeat(50));
    }

    #[test]
    fn long_payload_is_cut_with_ellipsis() {
        let long = "b".repeat(120);
        let cut = truncate_payload(Some(&long), 100);
        assert_eq!(cut.len(), 103);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn cuts_on_char_boundary() {
        let cyr = "тест".repeat(20);
        let cut = truncate_payload(Some(&cyr), 50);
        assert_eq!(cut.chars().count(), 53);
    }

    #[test]
    fn null_payload_renders_null() {
        assert_eq!(truncate_payload(None, 100), "null");
    }
}
