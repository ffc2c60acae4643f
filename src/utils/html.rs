use ammonia;

/// Sanitizes instructor-authored text (exam, section and question titles).
///
/// Safe inline markup such as <b> survives; scripts, iframes and event
/// handler attributes are removed. Surrounding whitespace is trimmed.
pub fn sanitize_text(input: &str) -> String {
    ammonia::clean(input.trim())
}
