use ammonia;

/// Sanitizes user-authored text (assessment, question and choice
/// descriptions) with ammonia's whitelist-based cleaner.
///
/// Keeps harmless formatting tags while stripping scripts, iframes and event
/// handler attributes, so stored question text can be rendered as-is.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
