// src/utils/html.rs

/// Sanitizes imported question text with ammonia.
///
/// Safe formatting tags (<b>, <code>, <p>, ...) survive, so pools can carry
/// light markup. Scripts, iframes and event-handler attributes are stripped,
/// since the client renders question content as HTML.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
