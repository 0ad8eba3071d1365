// src/utils/html.rs

/// Strips unsafe markup from user-supplied text that clients render
/// (question and answer text, category names and descriptions).
///
/// Whitelist-based: harmless formatting tags survive, `<script>` and
/// friends are removed together with their content.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input).trim().to_string()
}

/// Sanitizes an optional field, collapsing blank results to `None`.
pub fn clean_optional(input: Option<&str>) -> Option<String> {
    input.map(clean_html).filter(|s| !s.is_empty())
}
