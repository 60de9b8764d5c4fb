use ammonia;

/// Clean HTML content using the ammonia library.
///
/// Project descriptions and request messages are user-supplied and rendered
/// by arbitrary clients, so they are sanitized on the way in: safe tags
/// (like <b>, <p>) survive, dangerous tags (<script>, <iframe>) and
/// malicious attributes (onclick) are stripped.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
