//! Shared utility functions for the sitecraft crate.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum slug length for websites, pages, and vCards.
pub const MAX_SLUG_LEN: usize = 60;

static SLUG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,58}[a-z0-9])?$").expect("slug regex is valid")
});

static HEX_COLOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("color regex is valid"));

/// Derive a URL slug from free text.
///
/// Lowercase ASCII alphanumerics are kept; every run of anything else becomes
/// a single `-`. Leading/trailing dashes are trimmed and the result is capped
/// at [`MAX_SLUG_LEN`].
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(lower);
        } else {
            pending_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }
    slug.truncate(MAX_SLUG_LEN);
    slug.trim_end_matches('-').to_string()
}

pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_RE.is_match(slug)
}

pub fn is_valid_hex_color(color: &str) -> bool {
    HEX_COLOR_RE.is_match(color)
}

/// Minimal email shape check: something before `@`, a dot in the domain.
pub fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

/// Escape text for inclusion in HTML bodies and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn has_control_chars(text: &str) -> bool {
    text.chars().any(char::is_control)
}

/// Return the trimmed URL if it is relative or uses http, https, mailto, or
/// tel. Anything else (`javascript:`, `data:`, ...) yields `None`.
pub fn safe_url(url: &str) -> Option<&str> {
    let url = url.trim();
    if has_control_chars(url) {
        return None;
    }
    match url.find([':', '/', '?', '#']) {
        Some(i) if url[i..].starts_with(':') => {
            let scheme = url[..i].to_ascii_lowercase();
            matches!(scheme.as_str(), "http" | "https" | "mailto" | "tel").then_some(url)
        }
        _ => Some(url),
    }
}

/// Extract a JSON object from text that may contain other content.
/// Uses brace-counting to find the outermost JSON object.
pub fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = start;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = start + i + 1;
                    break;
                }
            }
            _ => {}
        }
    }

    if depth == 0 && end > start {
        Some(text[start..end].to_string())
    } else {
        None
    }
}

/// Truncate to at most `max` characters without splitting a char.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("My Great Site"), "my-great-site");
        assert_eq!(slugify("  --Hello,   World!! "), "hello-world");
        assert_eq!(slugify("Café 2024"), "caf-2024");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slugify_caps_length() {
        let long = "a".repeat(100);
        assert_eq!(slugify(&long).len(), MAX_SLUG_LEN);
        let dashy = format!("{} b", "a".repeat(59));
        let slug = slugify(&dashy);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_slugify_output_is_valid_slug() {
        for input in ["Acme Corp", "x", "Landing page #3", "2024 launch"] {
            assert!(is_valid_slug(&slugify(input)), "{}", input);
        }
    }

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("acme"));
        assert!(is_valid_slug("a-b-c"));
        assert!(is_valid_slug("0"));
        assert!(!is_valid_slug("-acme"));
        assert!(!is_valid_slug("acme-"));
        assert!(!is_valid_slug("Acme"));
        assert!(!is_valid_slug("ac me"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug(&"a".repeat(61)));
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("ada@example.com"));
        assert!(!is_valid_email("ada@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ada.example.com"));
        assert!(!is_valid_email("ada@@example.com"));
    }

    #[test]
    fn test_is_valid_hex_color() {
        assert!(is_valid_hex_color("#1f2937"));
        assert!(is_valid_hex_color("#ABCDEF"));
        assert!(!is_valid_hex_color("1f2937"));
        assert!(!is_valid_hex_color("#fff"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_safe_url() {
        for ok in [
            "https://example.com",
            "HTTP://example.com",
            "mailto:ada@example.com",
            "tel:+4420",
            "/media/3",
            "about-us",
            "#top",
            "?q=1:2",
        ] {
            assert_eq!(safe_url(ok), Some(ok), "{}", ok);
        }
        for bad in [
            "javascript:alert(1)",
            " JavaScript:alert(1)",
            "java\tscript:alert(1)",
            "data:text/html,<script>",
            "vbscript:x",
            "https://a.example\nx",
        ] {
            assert_eq!(safe_url(bad), None, "{}", bad);
        }
    }

    #[test]
    fn test_has_control_chars() {
        assert!(has_control_chars("555\nEND:VCARD"));
        assert!(has_control_chars("a\rb"));
        assert!(!has_control_chars("+44 20 1234"));
    }

    #[test]
    fn test_extract_json_object_with_prefix() {
        let text = r#"Here is the JSON: {"key": "value"} thanks"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"key": "value"}"#.to_string())
        );
    }

    #[test]
    fn test_extract_json_object_ignores_braces_in_strings() {
        let text = r#"```json
{"text": "use { and } freely", "n": {"a": 1}}
```"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"text": "use { and } freely", "n": {"a": 1}}"#.to_string())
        );
    }

    #[test]
    fn test_extract_json_object_unclosed() {
        assert_eq!(extract_json_object(r#"{"key": "value""#), None);
        assert_eq!(extract_json_object("No JSON here"), None);
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
