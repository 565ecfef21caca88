//! vCard 3.0 export and the public profile page.

use super::models::VCard;
use crate::util::{escape_html, safe_url};

/// Maximum octets per physical line before folding.
const FOLD_AT: usize = 75;

/// Escape a TEXT value: backslash, comma, semicolon, newline.
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ',' => out.push_str("\\,"),
            ';' => out.push_str("\\;"),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\\n");
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(ch),
        }
    }
    out
}

/// Fold a content line at [`FOLD_AT`] octets. Continuation lines begin
/// with a single space and never split a UTF-8 sequence.
pub fn fold_line(line: &str) -> String {
    if line.len() <= FOLD_AT {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + line.len() / FOLD_AT * 3);
    let mut budget = FOLD_AT;
    let mut used = 0;
    for ch in line.chars() {
        let width = ch.len_utf8();
        if used + width > budget {
            out.push_str("\r\n ");
            // The leading space counts toward the next line.
            budget = FOLD_AT - 1;
            used = 0;
        }
        out.push(ch);
        used += width;
    }
    out
}

/// Split a display name into (family, given) on the last space.
fn split_name(full_name: &str) -> (&str, &str) {
    let name = full_name.trim();
    match name.rsplit_once(' ') {
        Some((given, family)) => (family.trim(), given.trim()),
        None => (name, ""),
    }
}

/// Render a card as a vCard 3.0 document with CRLF line endings.
pub fn render_vcf(card: &VCard) -> String {
    let mut lines: Vec<String> = vec!["BEGIN:VCARD".into(), "VERSION:3.0".into()];
    // Structured values (N, ADR) arrive pre-escaped with `escape = false`.
    let mut push = |name: &str, value: &str, escape: bool| {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        // Unescaped values still must not break the CRLF line structure.
        let value = if escape {
            escape_text(value)
        } else {
            value.chars().filter(|c| !c.is_control()).collect()
        };
        lines.push(format!("{}:{}", name, value));
    };

    push("FN", &card.full_name, true);
    let (family, given) = split_name(&card.full_name);
    push(
        "N",
        &format!("{};{};;;", escape_text(family), escape_text(given)),
        false,
    );
    push("ORG", &card.company, true);
    push("TITLE", &card.job_title, true);
    push("EMAIL;TYPE=INTERNET", &card.email, false);
    push("TEL;TYPE=CELL", &card.phone, true);
    push("URL", &card.website_url, false);
    if !card.address.trim().is_empty() {
        // Street component only: ;;street;locality;region;code;country
        push(
            "ADR;TYPE=WORK",
            &format!(";;{};;;;", escape_text(card.address.trim())),
            false,
        );
    }
    push("NOTE", &card.bio, true);
    push("PHOTO;VALUE=URI", &card.avatar_url, false);
    if let Some(links) = card.social_links.as_object() {
        for (label, url) in links {
            if let Some(url) = url.as_str() {
                let label: String = label
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
                    .collect();
                if label.is_empty() {
                    continue;
                }
                push(&format!("X-SOCIALPROFILE;TYPE={}", label), url, false);
            }
        }
    }
    drop(push);
    lines.push("END:VCARD".into());

    let mut out = String::new();
    for line in lines {
        out.push_str(&fold_line(&line));
        out.push_str("\r\n");
    }
    out
}

/// `Content-Disposition` value for a card download.
pub fn attachment_header(card: &VCard) -> String {
    format!("attachment; filename=\"{}.vcf\"", card.slug)
}

/// Anchor for a user-supplied URL; unsafe schemes render as plain text.
fn link(url: &str) -> String {
    match safe_url(url) {
        Some(href) => format!(
            "<a href=\"{}\" rel=\"noopener\">{}</a>",
            escape_html(href),
            escape_html(url)
        ),
        None => escape_html(url),
    }
}

/// Public profile page for a published card.
pub fn render_profile_html(card: &VCard) -> String {
    let mut rows = String::new();
    let mut row = |label: &str, body: String| {
        rows.push_str(&format!(
            "<li><span class=\"label\">{}</span>{}</li>\n",
            label, body
        ));
    };
    if !card.email.is_empty() {
        let email = escape_html(&card.email);
        row("Email", format!("<a href=\"mailto:{0}\">{0}</a>", email));
    }
    if !card.phone.is_empty() {
        let phone = escape_html(&card.phone);
        row("Phone", format!("<a href=\"tel:{0}\">{0}</a>", phone));
    }
    if !card.website_url.is_empty() {
        row("Website", link(&card.website_url));
    }
    if !card.address.is_empty() {
        row("Address", escape_html(&card.address));
    }
    if let Some(links) = card.social_links.as_object() {
        for (label, url) in links {
            if let Some(url) = url.as_str() {
                row(&escape_html(label), link(url));
            }
        }
    }

    let avatar = match safe_url(&card.avatar_url).filter(|url| !url.is_empty()) {
        Some(url) => format!(
            "<img class=\"avatar\" src=\"{}\" alt=\"{}\">",
            escape_html(url),
            escape_html(&card.full_name)
        ),
        None => String::new(),
    };
    let headline = [card.job_title.as_str(), card.company.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| escape_html(s))
        .collect::<Vec<_>>()
        .join(" · ");
    let bio = if card.bio.is_empty() {
        String::new()
    } else {
        format!("<p class=\"bio\">{}</p>", escape_html(&card.bio))
    };

    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{name}</title>
<style>
body {{ margin: 0; font-family: system-ui, sans-serif; background: #f3f4f6; color: #111827; }}
.card {{ max-width: 420px; margin: 48px auto; background: #fff; border-radius: 16px; overflow: hidden; box-shadow: 0 10px 30px rgba(0,0,0,.08); }}
.banner {{ background: {color}; height: 96px; }}
.body {{ padding: 0 24px 24px; text-align: center; }}
.avatar {{ width: 96px; height: 96px; border-radius: 50%; border: 4px solid #fff; margin-top: -48px; object-fit: cover; }}
ul {{ list-style: none; padding: 0; text-align: left; }}
li {{ padding: 8px 0; border-bottom: 1px solid #e5e7eb; }}
.label {{ display: inline-block; width: 90px; color: #6b7280; }}
.save {{ display: inline-block; margin-top: 16px; padding: 10px 20px; border-radius: 8px; background: {color}; color: #fff; text-decoration: none; }}
</style>
</head>
<body>
<div class="card">
<div class="banner"></div>
<div class="body">
{avatar}
<h1>{name}</h1>
<p class="headline">{headline}</p>
{bio}
<ul>
{rows}</ul>
<a class="save" href="/v/{slug}/contact.vcf">Save contact</a>
</div>
</div>
</body>
</html>
"#,
        name = escape_html(&card.full_name),
        color = escape_html(&card.theme_color),
        avatar = avatar,
        headline = headline,
        bio = bio,
        rows = rows,
        slug = escape_html(&card.slug),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn card() -> VCard {
        VCard {
            id: 1,
            user_id: 1,
            slug: "ada".into(),
            full_name: "Ada King Lovelace".into(),
            job_title: "Analyst".into(),
            company: "Engines, Ltd; London".into(),
            email: "ada@example.com".into(),
            phone: "+44 20 1234".into(),
            website_url: "https://ada.example.com".into(),
            address: "12 St James's Square".into(),
            bio: "Line one\nLine two".into(),
            avatar_url: String::new(),
            theme_color: "#1f2937".into(),
            social_links: json!({"github": "https://github.com/ada"}),
            published: true,
            view_count: 0,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text(r"a\b,c;d"), r"a\\b\,c\;d");
        assert_eq!(escape_text("x\r\ny\nz"), r"x\ny\nz");
    }

    #[test]
    fn test_render_vcf_fields() {
        let vcf = render_vcf(&card());
        assert!(vcf.starts_with("BEGIN:VCARD\r\nVERSION:3.0\r\n"));
        assert!(vcf.ends_with("END:VCARD\r\n"));
        assert!(vcf.contains("FN:Ada King Lovelace\r\n"));
        assert!(vcf.contains("N:Lovelace;Ada King;;;\r\n"));
        assert!(vcf.contains("ORG:Engines\\, Ltd\\; London\r\n"));
        assert!(vcf.contains("TITLE:Analyst\r\n"));
        assert!(vcf.contains("EMAIL;TYPE=INTERNET:ada@example.com\r\n"));
        assert!(vcf.contains("TEL;TYPE=CELL:+44 20 1234\r\n"));
        assert!(vcf.contains("ADR;TYPE=WORK:;;12 St James's Square;;;;\r\n"));
        assert!(vcf.contains("NOTE:Line one\\nLine two\r\n"));
        assert!(vcf.contains("X-SOCIALPROFILE;TYPE=github:https://github.com/ada\r\n"));
        // No bare LF anywhere.
        assert!(!vcf.replace("\r\n", "").contains('\n'));
    }

    #[test]
    fn test_render_vcf_keeps_line_structure_with_dirty_values() {
        let mut c = card();
        c.phone = "555\nEND:VCARD\nBEGIN:VCARD\nFN:Mallory".into();
        c.website_url = "https://a.example\nNOTE:injected".into();
        c.email = "ada@example.com\r\nX-EVIL:1".into();
        c.avatar_url = "/media/3\n".into();
        c.social_links = json!({"github": "https://github.com/ada\r\nEND:VCARD"});
        let vcf = render_vcf(&c);
        assert!(!vcf.replace("\r\n", "").contains('\n'));
        assert!(!vcf.replace("\r\n", "").contains('\r'));
        assert!(vcf.starts_with("BEGIN:VCARD\r\n"));
        assert!(!vcf.contains("\r\nBEGIN:VCARD"));
        assert_eq!(vcf.matches("\r\nEND:VCARD\r\n").count(), 1);
        assert!(!vcf.contains("\r\nNOTE:injected"));
        assert!(!vcf.contains("\r\nX-EVIL"));
        assert!(vcf.contains("TEL;TYPE=CELL:555\\nEND:VCARD\\nBEGIN:VCARD\\nFN:Mallory\r\n"));
    }

    #[test]
    fn test_render_vcf_omits_empty_fields() {
        let mut c = card();
        c.full_name = "Plato".into();
        c.company.clear();
        c.job_title.clear();
        c.address.clear();
        c.social_links = json!({});
        let vcf = render_vcf(&c);
        assert!(vcf.contains("N:Plato;;;;\r\n"));
        assert!(!vcf.contains("ORG:"));
        assert!(!vcf.contains("TITLE:"));
        assert!(!vcf.contains("ADR"));
        assert!(!vcf.contains("PHOTO"));
        assert!(!vcf.contains("X-SOCIALPROFILE"));
    }

    #[test]
    fn test_fold_line_ascii() {
        let line = format!("NOTE:{}", "x".repeat(200));
        let folded = fold_line(&line);
        let parts: Vec<&str> = folded.split("\r\n").collect();
        assert!(parts.len() > 1);
        assert_eq!(parts[0].len(), 75);
        for part in &parts[1..] {
            assert!(part.starts_with(' '));
            assert!(part.len() <= 75);
        }
        let unfolded = folded.replace("\r\n ", "");
        assert_eq!(unfolded, line);
    }

    #[test]
    fn test_fold_line_respects_utf8_boundaries() {
        let line = format!("NOTE:{}", "é".repeat(100));
        let folded = fold_line(&line);
        for part in folded.split("\r\n") {
            assert!(part.len() <= 75, "{} octets", part.len());
        }
        assert_eq!(folded.replace("\r\n ", ""), line);
    }

    #[test]
    fn test_short_line_not_folded() {
        assert_eq!(fold_line("FN:Ada"), "FN:Ada");
    }

    #[test]
    fn test_attachment_header() {
        assert_eq!(attachment_header(&card()), "attachment; filename=\"ada.vcf\"");
    }

    #[test]
    fn test_profile_html_escapes_and_links() {
        let mut c = card();
        c.full_name = "<script>alert(1)</script>".into();
        let html = render_profile_html(&c);
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("/v/ada/contact.vcf"));
        assert!(html.contains("mailto:ada@example.com"));
        assert!(html.contains("#1f2937"));
    }

    #[test]
    fn test_profile_html_drops_script_urls() {
        let mut c = card();
        c.website_url = "javascript:fetch('/api/auth/me')".into();
        c.avatar_url = "javascript:alert(1)".into();
        c.social_links = json!({"x": "JavaScript:alert(2)", "github": "https://github.com/ada"});
        let html = render_profile_html(&c);
        assert!(!html.to_lowercase().contains("href=\"javascript:"));
        assert!(!html.contains("<img"));
        assert!(html.contains("javascript:fetch"));
        assert!(html.contains("href=\"https://github.com/ada\""));
    }
}
