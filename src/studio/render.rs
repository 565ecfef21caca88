//! Server-side HTML for published websites.

use serde_json::Value;

use super::models::{Element, PageTree, SectionDetail};
use crate::util::{escape_html, safe_url};

/// Render a full HTML document for a published page.
///
/// Editor output wins when present; otherwise the section/element tree is
/// rendered in position order.
pub fn render_page(tree: &PageTree) -> String {
    let page = &tree.page;
    let body = if page.html.trim().is_empty() {
        render_sections(&tree.sections)
    } else {
        page.html.clone()
    };
    let title = if page.is_home {
        escape_html(&tree.website.name)
    } else {
        format!(
            "{} | {}",
            escape_html(&page.title),
            escape_html(&tree.website.name)
        )
    };
    let description = if page.meta_description.is_empty() {
        &tree.website.description
    } else {
        &page.meta_description
    };

    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n<meta name=\"description\" content=\"{}\">\n\
         <style>{}</style>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        title,
        escape_html(description),
        sanitize_css(&page.css),
        body
    )
}

/// Keep editor CSS from closing the surrounding `<style>` element.
fn sanitize_css(css: &str) -> String {
    css.replace("</", "<\\/")
}

pub fn render_sections(sections: &[SectionDetail]) -> String {
    let mut out = String::new();
    for detail in sections {
        let section = &detail.section;
        out.push_str(&format!(
            "<section class=\"sc-section sc-{}\"{}>\n",
            escape_html(&css_ident(&section.kind)),
            style_attr(&section.style)
        ));
        if let Some(title) = text_field(&section.content, "title") {
            out.push_str(&format!("<h2>{}</h2>\n", escape_html(title)));
        }
        for element in &detail.elements {
            out.push_str(&render_element(element));
            out.push('\n');
        }
        out.push_str("</section>\n");
    }
    out
}

pub fn render_element(element: &Element) -> String {
    let content = &element.content;
    let style = style_attr(&element.style);
    let text = text_field(content, "text").unwrap_or("");
    match element.kind.as_str() {
        "heading" => format!("<h2{}>{}</h2>", style, escape_html(text)),
        "text" => format!("<p{}>{}</p>", style, escape_html(text)),
        "image" => format!(
            "<img{} src=\"{}\" alt=\"{}\">",
            style,
            escape_html(text_field(content, "src").and_then(safe_url).unwrap_or("")),
            escape_html(text_field(content, "alt").unwrap_or(""))
        ),
        "button" | "link" => format!(
            "<a class=\"sc-{}\"{} href=\"{}\">{}</a>",
            element.kind,
            style,
            escape_html(text_field(content, "href").and_then(safe_url).unwrap_or("#")),
            escape_html(text)
        ),
        "html" => text_field(content, "html").unwrap_or("").to_string(),
        other => format!(
            "<div class=\"sc-{}\"{}>{}</div>",
            escape_html(&css_ident(other)),
            style,
            escape_html(text)
        ),
    }
}

fn text_field<'a>(content: &'a Value, key: &str) -> Option<&'a str> {
    content.get(key).and_then(Value::as_str)
}

fn css_ident(kind: &str) -> String {
    kind.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

/// `fontSize` → `font-size`. Already-kebab keys pass through.
pub fn kebab_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            if !out.is_empty() {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
        } else if ch == '_' {
            out.push('-');
        } else {
            out.push(ch);
        }
    }
    out
}

/// Turn a JSON style object into inline CSS declarations.
pub fn inline_css(style: &Value) -> String {
    let Some(map) = style.as_object() else {
        return String::new();
    };
    let mut decls = Vec::new();
    for (key, value) in map {
        let value = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => continue,
        };
        if value.contains(['{', '}', ';']) {
            continue;
        }
        decls.push(format!("{}: {};", kebab_case(key), value));
    }
    decls.join(" ")
}

fn style_attr(style: &Value) -> String {
    let css = inline_css(style);
    if css.is_empty() {
        String::new()
    } else {
        format!(" style=\"{}\"", escape_html(&css))
    }
}
