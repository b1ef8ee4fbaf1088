//! Built-in HTML renderer.
//!
//! Uses [maud](https://maud.lambda.xyz/) for the document shell and
//! pulldown-cmark for markdown nodes. Element nodes come from content, so
//! their tag names are checked against [`ALLOWED_TAGS`] and attribute names
//! against a conservative pattern before anything is written; a violation
//! fails the artifact (R001) rather than emitting markup the author did not
//! write.
//!
//! ## Document shell
//!
//! - `<head>`: title, description, robots, canonical link, one
//!   `<link rel="alternate" hreflang>` per translation, Open Graph title and
//!   URL, then the theme stylesheet when the site has one.
//! - `<body>`: the resolved page, then the island runtime (when any
//!   component on the page has a behavior) and the client entry (when
//!   `client.inject` is on).

use super::{RenderArtifact, Renderer, ResolvedPage, RouteContext};
use crate::diagnostics::Diagnostic;
use crate::document::Node;
use crate::scan::THEME_PATH;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use pulldown_cmark::{Options, Parser, html as md_html};

pub const ALLOWED_TAGS: &[&str] = &[
    "a", "abbr", "article", "aside", "b", "blockquote", "br", "button", "caption", "cite",
    "code", "dd", "del", "details", "dfn", "div", "dl", "dt", "em", "figcaption", "figure",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "i", "img", "input",
    "ins", "kbd", "label", "li", "main", "mark", "nav", "ol", "p", "picture", "pre", "q", "s",
    "section", "select", "small", "source", "span", "strong", "sub", "summary", "sup", "table",
    "tbody", "td", "textarea", "tfoot", "th", "thead", "time", "tr", "u", "ul", "video",
];

const VOID_TAGS: &[&str] = &["br", "hr", "img", "input", "source"];

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "avif"];

pub struct HtmlRenderer;

impl Renderer for HtmlRenderer {
    fn extension(&self) -> &str {
        "html"
    }

    fn content_type(&self) -> &str {
        "text/html; charset=utf-8"
    }

    fn render(
        &self,
        page: &ResolvedPage<'_>,
        ctx: &RouteContext<'_>,
    ) -> Result<RenderArtifact, Vec<Diagnostic>> {
        let mut body = String::new();
        let mut errors = Vec::new();
        for node in &page.body {
            if let Err(message) = render_node(node, &mut body) {
                errors.push(ctx.fail(message));
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        let markup = document_shell(page, ctx, PreEscaped(body));
        Ok(RenderArtifact::new(
            String::new(),
            ctx.target,
            self.content_type(),
            markup.into_string().into_bytes(),
        ))
    }
}

fn document_shell(page: &ResolvedPage<'_>, ctx: &RouteContext<'_>, body: PreEscaped<String>) -> Markup {
    let meta = &page.document.meta;
    let title = meta.title.as_deref().unwrap_or(&ctx.route.path);
    let canonical = ctx.canonical_url(&ctx.route.path);
    let runtime = (!page.behaviors.is_empty()).then_some(ctx.config.render.islands.runtime.as_str());
    let entry = ctx
        .config
        .client
        .entry
        .as_deref()
        .filter(|_| ctx.config.client.inject);

    html! {
        (DOCTYPE)
        html lang=(ctx.route.locale) {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) }
                @if let Some(description) = &meta.description {
                    meta name="description" content=(description);
                }
                @if let Some(author) = &meta.author {
                    meta name="author" content=(author);
                }
                @if let Some(robots) = &meta.robots {
                    meta name="robots" content=(robots);
                }
                link rel="canonical" href=(canonical);
                @for alternate in &ctx.route.alternates {
                    link rel="alternate" hreflang=(alternate.locale) href=(ctx.canonical_url(&alternate.path));
                }
                meta property="og:title" content=(title);
                meta property="og:url" content=(canonical);
                meta property="og:type" content="website";
                @if let Some(description) = &meta.description {
                    meta property="og:description" content=(description);
                }
                @if ctx.has_theme {
                    link rel="stylesheet" href=(THEME_PATH);
                }
            }
            body {
                (body)
                @if let Some(runtime) = runtime {
                    script type="module" src=(runtime) {}
                }
                @if let Some(entry) = entry {
                    script type="module" src=(entry) {}
                }
            }
        }
    }
}

fn escape(value: &str) -> String {
    html! { (value) }.into_string()
}

fn is_valid_attr_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
}

fn markdown_to_html(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    let parser = Parser::new_ext(source, options);
    let mut out = String::new();
    md_html::push_html(&mut out, parser);
    out
}

/// Raw text inside `<script>`/`<style>` cannot be escaped, so a closing tag
/// inside it is rejected.
fn check_raw_text(tag: &str, text: &str) -> Result<(), String> {
    if text.to_ascii_lowercase().contains(&format!("</{tag}")) {
        return Err(format!("inline <{tag}> contains a closing </{tag}> tag"));
    }
    Ok(())
}

/// Append the HTML for a resolved node.
pub fn render_node(node: &Node, out: &mut String) -> Result<(), String> {
    match node {
        Node::Element {
            tag,
            attrs,
            children,
        } => {
            let tag = tag.to_ascii_lowercase();
            if !ALLOWED_TAGS.contains(&tag.as_str()) {
                return Err(format!("element <{tag}> is not allowed in content"));
            }
            out.push('<');
            out.push_str(&tag);
            for (name, value) in attrs {
                if !is_valid_attr_name(name) {
                    return Err(format!("invalid attribute name '{name}' on <{tag}>"));
                }
                out.push_str(&format!(" {name}=\"{}\"", escape(value)));
            }
            out.push('>');
            if VOID_TAGS.contains(&tag.as_str()) {
                return Ok(());
            }
            for child in children {
                render_node(child, out)?;
            }
            out.push_str(&format!("</{tag}>"));
        }
        Node::Text { value } => out.push_str(&escape(value)),
        Node::Markdown { source } => out.push_str(&markdown_to_html(source)),
        Node::Asset { path, alt } => {
            let ext = crate::assets::extension_of(path).to_ascii_lowercase();
            let markup = if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                html! { img src=(path) alt=(alt); }
            } else {
                let label = if alt.is_empty() { path } else { alt };
                html! { a href=(path) { (label) } }
            };
            out.push_str(&markup.into_string());
        }
        Node::Script { src, inline } => match (src, inline) {
            (Some(src), _) => out.push_str(&html! { script src=(src) {} }.into_string()),
            (None, Some(code)) => {
                check_raw_text("script", code)?;
                out.push_str(&format!("<script>{code}</script>"));
            }
            (None, None) => {}
        },
        Node::Style { href, inline } => match (href, inline) {
            (Some(href), _) => {
                out.push_str(&html! { link rel="stylesheet" href=(href); }.into_string())
            }
            (None, Some(css)) => {
                check_raw_text("style", css)?;
                out.push_str(&format!("<style>{css}</style>"));
            }
            (None, None) => {}
        },
        // Resolution removes these; an unresolved one renders as nothing.
        Node::Prop { .. } | Node::Include { .. } | Node::Component { .. } | Node::Slot => {}
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
