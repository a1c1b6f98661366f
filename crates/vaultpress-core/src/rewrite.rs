//! Rewrites note bodies into Hugo markdown.
//!
//! Each pass is a pure `&str -> String` function. [`rewrite_note`] runs them in a
//! fixed order: wikilinks, callouts, media embeds, tag stripping, table of contents.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::config::ConversionConfig;
use crate::links::LinkMap;
use crate::notes::{Note, TAG_RE, WIKILINK_RE};

static CALLOUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^>\s*\[!(\w+)\][+-]?\s*(.*)$").expect("callout regex"));

static PDF_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!?\[([^\]]+)\]\(([^)]+\.(?i:pdf))\)").expect("pdf link regex")
});

static GLTF_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!?\[([^\]]+)\]\(([^)]+\.(?i:gltf|glb))\)").expect("gltf link regex")
});

static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").expect("image regex"));

/// Callout type → admonition type.
const CALLOUT_TYPES: &[(&str, &str)] = &[
    ("note", "note"),
    ("warning", "warning"),
    ("error", "danger"),
    ("info", "info"),
    ("tip", "tip"),
    ("success", "success"),
    ("question", "question"),
    ("example", "example"),
    ("quote", "quote"),
    ("abstract", "abstract"),
    ("bug", "bug"),
    ("danger", "danger"),
    ("failure", "failure"),
    ("important", "important"),
    ("missing", "missing"),
    ("caution", "caution"),
    ("faq", "faq"),
];

/// A rewritten body plus the counts the pipeline reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenBody {
    pub body: String,
    pub links_converted: usize,
    pub tags_processed: usize,
}

/// Runs every enabled pass over `note.body`.
pub fn rewrite_note(note: &Note, link_map: &LinkMap, config: &ConversionConfig) -> RewrittenBody {
    let mut body = note.body.clone();
    let mut links_converted = 0;
    let mut tags_processed = 0;

    if config.convert_wikilinks {
        body = resolve_wikilinks(&body, link_map);
        links_converted = note.outbound_links.len();
    }
    body = translate_callouts(&body);
    body = translate_media_embeds(&body);
    if config.convert_tags {
        body = strip_inline_tags(&body);
        tags_processed = note.tags.len();
    }
    if config.create_toc {
        body = inject_toc(&body, config.toc_max_depth);
    }

    RewrittenBody {
        body,
        links_converted,
        tags_processed,
    }
}

/// `[[target|display]]` → `[display](destination)`.
///
/// External URLs and `#anchors` keep their target; other targets resolve through
/// `link_map` and fall back to the target itself when unknown.
pub fn resolve_wikilinks(body: &str, link_map: &LinkMap) -> String {
    WIKILINK_RE
        .replace_all(body, |caps: &Captures| {
            let target = caps[1].trim();
            let display = caps.get(2).map_or(target, |m| m.as_str());
            let destination = if is_external(target) || target.starts_with('#') {
                target
            } else if let Some(mapped) = link_map.get(target) {
                mapped
            } else {
                tracing::debug!(%target, "unresolved wikilink");
                target
            };
            format!("[{display}]({destination})")
        })
        .into_owned()
}

fn is_external(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

/// `> [!type] ...` blocks → `admonition` shortcodes.
///
/// The marker line and every following `>` line form the block. Running this on
/// its own output changes nothing.
pub fn translate_callouts(body: &str) -> String {
    let lines: Vec<&str> = body.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let Some(caps) = CALLOUT_RE.captures(lines[i].trim_end_matches('\r')) else {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        };
        let kind = caps[1].to_lowercase();
        let mut content: Vec<&str> = vec![caps.get(2).map_or("", |m| m.as_str())];
        i += 1;
        while i < lines.len() && lines[i].starts_with('>') {
            content.push(strip_quote_marker(lines[i]));
            i += 1;
        }
        out.push(admonition(&kind, content.join("\n").trim()));
    }
    out.join("\n")
}

fn strip_quote_marker(line: &str) -> &str {
    let line = line.trim_end_matches('\r');
    let rest = line.strip_prefix('>').unwrap_or(line);
    rest.strip_prefix(' ').unwrap_or(rest)
}

fn admonition(kind: &str, content: &str) -> String {
    let target = CALLOUT_TYPES
        .iter()
        .find(|(from, _)| *from == kind)
        .map_or("note", |(_, to)| *to);
    format!(
        "{{{{< admonition type=\"{target}\" title=\"{}\" >}}}}\n{content}\n{{{{< /admonition >}}}}",
        capitalize(kind)
    )
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// PDF links, then glTF/GLB links, then images, each to its viewer shortcode.
///
/// PDF and 3D links go first so a `![..](x.pdf)` embed is not claimed by the image pass.
pub fn translate_media_embeds(body: &str) -> String {
    let body = PDF_LINK_RE.replace_all(body, |caps: &Captures| {
        format!("{{{{< pdf-viewer url=\"{}\" title=\"{}\" >}}}}", &caps[2], &caps[1])
    });
    let body = GLTF_LINK_RE.replace_all(&body, |caps: &Captures| {
        format!("{{{{< gltf-viewer url=\"{}\" title=\"{}\" >}}}}", &caps[2], &caps[1])
    });
    IMAGE_RE
        .replace_all(&body, |caps: &Captures| {
            format!("{{{{< image src=\"{}\" alt=\"{}\" >}}}}", &caps[2], &caps[1])
        })
        .into_owned()
}

/// Removes inline `#tags`; everything around them is left untouched.
///
/// Runs after wikilink resolution and does not recognise link syntax, so heading
/// fragments in resolved links are stripped too: `[[#Heading]]` ends up as `[]()`.
pub fn strip_inline_tags(body: &str) -> String {
    TAG_RE.replace_all(body, "").into_owned()
}

/// Prepends a `toc` shortcode and a blank line.
pub fn inject_toc(body: &str, max_depth: u32) -> String {
    format!("{{{{< toc maxdepth=\"{max_depth}\" >}}}}\n\n{body}")
}
