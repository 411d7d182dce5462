//! Minimal HTML helpers for the scrape-only refresh path.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub text: String,
}

static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#).expect("static regex")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));

static WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Known crawler-block fingerprints: robots meta with a noindex directive.
static BLOCK_FINGERPRINTS: LazyLock<[Regex; 2]> = LazyLock::new(|| [
    Regex::new(r#"<meta\s+name\s*=\s*["']ROBOTS["']\s+content\s*=\s*["'][^"']*NOINDEX[^"']*["']"#).expect("static regex"),
    Regex::new(r#"<meta\s+name\s*=\s*["']robots["']\s+content\s*=\s*["'][^"']*noindex[^"']*["']"#).expect("static regex"),
]);

/// All anchors of a page, hrefs resolved against `base_url`, link text stripped of markup.
pub fn extract_links(html: &str, base_url: &str) -> Vec<Link> {
    ANCHOR.captures_iter(html)
        .map(|cap| Link {
            href: resolve_url(base_url, &decode_entities(&cap[1])),
            text: clean_text(&cap[2]),
        })
        .collect()
}

/// Strips tags, decodes the common entities and collapses whitespace.
pub fn clean_text(fragment: &str) -> String {
    let no_tags = TAG.replace_all(fragment, " ");
    let decoded = decode_entities(&no_tags);
    WS.replace_all(decoded.trim(), " ").into_owned()
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

/// True if the page is a crawler-block page rather than real content.
pub fn is_blocked_page(html: &str) -> bool {
    BLOCK_FINGERPRINTS.iter().any(|re| re.is_match(html))
}

/// Resolves `href` against the page URL; an unparsable pair keeps `href` as written.
pub fn resolve_url(base_url: &str, href: &str) -> String {
    let href = href.trim();
    match Url::parse(base_url).and_then(|base| base.join(href)) {
        Ok(url) => url.into(),
        Err(_) => href.to_string(),
    }
}
