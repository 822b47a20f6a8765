//! Text and URL cleanup shared by the extractor and the feed writer.

use html_escape::decode_html_entities;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use url::form_urlencoded;
use url::Url;

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

/// Cap text elements to avoid enormous feed entries (truncate with ellipsis)
pub const MAX_TEXT_LEN: usize = 4096;

/// NFKC-normalize, turn non-breaking spaces into spaces and collapse runs of whitespace.
pub fn clean_text(s: &str) -> String {
    let out = s.nfkc().collect::<String>().replace('\u{00A0}', " ");
    RE_WHITESPACE.replace_all(&out, " ").trim().to_string()
}

/// Join the text nodes of an element and clean the result.
pub fn joined_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    clean_text(&parts.collect::<Vec<_>>().join(" "))
}

/// Remove markup, decode entities once and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let without_tags = RE_TAG.replace_all(html, " ");
    clean_text(&decode_html_entities(&without_tags))
}

/// Strip characters XML 1.0 cannot carry and bound the length.
pub fn sanitize_xml_text(input: &str) -> String {
    // Remove Cc control characters except tab(0x09), LF(0x0A), CR(0x0D)
    let mut s: String = input
        .chars()
        .filter(|&c| {
            let code = c as u32;
            code == 0x09 || code == 0x0A || code == 0x0D || code >= 0x20
        })
        .collect();

    if s.len() > MAX_TEXT_LEN {
        let mut cut = MAX_TEXT_LEN;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push_str("… (truncated)");
    }
    s
}

/// Resolve an `href` against the page URL. Returns `None` for fragments and
/// non-navigational schemes.
pub fn resolve_href(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("mailto:")
        || href.starts_with("javascript:")
    {
        return None;
    }
    base.join(href).ok().map(Into::<String>::into)
}

/// Canonical form for article links: no fragment, no tracking query params.
pub fn canonicalize_link(s: &str) -> String {
    let Ok(mut u) = Url::parse(s) else {
        return s.to_string();
    };
    u.set_fragment(None);
    if let Some(q) = u.query() {
        let pairs = form_urlencoded::parse(q.as_bytes())
            .into_owned()
            .filter(|(k, _)| {
                let kl = k.to_lowercase();
                !(kl.starts_with("utm_") || kl == "fbclid" || kl == "gclid")
            })
            .collect::<Vec<(String, String)>>();
        if pairs.is_empty() {
            u.set_query(None);
        } else {
            let mut ser = form_urlencoded::Serializer::new(String::new());
            for (k, v) in &pairs {
                ser.append_pair(k, v);
            }
            let newq = ser.finish();
            u.set_query(Some(&newq));
        }
    }
    u.into()
}
