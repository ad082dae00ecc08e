//! Turns raw timeline tweets into [`MessageUnit`]s.
//!
//! Normalization is pure and never fails: malformed entity spans or missing
//! media fields degrade to plain text and fewer attachments.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{
    MediaAttachment, MediaEntity, MediaKind, MessageUnit, PostKind, RawPost, UrlEntity,
};

/// Prefix marking reshared content.
pub const RECYCLED_MARKER: char = '\u{267B}';

static TRAILING_SHORT_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)https://t\.co/[0-9A-Za-z]+$").expect("valid short link regex"));

pub fn normalize(post: &RawPost) -> MessageUnit {
    let mut media = Vec::new();
    let mut link_candidates: Vec<String> = Vec::new();

    let text = match &post.kind {
        PostKind::Original => {
            collect_media(post.media.as_deref(), &mut media);
            link_candidates.extend(expanded_urls(&post.urls));
            render_text(&post.full_text, &post.urls, post.media.as_deref())
        }
        PostKind::Retweet { of } => {
            // The wrapper repeats the original's media; prefer the original's own block.
            let shared_media = of.media.as_deref().or(post.media.as_deref());
            collect_media(shared_media, &mut media);
            link_candidates.extend(expanded_urls(&of.urls));
            format!(
                "{} @{}: {}",
                RECYCLED_MARKER,
                of.user_screen_name,
                render_text(&of.full_text, &of.urls, shared_media)
            )
        }
        PostKind::Quote { of } => {
            let (own_text, own_urls) = strip_quote_link(&post.full_text, &post.urls);
            collect_media(of.media.as_deref(), &mut media);
            collect_media(post.media.as_deref(), &mut media);
            link_candidates.extend(expanded_urls(&own_urls));
            link_candidates.extend(expanded_urls(&of.urls));

            let own = render_text(own_text, &own_urls, post.media.as_deref());
            let quoted = render_text(&of.full_text, &of.urls, of.media.as_deref());
            format!(
                "{}\n{} @{}: {}",
                own, RECYCLED_MARKER, of.user_screen_name, quoted
            )
        }
    };

    let link_url = match media.first() {
        Some(first) => Some(first.url.clone()),
        None => link_candidates.into_iter().find(|u| !u.is_empty()),
    };

    MessageUnit {
        id: post.id,
        text,
        created_at: post.created_at,
        user_name: post.user_name.clone(),
        user_screen_name: post.user_screen_name.clone(),
        media,
        link_url,
    }
}

fn expanded_urls(urls: &[UrlEntity]) -> impl Iterator<Item = String> + '_ {
    urls.iter().map(|u| u.expanded_url.clone())
}

fn collect_media(entities: Option<&[MediaEntity]>, out: &mut Vec<MediaAttachment>) {
    for entity in entities.unwrap_or_default() {
        if let Some(attachment) = attachment_for(entity) {
            out.push(attachment);
        }
    }
}

/// Videos resolve to their highest-bitrate variant; everything else is a photo.
fn attachment_for(entity: &MediaEntity) -> Option<MediaAttachment> {
    if let Some(variants) = entity.video_variants.as_deref().filter(|v| !v.is_empty()) {
        let best = variants
            .iter()
            .filter(|v| v.bitrate.is_some() && !v.url.is_empty())
            .max_by_key(|v| v.bitrate)
            .or_else(|| variants.iter().find(|v| !v.url.is_empty()));
        if let Some(best) = best {
            return Some(MediaAttachment {
                kind: MediaKind::Video,
                url: best.url.clone(),
            });
        }
    }
    if entity.media_url_https.is_empty() {
        return None;
    }
    Some(MediaAttachment {
        kind: MediaKind::Photo,
        url: entity.media_url_https.clone(),
    })
}

/// Drop the permalink the API appends to a quote tweet, together with any
/// entity that pointed into the removed tail.
fn strip_quote_link<'a>(text: &'a str, urls: &[UrlEntity]) -> (&'a str, Vec<UrlEntity>) {
    let Some(m) = TRAILING_SHORT_LINK.find(text) else {
        return (text, urls.to_vec());
    };
    let kept = &text[..m.start()];
    let kept_chars = kept.chars().count();
    let kept_urls = urls
        .iter()
        .filter(|u| u.indices.1 <= kept_chars)
        .cloned()
        .collect();
    (kept, kept_urls)
}

/// Build display text for one tweet body.
///
/// Entity spans are character offsets into the raw (still HTML-escaped)
/// text. Each span is replaced exactly once: short links by their expanded
/// form, media links by nothing. A span that does not cover its short link is
/// relocated to the first untouched occurrence of that link.
pub fn render_text(full_text: &str, urls: &[UrlEntity], media: Option<&[MediaEntity]>) -> String {
    let chars: Vec<char> = full_text.chars().collect();
    let mut spans: Vec<(usize, usize, &str)> = Vec::new();

    let url_edits = urls
        .iter()
        .map(|u| (u.url.as_str(), u.indices, u.expanded_url.as_str()));
    let media_edits = media
        .unwrap_or_default()
        .iter()
        .map(|m| (m.url.as_str(), m.indices, ""));

    for (short, (start, end), replacement) in url_edits.chain(media_edits) {
        if short.is_empty() {
            continue;
        }
        let span = if span_matches(&chars, start, end, short) {
            Some((start, end))
        } else {
            locate(&chars, short, &spans)
        };
        let Some((start, end)) = span else {
            continue;
        };
        if overlaps(&spans, start, end) {
            continue;
        }
        spans.push((start, end, replacement));
    }
    spans.sort_by_key(|s| s.0);

    let mut out = String::with_capacity(full_text.len());
    let mut pos = 0;
    for (start, end, replacement) in spans {
        let segment: String = chars[pos..start].iter().collect();
        out.push_str(&unescape_html(&segment));
        out.push_str(replacement);
        pos = end;
    }
    let tail: String = chars[pos..].iter().collect();
    out.push_str(&unescape_html(&tail));

    out.trim_end().to_string()
}

fn span_matches(chars: &[char], start: usize, end: usize, short: &str) -> bool {
    start < end && end <= chars.len() && chars[start..end].iter().copied().eq(short.chars())
}

fn overlaps(spans: &[(usize, usize, &str)], start: usize, end: usize) -> bool {
    spans.iter().any(|&(s, e, _)| start < e && s < end)
}

fn locate(chars: &[char], short: &str, taken: &[(usize, usize, &str)]) -> Option<(usize, usize)> {
    let needle: Vec<char> = short.chars().collect();
    if needle.len() > chars.len() {
        return None;
    }
    (0..=chars.len() - needle.len())
        .map(|start| (start, start + needle.len()))
        .find(|&(start, end)| chars[start..end] == needle[..] && !overlaps(taken, start, end))
}

/// Decode the HTML character references the timeline API emits.
pub fn unescape_html(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        match candidate.find(';').filter(|&semi| semi <= 10) {
            Some(semi) => match decode_entity(&candidate[1..semi]) {
                Some(ch) => {
                    out.push(ch);
                    rest = &candidate[semi + 1..];
                }
                None => {
                    out.push('&');
                    rest = &candidate[1..];
                }
            },
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}
