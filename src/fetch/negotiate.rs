//! Content-type negotiation against an Accept header
//!
//! The most specific Accept entry matching a media type decides: an exact
//! `type/subtype` beats `type/*`, which beats `*/*`. The type is acceptable
//! when that entry's quality is above zero, so `text/*;q=0` excludes text
//! even if `*/*` is present.

/// One media range from an Accept header
#[derive(Debug, Clone, PartialEq)]
struct MediaRange {
    kind: String,
    subtype: String,
    quality: f32,
}

impl MediaRange {
    /// Matching specificity, or `None` if the range does not cover the type
    fn specificity(&self, kind: &str, subtype: &str) -> Option<u8> {
        match (self.kind.as_str(), self.subtype.as_str()) {
            ("*", "*") => Some(0),
            (k, "*") if k == kind => Some(1),
            (k, s) if k == kind && s == subtype => Some(2),
            _ => None,
        }
    }
}

/// Parses an Accept header, skipping malformed entries
fn parse_accept(accept: &str) -> Vec<MediaRange> {
    accept
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let (kind, subtype) = parts.next()?.trim().split_once('/')?;
            let kind = kind.trim().to_ascii_lowercase();
            let subtype = subtype.trim().to_ascii_lowercase();
            if kind.is_empty() || subtype.is_empty() {
                return None;
            }

            let quality = parts
                .filter_map(|param| param.trim().split_once('='))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("q"))
                .and_then(|(_, value)| value.trim().parse::<f32>().ok())
                .map(|q| q.clamp(0.0, 1.0))
                .unwrap_or(1.0);

            Some(MediaRange {
                kind,
                subtype,
                quality,
            })
        })
        .collect()
}

/// Strips parameters from a Content-Type value and splits it
fn media_type(content_type: &str) -> Option<(String, String)> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    let (kind, subtype) = essence.split_once('/')?;
    if kind.is_empty() || subtype.is_empty() {
        return None;
    }
    Some((kind.to_string(), subtype.to_string()))
}

/// Quality the Accept header assigns to a content type
///
/// `None` means no entry covers the type. A missing or unparseable content
/// type is only covered by `*/*`.
pub fn quality(accept: &str, content_type: Option<&str>) -> Option<f32> {
    let ranges = parse_accept(accept);

    match content_type.and_then(media_type) {
        Some((kind, subtype)) => ranges
            .iter()
            .filter_map(|range| {
                range
                    .specificity(&kind, &subtype)
                    .map(|spec| (spec, range.quality))
            })
            .max_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)))
            .map(|(_, quality)| quality),
        None => ranges
            .iter()
            .filter(|range| range.kind == "*" && range.subtype == "*")
            .map(|range| range.quality)
            .max_by(f32::total_cmp),
    }
}

/// Returns true if the Accept header admits the content type
pub fn is_acceptable(accept: &str, content_type: Option<&str>) -> bool {
    quality(accept, content_type).is_some_and(|q| q > 0.0)
}
