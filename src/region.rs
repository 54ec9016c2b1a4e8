//! Anchor-based region location over in-memory text buffers.
//!
//! The fundamental question this module answers is "which span of this buffer
//! should be replaced?". Spans are demarcated by human-meaningful anchors
//! (comment markers, identifiers, closing delimiters) rather than a grammar,
//! so every operation here is a bounded linear scan: no parser, no I/O, no
//! retained state. Callers own the buffer; every function either borrows it
//! or returns a fresh one.

use regex::Regex;
use std::fmt;
use thiserror::Error;

/// A literal substring or regex pattern used to locate a position in a buffer.
///
/// Matching is case-sensitive and leftmost-match-wins for both kinds.
#[derive(Debug, Clone)]
pub enum Anchor {
    /// Exact substring match
    Literal(String),
    /// Compiled regex match
    Pattern(Regex),
}

impl Anchor {
    /// Create a literal anchor.
    pub fn literal(text: impl Into<String>) -> Self {
        Anchor::Literal(text.into())
    }

    /// Create a pattern anchor from a regex string.
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Anchor::Pattern(Regex::new(pattern)?))
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anchor::Literal(text) => write!(f, "{text}"),
            Anchor::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl PartialEq for Anchor {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Anchor::Literal(a), Anchor::Literal(b)) => a == b,
            (Anchor::Pattern(a), Anchor::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl Eq for Anchor {}

/// Byte span of a located anchor occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorMatch {
    /// Start of the matched text (inclusive)
    pub start: usize,
    /// End of the matched text (exclusive)
    pub end: usize,
}

/// A half-open byte range `[start, end)` slated for replacement.
///
/// A region is a transient computation result. It is only meaningful against
/// the buffer it was computed from; nothing here pins the two together, so
/// callers must not reuse a region across buffer revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: usize,
    pub end: usize,
}

impl Region {
    pub fn new(start: usize, end: usize) -> Self {
        Region { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegionError {
    /// A required marker is missing from the buffer. Not retryable without
    /// changing the anchor configuration.
    #[error("anchor not found: {anchor}")]
    AnchorNotFound { anchor: String },

    /// The computed range is inverted or out of bounds. This signals a logic
    /// error in the anchor configuration, not a data problem.
    #[error("invalid region [{start}, {end}) in buffer of length {buffer_len}")]
    InvalidRegion {
        start: usize,
        end: usize,
        buffer_len: usize,
    },

    /// The patched buffer failed its post-conditions. The caller must discard
    /// the result and must not persist it.
    #[error(
        "verification failed: {} required string(s) missing, {} forbidden string(s) present",
        missing.len(),
        forbidden.len()
    )]
    VerificationFailed {
        missing: Vec<String>,
        forbidden: Vec<String>,
    },
}

/// Find the first occurrence of `anchor` at or after `from_index`.
///
/// Returns `None` if the anchor does not occur, or if `from_index` is past
/// the end of the buffer or not on a char boundary.
pub fn find_anchor(buffer: &str, anchor: &Anchor, from_index: usize) -> Option<AnchorMatch> {
    if from_index > buffer.len() || !buffer.is_char_boundary(from_index) {
        return None;
    }
    let tail = &buffer[from_index..];
    match anchor {
        Anchor::Literal(text) => tail.find(text.as_str()).map(|offset| AnchorMatch {
            start: from_index + offset,
            end: from_index + offset + text.len(),
        }),
        Anchor::Pattern(re) => re.find(tail).map(|m| AnchorMatch {
            start: from_index + m.start(),
            end: from_index + m.end(),
        }),
    }
}

/// Find the last occurrence of `anchor` strictly before `before_index`.
///
/// This is the backwards walk used to recover the start of an enclosing block
/// from a unique marker inside it (e.g. locate an `id="..."` attribute, then
/// walk back to the comment that opens the surrounding markup).
pub fn rfind_anchor(buffer: &str, anchor: &Anchor, before_index: usize) -> Option<AnchorMatch> {
    let limit = before_index.min(buffer.len());
    if !buffer.is_char_boundary(limit) {
        return None;
    }
    let head = &buffer[..limit];
    match anchor {
        Anchor::Literal(text) => head.rfind(text.as_str()).map(|offset| AnchorMatch {
            start: offset,
            end: offset + text.len(),
        }),
        Anchor::Pattern(re) => re.find_iter(head).last().map(|m| AnchorMatch {
            start: m.start(),
            end: m.end(),
        }),
    }
}

/// Move `index` back to the start of the line containing it.
pub fn extend_to_line_start(buffer: &str, index: usize) -> usize {
    let limit = index.min(buffer.len());
    match buffer[..limit].rfind('\n') {
        Some(newline) => newline + 1,
        None => 0,
    }
}

/// Move `index` forward to the end of the line containing it (the position of
/// the next newline, or the end of the buffer).
pub fn extend_to_line_end(buffer: &str, index: usize) -> usize {
    let from = index.min(buffer.len());
    match buffer[from..].find('\n') {
        Some(newline) => from + newline,
        None => buffer.len(),
    }
}

/// Scan forward from `from_index` past `depth` occurrences of `close_token`,
/// returning the position just after the last one.
///
/// # Known limitation
///
/// This is a heuristic occurrence counter, not a balanced-delimiter matcher.
/// It does not account for `close_token` appearing inside unrelated constructs
/// such as string literals or comments, and it does not track matching open
/// tokens. It approximates "skip past N closing brackets/tags" for generated
/// markup where the nesting depth is known by inspection. Where a structural
/// parser for the target format exists, prefer it over this function.
pub fn extend_to_balanced_close(
    buffer: &str,
    from_index: usize,
    close_token: &str,
    depth: usize,
) -> Option<usize> {
    if from_index > buffer.len() || !buffer.is_char_boundary(from_index) || close_token.is_empty() {
        return None;
    }
    let mut pos = from_index;
    for _ in 0..depth {
        let offset = buffer[pos..].find(close_token)?;
        pos += offset + close_token.len();
    }
    Some(pos)
}

/// Compute the region spanning from `start_anchor` through `end_anchor`.
///
/// The start position is the beginning of the first `start_anchor` match; the
/// end position is the end of the first `end_anchor` match found at or after
/// the end of the start match. If `end_anchor` is absent and a
/// `fallback_end_anchor` is supplied, the search is retried with it. The
/// returned region includes both anchor texts.
///
/// Fails with [`RegionError::AnchorNotFound`] naming the start anchor when it
/// is absent, or naming the configured end anchor when neither it nor the
/// fallback can be found.
pub fn locate_region(
    buffer: &str,
    start_anchor: &Anchor,
    end_anchor: &Anchor,
    fallback_end_anchor: Option<&Anchor>,
) -> Result<Region, RegionError> {
    let start = find_anchor(buffer, start_anchor, 0).ok_or_else(|| RegionError::AnchorNotFound {
        anchor: start_anchor.to_string(),
    })?;

    let end = find_anchor(buffer, end_anchor, start.end)
        .or_else(|| {
            fallback_end_anchor.and_then(|fallback| find_anchor(buffer, fallback, start.end))
        })
        .ok_or_else(|| RegionError::AnchorNotFound {
            anchor: end_anchor.to_string(),
        })?;

    Ok(Region::new(start.start, end.end))
}

/// Return a new buffer equal to `buffer[..region.start] + replacement +
/// buffer[region.end..]`.
///
/// Pure function; never mutates the input. Fails with
/// [`RegionError::InvalidRegion`] on inverted or out-of-bounds regions, or
/// when either boundary falls inside a multi-byte character.
pub fn apply_patch(buffer: &str, region: Region, replacement: &str) -> Result<String, RegionError> {
    let invalid = || RegionError::InvalidRegion {
        start: region.start,
        end: region.end,
        buffer_len: buffer.len(),
    };

    if region.start > region.end || region.end > buffer.len() {
        return Err(invalid());
    }
    if !buffer.is_char_boundary(region.start) || !buffer.is_char_boundary(region.end) {
        return Err(invalid());
    }

    let mut patched =
        String::with_capacity(buffer.len() - region.len() + replacement.len());
    patched.push_str(&buffer[..region.start]);
    patched.push_str(replacement);
    patched.push_str(&buffer[region.end..]);
    Ok(patched)
}

/// Post-condition check: the buffer must contain every string in
/// `must_contain` and none of the strings in `must_not_contain`.
///
/// Guards against silently persisting a broken or partial patch. The error
/// lists every failed condition, not just the first.
pub fn verify_patch(
    buffer: &str,
    must_contain: &[String],
    must_not_contain: &[String],
) -> Result<(), RegionError> {
    let missing: Vec<String> = must_contain
        .iter()
        .filter(|needle| !buffer.contains(needle.as_str()))
        .cloned()
        .collect();
    let forbidden: Vec<String> = must_not_contain
        .iter()
        .filter(|needle| buffer.contains(needle.as_str()))
        .cloned()
        .collect();

    if missing.is_empty() && forbidden.is_empty() {
        Ok(())
    } else {
        Err(RegionError::VerificationFailed { missing, forbidden })
    }
}

/// Find the buffer line most similar to `anchor_text`, for diagnostics when
/// an anchor is missing. Returns the 1-based line number and the line.
pub fn closest_line(buffer: &str, anchor_text: &str) -> Option<(usize, String)> {
    let needle = anchor_text.trim();
    if needle.is_empty() {
        return None;
    }
    buffer
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            let score = strsim::normalized_levenshtein(needle, line.trim());
            (idx + 1, line.to_string(), score)
        })
        .max_by(|a, b| a.2.total_cmp(&b.2))
        .filter(|(_, _, score)| *score > 0.4)
        .map(|(number, line, _)| (number, line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_literal_anchor() {
        let m = find_anchor("abc abc", &Anchor::literal("abc"), 0).unwrap();
        assert_eq!((m.start, m.end), (0, 3));

        let m = find_anchor("abc abc", &Anchor::literal("abc"), 1).unwrap();
        assert_eq!((m.start, m.end), (4, 7));
    }

    #[test]
    fn find_pattern_anchor() {
        let anchor = Anchor::pattern(r#"id="\w+""#).unwrap();
        let buffer = r#"<input id="volume" />"#;
        let m = find_anchor(buffer, &anchor, 0).unwrap();
        assert_eq!(&buffer[m.start..m.end], r#"id="volume""#);
    }

    #[test]
    fn find_anchor_past_end_is_none() {
        assert!(find_anchor("abc", &Anchor::literal("a"), 10).is_none());
    }

    #[test]
    fn rfind_last_occurrence_before_limit() {
        let buffer = "mark one mark two mark";
        let m = rfind_anchor(buffer, &Anchor::literal("mark"), 17).unwrap();
        assert_eq!((m.start, m.end), (9, 13));
    }

    #[test]
    fn line_boundary_extension() {
        let buffer = "first\n  second\nthird";
        // Inside "second"
        assert_eq!(extend_to_line_start(buffer, 10), 6);
        assert_eq!(extend_to_line_end(buffer, 10), 14);
        // First and last lines
        assert_eq!(extend_to_line_start(buffer, 3), 0);
        assert_eq!(extend_to_line_end(buffer, 17), buffer.len());
    }

    #[test]
    fn balanced_close_counts_occurrences() {
        let buffer = "x</div>  </div>\n</div> tail";
        let pos = extend_to_balanced_close(buffer, 0, "</div>", 3).unwrap();
        assert_eq!(&buffer[pos..], " tail");
    }

    #[test]
    fn balanced_close_insufficient_occurrences() {
        assert!(extend_to_balanced_close("</div>", 0, "</div>", 2).is_none());
    }

    #[test]
    fn balanced_close_zero_depth_is_identity() {
        assert_eq!(extend_to_balanced_close("abc", 1, "</div>", 0), Some(1));
    }

    #[test]
    fn locate_and_replace_marked_block() {
        let buffer = "AAA<marker>keep-this</end>BBB";
        let region = locate_region(
            buffer,
            &Anchor::literal("<marker>"),
            &Anchor::literal("</end>"),
            None,
        )
        .unwrap();
        let patched = apply_patch(buffer, region, "<marker>new</end>").unwrap();
        assert_eq!(patched, "AAA<marker>new</end>BBB");
    }

    #[test]
    fn locate_missing_end_anchor_names_it() {
        let buffer = "AAA<marker>keep-this</end>BBB";
        let err = locate_region(
            buffer,
            &Anchor::literal("<marker>"),
            &Anchor::literal("</missing>"),
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            RegionError::AnchorNotFound {
                anchor: "</missing>".to_string()
            }
        );
    }

    #[test]
    fn locate_missing_start_anchor_names_it() {
        let err = locate_region(
            "no markers here",
            &Anchor::literal("<marker>"),
            &Anchor::literal("</end>"),
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            RegionError::AnchorNotFound {
                anchor: "<marker>".to_string()
            }
        );
    }

    #[test]
    fn locate_uses_fallback_end_anchor() {
        let buffer = "AAA<marker>body</alt>BBB";
        let region = locate_region(
            buffer,
            &Anchor::literal("<marker>"),
            &Anchor::literal("</end>"),
            Some(&Anchor::literal("</alt>")),
        )
        .unwrap();
        assert_eq!(&buffer[region.start..region.end], "<marker>body</alt>");
    }

    #[test]
    fn end_anchor_search_starts_after_start_match() {
        // The end anchor text also appears inside the start anchor; the
        // search must begin past the start match, not at the buffer head.
        let buffer = "[end[start]middle[end]tail";
        let region = locate_region(
            buffer,
            &Anchor::literal("[start]"),
            &Anchor::literal("[end]"),
            None,
        )
        .unwrap();
        assert_eq!(&buffer[region.start..region.end], "[start]middle[end]");
    }

    #[test]
    fn apply_patch_rejects_inverted_region() {
        let err = apply_patch("abcdef", Region::new(4, 2), "x").unwrap_err();
        assert!(matches!(err, RegionError::InvalidRegion { .. }));
    }

    #[test]
    fn apply_patch_rejects_out_of_bounds_region() {
        let err = apply_patch("abc", Region::new(0, 10), "x").unwrap_err();
        assert!(matches!(err, RegionError::InvalidRegion { .. }));
    }

    #[test]
    fn apply_patch_rejects_split_multibyte_char() {
        // "é" is two bytes; offset 1 lands inside it
        let err = apply_patch("é", Region::new(0, 1), "x").unwrap_err();
        assert!(matches!(err, RegionError::InvalidRegion { .. }));
    }

    #[test]
    fn apply_patch_identical_replacement_is_identity() {
        let buffer = "AAA<marker>keep</end>BBB";
        let region = Region::new(3, 21);
        assert_eq!(&buffer[region.start..region.end], "<marker>keep</end>");
        let patched = apply_patch(buffer, region, "<marker>keep</end>").unwrap();
        assert_eq!(patched, buffer);
    }

    #[test]
    fn verify_patch_reports_every_failed_condition() {
        let buffer = "new-token and old-token";
        let err = verify_patch(
            buffer,
            &["absent".to_string(), "new-token".to_string()],
            &["old-token".to_string()],
        )
        .unwrap_err();
        match err {
            RegionError::VerificationFailed { missing, forbidden } => {
                assert_eq!(missing, vec!["absent".to_string()]);
                assert_eq!(forbidden, vec!["old-token".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn verify_patch_catches_forbidden_token_in_replacement() {
        // Substitution succeeded mechanically but the replacement still
        // carries the forbidden token.
        let patched = apply_patch(
            "xx old-token yy",
            Region::new(3, 12),
            "renamed old-token",
        )
        .unwrap();
        assert!(verify_patch(&patched, &[], &["old-token".to_string()]).is_err());
    }

    #[test]
    fn verify_patch_passes_when_conditions_hold() {
        assert!(verify_patch(
            "only the new text",
            &["new text".to_string()],
            &["old text".to_string()]
        )
        .is_ok());
    }

    #[test]
    fn closest_line_suggests_near_miss() {
        let buffer = "import x\n{/* Calculadora de Balanco */}\nexport y";
        let (number, line) = closest_line(buffer, "{/* Calculadora de Balanço */}").unwrap();
        assert_eq!(number, 2);
        assert!(line.contains("Calculadora"));
    }

    #[test]
    fn closest_line_none_for_unrelated_text() {
        assert!(closest_line("aaaa\nbbbb", "zzzzzzzzzzzzzzzz").is_none());
    }
}
