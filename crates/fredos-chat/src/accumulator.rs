//! Streamed text accumulation with structured-block removal.
//!
//! The agent sometimes emits planning data as ```` ```json … ``` ```` before or
//! between prose. Complete blocks are removed from the visible message; a
//! block that is still open stays visible until the fragment that closes it
//! arrives.

/// Opening delimiter of a structured planning block.
pub const FENCE_OPEN: &str = "```json";
/// Closing delimiter of a structured planning block.
pub const FENCE_CLOSE: &str = "```";

/// Appends `fragment` to `previous` and strips every complete fenced block.
///
/// Order matters: the result depends on fragments being applied in arrival
/// order, since a fence may open in one fragment and close in a later one.
pub fn accumulate(previous: &str, fragment: &str) -> String {
    let mut combined = String::with_capacity(previous.len() + fragment.len());
    combined.push_str(previous);
    combined.push_str(fragment);
    strip_complete_fences(&combined)
}

/// Removes matched `FENCE_OPEN … FENCE_CLOSE` spans, left to right.
///
/// Scanning stops at the first opener without a closer; that opener and
/// everything after it are kept verbatim.
pub fn strip_complete_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find(FENCE_OPEN) {
        let body_start = open + FENCE_OPEN.len();
        let Some(close) = rest[body_start..].find(FENCE_CLOSE) else {
            break;
        };
        let block_end = body_start + close + FENCE_CLOSE.len();

        out.push_str(&rest[..open]);
        rest = &rest[block_end..];
        // A block at the very start must not leave the message opening on blank lines.
        if out.is_empty() {
            rest = rest.trim_start();
        }
    }
    out.push_str(rest);
    out
}
