//! Whitespace normalization utilities.
//!
//! Uses Unicode's definition of whitespace (tabs, newlines, non-breaking
//! spaces and friends all count as delimiters).
//!
//! ```rust
//! use canonical::collapse_whitespace;
//!
//! assert_eq!(collapse_whitespace("  rua   das\tflores  "), "rua das flores");
//! assert_eq!(collapse_whitespace(" \n "), "");
//! ```

/// Collapses repeated whitespace into single ASCII spaces and trims both ends.
///
/// Returns an empty string for empty or whitespace-only input; callers that
/// need an absence value check for that themselves.
pub fn collapse_whitespace(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    for segment in text.split_whitespace() {
        if !normalized.is_empty() {
            normalized.push(' ');
        }
        normalized.push_str(segment);
    }
    normalized
}
