//! Loop-count extraction from the on-screen counter label.

/// Extracts the loop count from label text such as `"Loop count 7"`.
///
/// Every ASCII decimal digit in `text` is kept, in order, and the rest is
/// discarded; the digits are then parsed as one base-10 number. Empty input,
/// input without digits, and digit runs too long for a `u64` all yield `0`.
///
/// Separate digit groups are joined: `"Loop 1 of 10"` reads as `110`. The
/// counter label only ever carries one number.
///
/// ```
/// use loopcheck_core::loop_count::extract_count;
///
/// assert_eq!(extract_count("Loop count 7"), 7);
/// assert_eq!(extract_count("Count: 042"), 42);
/// assert_eq!(extract_count("no digits here"), 0);
/// ```
pub fn extract_count(text: &str) -> u64 {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}
