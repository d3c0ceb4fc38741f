/// Length of a challenge answer.
pub const ANSWER_LEN: usize = 4;

/// Keeps only ASCII digits.
pub fn clean_digits(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// The first `len` digits of `digits` (all of them if shorter).
pub fn leading_window(digits: &str, len: usize) -> String {
    digits.chars().take(len).collect()
}

/// Pads with trailing zeros and truncates to exactly four digits.
pub fn fit_to_answer(digits: &str) -> String {
    let padded = format!("{}0000", clean_digits(digits));
    leading_window(&padded, ANSWER_LEN)
}

/// Turns a raw reading into an answer: three digits are padded with `0`,
/// longer readings keep their first four. Fewer than three digits cannot be
/// an answer.
pub fn normalize_answer(text: &str) -> Option<String> {
    let digits = clean_digits(text);
    if digits.len() < 3 {
        return None;
    }
    Some(fit_to_answer(&digits))
}
