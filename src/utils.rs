/// Result of lenient numeric parsing. Failures become zero and are flagged,
/// so callers can count them without changing the outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coerced {
    pub value: f64,
    pub was_coerced: bool,
}

impl Coerced {
    fn parsed(value: f64) -> Self {
        Self {
            value,
            was_coerced: false,
        }
    }

    fn zero(was_coerced: bool) -> Self {
        Self {
            value: 0.0,
            was_coerced,
        }
    }
}

/// Parses a cell as a number. Blank cells are zero without being flagged;
/// anything unparseable (or non-finite) is zero and flagged.
pub fn coerce_numeric(raw: &str) -> Coerced {
    let ascii = transliterate_digits(raw.trim());
    let cleaned: String = ascii.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();

    if cleaned.is_empty() {
        return Coerced::zero(false);
    }

    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Coerced::parsed(v),
        _ => Coerced::zero(true),
    }
}

/// Maps Devanagari digits (U+0966..U+096F) to ASCII; other characters pass through.
pub fn transliterate_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{0966}'..='\u{096F}' => {
                char::from_digit(c as u32 - 0x0966, 10).unwrap_or(c)
            }
            _ => c,
        })
        .collect()
}

/// Trims a commodity code and strips the trailing `.0` left by float coercion upstream.
pub fn clean_commodity_code(raw: &str) -> String {
    let trimmed = transliterate_digits(raw.trim());
    match trimmed.strip_suffix(".0") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => trimmed,
    }
}

/// Lowercases a header and drops whitespace, underscores, hyphens and dots,
/// so `"HS Code"`, `"hs_code"` and `"HS-CODE"` compare equal.
pub fn normalize_header(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '_' | '-' | '.'))
        .collect()
}

/// Formats a count with thousands separators for log output.
pub fn format_count(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
