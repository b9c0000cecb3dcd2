/// Rounds to the 2-decimal reporting precision.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Converts a localized numeric string (`1.234,56`, `1,234.56`, `-1.234`, `500`) to `f64`.
///
/// When both separators appear, the right-most one is the decimal separator. A lone
/// separator repeated more than once is a thousands separator.
pub fn normalize_number(raw: &str) -> Option<f64> {
    let s: String = raw.trim().chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return None;
    }

    let last_comma = s.rfind(',');
    let last_dot = s.rfind('.');

    let cleaned = match (last_comma, last_dot) {
        (Some(comma), Some(dot)) if dot < comma => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(_), None) if s.matches(',').count() > 1 => s.replace(',', ""),
        (Some(_), None) => s.replace(',', "."),
        (None, Some(_)) if s.matches('.').count() > 1 => s.replace('.', ""),
        _ => s,
    };

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// First dot-separated segment of an account code (`"3.1.02"` -> `"3"`).
pub fn first_segment(code: &str) -> &str {
    code.split('.').next().unwrap_or("").trim()
}

/// Number of dot-separated segments in an account code.
pub fn code_depth(code: &str) -> usize {
    if code.is_empty() {
        0
    } else {
        code.split('.').count()
    }
}

/// Proper dotted prefixes of `code`, nearest first (`"1.1.05"` -> `"1.1"`, `"1"`).
pub fn ancestor_codes(code: &str) -> impl Iterator<Item = &str> {
    code.char_indices()
        .filter(|(_, c)| *c == '.')
        .map(|(idx, _)| &code[..idx])
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
}
