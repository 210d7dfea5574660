//! Human-readable byte sizes.
//!
//! Binary units with at most four significant digits and no separator:
//! `2MiB`, `1.5MiB`, `1000B`. Labels end up in the result table, so the
//! format is stable.

const UNITS: [&str; 9] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];

pub fn format_bytes(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{}{}", significant(size, 4), UNITS[unit])
}

/// Render `value` with `digits` significant digits, dropping trailing zeros.
fn significant(value: f64, digits: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let integer_digits = value.abs().log10().floor() as i64 + 1;
    let decimals = (digits as i64 - integer_digits).max(0) as usize;
    let rendered = format!("{value:.decimals$}");
    if rendered.contains('.') {
        rendered.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        rendered
    }
}

/// Parse a byte count such as `4MiB`, `512 KiB`, `1.5GiB`, `2MB` or `1048576`.
pub fn parse_bytes(input: &str) -> Result<u64, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);
    let number: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid size: {input}"))?;
    if number < 0.0 {
        return Err(format!("size cannot be negative: {input}"));
    }

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1_000,
        "m" | "mb" => 1_000_000,
        "g" | "gb" => 1_000_000_000,
        "ki" | "kib" => 1 << 10,
        "mi" | "mib" => 1 << 20,
        "gi" | "gib" => 1 << 30,
        "ti" | "tib" => 1 << 40,
        other => return Err(format!("unknown size unit: {other}")),
    };

    let bytes = number * multiplier as f64;
    if bytes > u64::MAX as f64 {
        return Err(format!("size too large: {input}"));
    }
    Ok(bytes.round() as u64)
}
