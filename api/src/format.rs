//! Numeric and address formatting for display.

/// Render a base-unit amount as whole tokens with thousands separators,
/// trimming trailing zeros beyond the integer part. Mints with more decimals
/// than a `u128` scale can hold print the raw amount.
pub fn format_token_amount(amount: u64, decimals: u8, precision: usize) -> String {
    let Some(scale) = 10u128.checked_pow(decimals as u32) else {
        return group_thousands(&amount.to_string());
    };
    let whole = amount as u128 / scale;
    let fraction = amount as u128 % scale;

    let mut out = group_thousands(&whole.to_string());
    if precision == 0 || decimals == 0 {
        return out;
    }

    let digits = format!("{:0width$}", fraction, width = decimals as usize);
    let shown = digits[..precision.min(digits.len())].trim_end_matches('0');
    if !shown.is_empty() {
        out.push('.');
        out.push_str(shown);
    }
    out
}

/// Compact magnitude suffixes: `1.2K`, `3.4M`, `5.6B`.
pub fn format_compact(value: f64) -> String {
    let abs = value.abs();
    let (scaled, suffix) = if abs >= 1e9 {
        (value / 1e9, "B")
    } else if abs >= 1e6 {
        (value / 1e6, "M")
    } else if abs >= 1e3 {
        (value / 1e3, "K")
    } else {
        (value, "")
    };
    let text = format!("{:.1}", scaled);
    let text = text.strip_suffix(".0").unwrap_or(&text);
    format!("{}{}", text, suffix)
}

pub fn format_usd(value: f64) -> String {
    if value.abs() >= 1e6 {
        return format!("${}", format_compact(value));
    }
    let cents = (value.abs() * 100.0).round() as u64;
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!(
        "{}${}.{:02}",
        sign,
        group_thousands(&(cents / 100).to_string()),
        cents % 100
    )
}

/// `AbCd...WxYz` for long addresses, untouched otherwise.
pub fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 8 {
        return address.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// `HH:MM:SS` once an hour or more remains, `MM:SS` below that.
pub fn format_countdown(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Percentage with one decimal place.
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
