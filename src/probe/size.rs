//! Human-readable size token parsing.

/// Parse a size token such as `173.7M`, `1234K`, `512B`, or `2G` into kB.
///
/// Units are binary (`K` = 1024 bytes). A bare number is taken as kB.
/// Non-zero byte counts round up so a real allocation never reports as zero.
/// Returns `None` for empty, negative, or non-numeric tokens.
#[must_use]
pub fn parse_size_kb(token: &str) -> Option<u64> {
    let token = token.trim();
    let (number, multiplier) = match token.chars().last()? {
        'G' | 'g' => (&token[..token.len() - 1], 1024.0 * 1024.0),
        'M' | 'm' => (&token[..token.len() - 1], 1024.0),
        'K' | 'k' => (&token[..token.len() - 1], 1.0),
        'B' | 'b' => {
            let bytes = parse_number(&token[..token.len() - 1])?;
            return Some(bytes_to_kb(bytes));
        }
        _ => return token.parse::<u64>().ok(),
    };

    let value = parse_number(number)?;
    Some(to_whole_kb(value * multiplier))
}

fn parse_number(raw: &str) -> Option<f64> {
    let value = raw.trim().parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

fn bytes_to_kb(bytes: f64) -> u64 {
    if bytes <= 0.0 {
        0
    } else {
        to_whole_kb((bytes / 1024.0).ceil()).max(1)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_whole_kb(kb: f64) -> u64 {
    kb.round() as u64
}
