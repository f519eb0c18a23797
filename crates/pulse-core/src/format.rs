//! Display formatting shared by the dashboard panels.

/// Glyph shown in place of any absent value.
pub const MISSING: &str = "—";

/// Converts a raw phase name (`LayerPhase.WEIGHTS_UPLOADING`) to natural language.
pub fn format_phase(phase: Option<&str>) -> String {
    let Some(phase) = phase.filter(|p| !p.is_empty()) else {
        return MISSING.to_string();
    };
    let phase = phase.strip_prefix("LayerPhase.").unwrap_or(phase);

    match phase {
        "TRAINING" => "Training".to_string(),
        "WEIGHTS_UPLOADING" => "Uploading Weights".to_string(),
        "MERGING_PARTITIONS" => "Merging Partitions".to_string(),
        "IDLE" => "Idle".to_string(),
        "WAITING" => "Waiting".to_string(),
        other => title_case(&other.replace('_', " ")),
    }
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

/// Compact human-readable byte count (`512 B`, `1.50 KiB`, ...).
pub fn format_bytes(value: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

    let mut size = value as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value} B")
    } else {
        format!("{size:.2} {}", UNITS[unit])
    }
}

/// Formats a parameter count as `1.1B`, `350.0M` or `12,345`.
pub fn format_params(count: u64) -> String {
    if count >= 1_000_000_000 {
        format!("{:.1}B", count as f64 / 1e9)
    } else if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1e6)
    } else {
        format_thousands(count)
    }
}

/// Inserts `,` between digit groups.
pub fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// `Some(v)` rendered through `f`, or the missing-value glyph.
pub fn or_missing<T>(value: Option<T>, f: impl FnOnce(T) -> String) -> String {
    value.map_or_else(|| MISSING.to_string(), f)
}

/// Shortens `text` to `max_chars`, ending with `...` when cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Elapsed runtime as `HH:MM:SS`.
pub fn format_runtime(elapsed: std::time::Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_format_phase() {
        assert_eq!(format_phase(None), "—");
        assert_eq!(format_phase(Some("LayerPhase.TRAINING")), "Training");
        assert_eq!(format_phase(Some("WEIGHTS_UPLOADING")), "Uploading Weights");
        assert_eq!(format_phase(Some("LayerPhase.SYNC_SHARDS")), "Sync Shards");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.50 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MiB");
    }

    #[test]
    fn test_format_params() {
        assert_eq!(format_params(1_100_000_000), "1.1B");
        assert_eq!(format_params(350_000_000), "350.0M");
        assert_eq!(format_params(12_345), "12,345");
        assert_eq!(format_params(999), "999");
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
        assert_eq!(truncate_with_ellipsis("abcdefghij", 8), "abcde...");
    }

    #[test]
    fn test_format_runtime() {
        assert_eq!(format_runtime(Duration::from_secs(3725)), "01:02:05");
    }
}
