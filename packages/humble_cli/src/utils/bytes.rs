use byte_unit::{Byte, Unit, UnitType};
use thiserror::Error;

/// Sizes from this one up are always shown in TiB
const TIB: u64 = 1 << 40;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid size '{0}'")]
pub struct SizeFormatError(pub String);

/// Formats a byte count with a binary unit, e.g. `1.5 MiB`
pub fn humanize_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let byte = Byte::from_u64(bytes);
    let adjusted = if bytes >= TIB {
        byte.get_adjusted_unit(Unit::TiB)
    } else {
        byte.get_appropriate_unit(UnitType::Binary)
    };
    format!("{adjusted:.1}")
}

/// Parses a size such as `500`, `14MB`, `1.5 gib` or `2T` into bytes.
///
/// All units are powers of 1024, with or without the `i`.
pub fn parse_size(input: &str) -> Result<u64, SizeFormatError> {
    let invalid = || SizeFormatError(input.to_owned());

    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);
    let number = number.trim();
    if number.is_empty() || number.starts_with(['-', '+']) {
        return Err(invalid());
    }

    let unit = match suffix.to_ascii_uppercase().as_str() {
        "" | "B" => Unit::B,
        "K" | "KB" | "KIB" => Unit::KiB,
        "M" | "MB" | "MIB" => Unit::MiB,
        "G" | "GB" | "GIB" => Unit::GiB,
        "T" | "TB" | "TIB" => Unit::TiB,
        _ => return Err(invalid()),
    };

    Byte::parse_str(format!("{number} {unit}"), true)
        .map(|byte| byte.as_u64())
        .map_err(|_| invalid())
}
