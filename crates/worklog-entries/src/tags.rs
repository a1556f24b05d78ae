//! Tag normalization and column encoding.

const TAG_SEPARATOR: &str = ",";

/// Normalizes submitted tags: trimmed, uppercased, inner spaces and the
/// column separator replaced with underscores.
///
/// Order is preserved and duplicates are kept. `None` or an empty list
/// yields `None`.
pub fn normalize_tags(raw: Option<Vec<String>>) -> Option<Vec<String>> {
    let raw = raw.filter(|tags| !tags.is_empty())?;
    Some(
        raw.iter()
            .map(|tag| tag.trim().to_uppercase().replace([' ', ','], "_"))
            .collect(),
    )
}

/// Joins tags into the single stored column value.
///
/// A tag that itself contains a comma reads back as several tags.
/// [`normalize_tags`] output never does.
pub fn encode_tags(tags: Option<&[String]>) -> String {
    tags.map(|t| t.join(TAG_SEPARATOR)).unwrap_or_default()
}

/// Splits a stored column value back into tags.
pub fn decode_tags(stored: Option<&str>) -> Option<Vec<String>> {
    match stored {
        None | Some("") => None,
        Some(s) => Some(s.split(TAG_SEPARATOR).map(str::to_string).collect()),
    }
}
