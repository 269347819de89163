use mime::Mime;
use std::path::Path;

/// Media types accepted as item images
pub const ACCEPTED_IMAGE_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// Longest extension carried over from a client filename
const MAX_EXTENSION_LEN: usize = 10;

/// Returns the lowercased `type/subtype` of a declared media type, without parameters.
pub fn media_type_essence(content_type: &str) -> Option<String> {
    content_type
        .trim()
        .parse::<Mime>()
        .ok()
        .map(|m| m.essence_str().to_ascii_lowercase())
}

/// Validates the declared media type of an uploaded part against the image whitelist.
pub fn is_accepted_image(content_type: &str) -> bool {
    media_type_essence(content_type)
        .map(|essence| ACCEPTED_IMAGE_TYPES.contains(&essence.as_str()))
        .unwrap_or(false)
}

/// File extension matching an accepted image type
pub fn canonical_extension(content_type: &str) -> Option<&'static str> {
    match media_type_essence(content_type)?.as_str() {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    }
}

/// Extracts the extension from a client supplied filename.
///
/// Any path component is discarded and only ASCII alphanumerics are kept, so the
/// result is safe to embed in a local path and an object key.
pub fn extension_from_filename(filename: &str) -> Option<String> {
    let name = Path::new(filename).file_name()?.to_str()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }

    let ext: String = ext
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_EXTENSION_LEN)
        .collect();

    if ext.is_empty() { None } else { Some(ext) }
}

/// Record ids end up in file names and object keys.
pub fn is_safe_record_id(record_id: &str) -> bool {
    !record_id.is_empty()
        && record_id.len() <= 128
        && record_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
