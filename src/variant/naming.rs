//! Key naming scheme.
//!
//! There is no metadata table: an original lives at `id` and each variant at
//! `id_<height>`, so the parentage of any key can be recovered from the key
//! alone.

use std::path::Path;

/// Separator between an image id and a variant height.
pub const VARIANT_SEPARATOR: char = '_';

/// Key of the variant of `id` with the given pixel height.
pub fn variant_key(id: &str, height: u32) -> String {
    format!("{}{}{}", id, VARIANT_SEPARATOR, height)
}

/// Whether `key` is the original of `id` or one of its variants.
pub fn belongs_to(key: &str, id: &str) -> bool {
    match key.strip_prefix(id) {
        Some("") => true,
        Some(rest) => rest.starts_with(VARIANT_SEPARATOR),
        None => false,
    }
}

/// Height encoded in a variant key of `id`, if `key` is one.
pub fn variant_height(key: &str, id: &str) -> Option<u32> {
    key.strip_prefix(id)?
        .strip_prefix(VARIANT_SEPARATOR)?
        .parse()
        .ok()
}

/// Lowercase extension of `file_name` without the leading dot.
///
/// Returns an empty string when the name has no extension.
pub fn file_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}
