//! Small path and filename helpers

/// Strip the final extension from a file name
///
/// The provider reports `original_filename` with its container extension
/// still attached; the torrent folder on the mount is the name without it.
/// Takes everything before the last dot, so `"Show.S01.mkv"` becomes
/// `"Show.S01"` and a name without a dot is returned unchanged.
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

/// Trim leading path separators from a provider-reported file path
///
/// RealDebrid reports file paths rooted at the torrent (`"/Movie.mkv"`).
/// Joining such a path onto a base with `PathBuf::join` would replace the
/// base entirely, so the separators must go before any join.
pub fn trim_leading_separators(path: &str) -> &str {
    path.trim_start_matches(['/', '\\'])
}
