//! DOI normalization.
//!
//! Input files carry DOIs as bare `10.x/y`, as `doi:` URIs or as resolver
//! URLs. Matching is exact on the normalized form only.

/// Lower-case the DOI and strip resolver/URI prefixes.
///
/// `https://doi.org/10.1080/ABC` and `doi:10.1080/abc` both normalize to
/// `10.1080/abc`. Returns an empty string for blank input.
pub fn normalize_doi(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let mut rest = lowered.as_str();

    if let Some(after_scheme) = rest
        .strip_prefix("https://")
        .or_else(|| rest.strip_prefix("http://"))
    {
        // Drop the host; the DOI is the URL path.
        rest = match after_scheme.find('/') {
            Some(slash) => &after_scheme[slash + 1..],
            None => "",
        };
    }

    rest = rest.trim_start_matches('/');
    if let Some(stripped) = rest.strip_prefix("doi:") {
        rest = stripped;
    }

    rest.trim().to_string()
}
