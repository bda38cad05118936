use std::sync::LazyLock;

use regex::Regex;

static DOI_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:dx\.)?doi\.org/+(10\.\d{4,9}/\S+)").expect("DOI link pattern compiles")
});

/// Converts a star-delimited repeat unit (`*CC*`) into a BigSMILES
/// stochastic object (`{[][<]CC[>][]}`).
///
/// The first `*` becomes the open-end bonding descriptor `[<]` and the last
/// remaining `*` the close-end descriptor `[>]`. Blank input has no
/// descriptor.
pub fn to_bigsmiles(smiles: &str) -> Option<String> {
    let smiles = smiles.trim();
    if smiles.is_empty() {
        return None;
    }
    let opened = smiles.replacen('*', "[<]", 1);
    let closed = match opened.rfind('*') {
        Some(idx) => format!("{}[>]{}", &opened[..idx], &opened[idx + 1..]),
        None => opened,
    };
    Some(format!("{{[]{closed}[]}}"))
}

/// Extracts the DOI from a reference title that is a `doi.org` link.
pub fn doi_from_title(title: &str) -> Option<String> {
    DOI_LINK
        .captures(title)
        .and_then(|captures| captures.get(1))
        .map(|doi| doi.as_str().trim_end_matches('/').to_string())
}
