use std::cmp::Ordering;

use crate::version::parser::Version;

/// Total order over versions
///
/// Semver precedence decides first: numeric core fields, then prerelease,
/// where a final release outranks any prerelease of the same core. When
/// precedence is equal the build number breaks the tie, higher first.
///
/// This is deliberately asymmetric for mixed catalogs: `2.0.0` beats
/// `2.0.0-ui+5`, while among `2.0.0-ui` builds the newest one wins.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    // build metadata is cleared on parse, so this is pure precedence
    a.semver()
        .cmp(b.semver())
        .then_with(|| a.build_number().cmp(&b.build_number()))
}

/// Maximum element under [`compare`]
pub fn find_latest<'a, I>(versions: I) -> Option<&'a Version>
where
    I: IntoIterator<Item = &'a Version>,
{
    versions.into_iter().max_by(|a, b| compare(a, b))
}
