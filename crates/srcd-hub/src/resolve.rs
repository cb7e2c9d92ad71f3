use crate::version::VersionTag;
use crate::{HubError, TagSource};
use serde::Serialize;
use tracing::debug;

/// Tag used for unversioned (development) builds.
pub const LATEST: &str = "latest";
/// Version string of development builds.
pub const DEV: &str = "dev";
/// Tag used by the integration environment; never resolved.
pub const LOCAL_TESTING: &str = "local-testing";

/// Result of a compatibility lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompatibleTag {
    pub tag: String,
    /// A newer release exists past the breaking threshold.
    pub has_breaking_update: bool,
}

impl CompatibleTag {
    fn unchanged(tag: &str) -> Self {
        Self {
            tag: tag.to_owned(),
            has_breaking_update: false,
        }
    }
}

/// Newest published tag of `image` that is compatible with `current`.
///
/// Empty and `dev` versions map to `latest` and the testing tag is returned
/// as is, both without touching the network.
pub fn get_compatible_tag(
    source: &dyn TagSource,
    image: &str,
    current: &str,
) -> Result<CompatibleTag, HubError> {
    match current {
        "" | DEV => return Ok(CompatibleTag::unchanged(LATEST)),
        LOCAL_TESTING => return Ok(CompatibleTag::unchanged(LOCAL_TESTING)),
        _ => {}
    }

    let current = VersionTag::parse(current)?;
    let tags = source.tags(image)?;
    debug!("{image}: {} published tags", tags.len());
    select_compatible(image, &current, &tags)
}

/// Scan `tags` for the newest release in `[current, threshold)`.
///
/// Pre-release and unparsable tags are ignored. Any release at or past the
/// threshold only raises the breaking flag.
pub fn select_compatible<S: AsRef<str>>(
    image: &str,
    current: &VersionTag,
    tags: &[S],
) -> Result<CompatibleTag, HubError> {
    let threshold = current.breaking_threshold();
    let mut best = VersionTag::zero();
    let mut has_breaking_update = false;

    for raw in tags {
        let Ok(tag) = VersionTag::parse(raw.as_ref()) else {
            continue;
        };
        if tag.is_prerelease() || tag < *current {
            continue;
        }
        if tag >= threshold {
            has_breaking_update = true;
            continue;
        }
        if tag > best {
            best = tag;
        }
    }

    if best.is_zero() {
        return Err(HubError::NoCompatibleVersion(image.to_owned()));
    }
    Ok(CompatibleTag {
        tag: best.to_string(),
        has_breaking_update,
    })
}
