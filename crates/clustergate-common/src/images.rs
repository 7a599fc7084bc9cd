//! Add-on image catalog
//!
//! Maps an add-on version to the container images it ships. Components are
//! held in an ordered name → image map so lookups and listing are plain map
//! traversal.

use std::collections::BTreeMap;
use once_cell::sync::Lazy;

use crate::{Error, Result};

/// First released add-on version
pub const V1_VERSION: &str = "v1.0.0";

/// Latest add-on version (clusters 1.18 and newer)
pub const LATEST_VERSION: &str = "v1.1.0";

/// A container image reference without registry prefix
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    /// Image name
    pub name: &'static str,
    /// Image tag
    pub tag: &'static str,
}

impl Image {
    const fn new(name: &'static str, tag: &'static str) -> Self {
        Self { name, tag }
    }

    /// `name:tag`
    pub fn base_name(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

/// The set of images making up one add-on version
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Components {
    images: BTreeMap<&'static str, Image>,
}

impl Components {
    fn from_images(images: impl IntoIterator<Item = Image>) -> Self {
        Self {
            images: images.into_iter().map(|i| (i.name, i)).collect(),
        }
    }

    /// Look up a component image by name
    pub fn get(&self, name: &str) -> Option<&Image> {
        self.images.get(name)
    }

    /// Tag of a component, empty when the component is unknown
    pub fn tag(&self, name: &str) -> &str {
        self.get(name).map(|i| i.tag).unwrap_or("")
    }

    /// All images of this version, ordered by component name
    pub fn iter(&self) -> impl Iterator<Item = &Image> {
        self.images.values()
    }
}

static VERSIONS: Lazy<BTreeMap<&'static str, Components>> = Lazy::new(|| {
    BTreeMap::from([
        (
            V1_VERSION,
            Components::from_images([
                Image::new("tiller", "v2.10.0"),
                Image::new("swift", "0.9.0"),
                Image::new("helm-api", "v1.3"),
            ]),
        ),
        (
            LATEST_VERSION,
            Components::from_images([
                Image::new("tiller", "v2.16.8"),
                Image::new("swift", "0.9.0"),
                Image::new("helm-api", "v1.3"),
            ]),
        ),
    ])
});

/// Base names of every image across all versions, ordered by version
pub fn list() -> Vec<String> {
    VERSIONS
        .values()
        .flat_map(|components| components.iter().map(Image::base_name))
        .collect()
}

/// Check that a version is known
pub fn validate(version: &str) -> Result<()> {
    get(version).map(|_| ())
}

/// Components of a known version
pub fn get(version: &str) -> Result<&'static Components> {
    VERSIONS.get(version).ok_or_else(|| Error::UnknownVersion {
        version: version.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(V1_VERSION, "tiller", "v2.10.0")]
    #[case(LATEST_VERSION, "tiller", "v2.16.8")]
    #[case(LATEST_VERSION, "swift", "0.9.0")]
    #[case(LATEST_VERSION, "helm-api", "v1.3")]
    fn tag_lookup(#[case] version: &str, #[case] name: &str, #[case] tag: &str) {
        assert_eq!(get(version).unwrap().tag(name), tag);
    }

    #[test]
    fn unknown_component_has_empty_tag() {
        let components = get(LATEST_VERSION).unwrap();
        assert_eq!(components.tag("nope"), "");
        assert!(components.get("nope").is_none());
    }

    #[test]
    fn validate_rejects_unknown_version() {
        assert!(validate(V1_VERSION).is_ok());
        assert!(matches!(
            validate("v0.0.1"),
            Err(Error::UnknownVersion { .. })
        ));
    }

    #[test]
    fn list_is_ordered_by_version_then_name() {
        assert_eq!(
            list(),
            vec![
                "helm-api:v1.3",
                "swift:0.9.0",
                "tiller:v2.10.0",
                "helm-api:v1.3",
                "swift:0.9.0",
                "tiller:v2.16.8",
            ]
        );
    }
}
