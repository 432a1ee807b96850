#![forbid(unsafe_code)]

//! Volume source metadata and locator helpers.
//!
//! A *locator* is a string such as `precomputed://gs://bucket/path/image`:
//! an outer scheme naming the source driver, optionally wrapping a transport
//! URL. The wire protocol behind a locator is owned by an external probe
//! service; this module only describes what a probe reports back
//! ([`VolumeInfo`]) and how a default layer name is derived from a locator.

use std::fmt;

/// Element type of the voxels in a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DataType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Uint64,
    Float32,
}

impl DataType {
    /// Lowercase display name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uint8 => "uint8",
            Self::Int8 => "int8",
            Self::Uint16 => "uint16",
            Self::Int16 => "int16",
            Self::Uint32 => "uint32",
            Self::Int32 => "int32",
            Self::Uint64 => "uint64",
            Self::Float32 => "float32",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a volume holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum VolumeKind {
    Image,
    Segmentation,
    Unknown,
}

impl VolumeKind {
    /// Lowercase display name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Segmentation => "segmentation",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for VolumeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful probe.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VolumeInfo {
    /// Whether the source is usable as a layer.
    pub valid: bool,
    /// Number of channels per voxel.
    pub channel_count: u32,
    /// Voxel element type.
    pub data_type: DataType,
    /// Image or segmentation.
    pub kind: VolumeKind,
}

impl VolumeInfo {
    /// A valid volume description.
    #[must_use]
    pub const fn new(kind: VolumeKind, channel_count: u32, data_type: DataType) -> Self {
        Self {
            valid: true,
            channel_count,
            data_type,
            kind,
        }
    }

    /// Status line shown after a successful probe, e.g.
    /// `segmentation: 1-channel uint64`.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{}: {}-channel {}",
            self.kind, self.channel_count, self.data_type
        )
    }
}

/// A locator that could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorError {
    /// The offending locator.
    pub locator: String,
    /// Human-readable reason.
    pub message: String,
}

impl LocatorError {
    fn new(locator: &str, message: impl Into<String>) -> Self {
        Self {
            locator: locator.to_owned(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LocatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for LocatorError {}

/// Name suggestion service.
///
/// Given a locator, propose a base layer name. Implementations fail on
/// malformed locators; the dialog shows the error message to the user.
pub trait NameSuggester {
    /// Suggest a base name for a layer backed by `locator`.
    fn suggest_name(&self, locator: &str) -> Result<String, LocatorError>;

    /// Byte offset at which the last path component of `locator` starts.
    ///
    /// The prefix `locator[..offset]` is the *source group*: pre-filling an
    /// input with it lets the user add sibling volumes quickly.
    fn find_source_group(&self, locator: &str) -> Result<usize, LocatorError>;
}

/// Default suggester: names a layer after the last path segment.
///
/// `precomputed://gs://bucket/brain/image/` suggests `image`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathNameSuggester;

/// Split off every leading `scheme://` and return the offset of the path.
fn path_offset(locator: &str) -> Result<usize, LocatorError> {
    let mut offset = 0;
    let mut schemes = 0;
    while let Some(pos) = locator[offset..].find("://") {
        let scheme = &locator[offset..offset + pos];
        let well_formed = !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !well_formed {
            break;
        }
        offset += pos + 3;
        schemes += 1;
    }
    if schemes == 0 {
        return Err(LocatorError::new(
            locator,
            format!("Invalid source locator: {locator:?} has no scheme."),
        ));
    }
    if locator[offset..].trim_matches('/').is_empty() {
        return Err(LocatorError::new(
            locator,
            format!("Invalid source locator: {locator:?} has no path."),
        ));
    }
    Ok(offset)
}

impl NameSuggester for PathNameSuggester {
    fn suggest_name(&self, locator: &str) -> Result<String, LocatorError> {
        let offset = path_offset(locator)?;
        let path = locator[offset..]
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/');
        match path.rsplit('/').next() {
            Some(segment) if !segment.is_empty() => Ok(segment.to_owned()),
            _ => Err(LocatorError::new(
                locator,
                format!("Invalid source locator: {locator:?} has no path."),
            )),
        }
    }

    fn find_source_group(&self, locator: &str) -> Result<usize, LocatorError> {
        let offset = path_offset(locator)?;
        Ok(locator[offset..]
            .rfind('/')
            .map_or(locator.len(), |pos| offset + pos + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_matches_status_format() {
        let info = VolumeInfo::new(VolumeKind::Segmentation, 1, DataType::Uint64);
        assert_eq!(info.describe(), "segmentation: 1-channel uint64");
        let info = VolumeInfo::new(VolumeKind::Image, 3, DataType::Float32);
        assert_eq!(info.describe(), "image: 3-channel float32");
    }

    #[test]
    fn suggests_last_segment() {
        let s = PathNameSuggester;
        assert_eq!(
            s.suggest_name("precomputed://gs://bucket/brain/image").unwrap(),
            "image"
        );
        assert_eq!(
            s.suggest_name("precomputed://http://host:8080/data/ground_truth/")
                .unwrap(),
            "ground_truth"
        );
        assert_eq!(s.suggest_name("precomputed://gs://bucket").unwrap(), "bucket");
    }

    #[test]
    fn ignores_query_string() {
        let s = PathNameSuggester;
        assert_eq!(
            s.suggest_name("n5://https://host/vol/raw?token=abc").unwrap(),
            "raw"
        );
    }

    #[test]
    fn rejects_missing_scheme() {
        let s = PathNameSuggester;
        let err = s.suggest_name("not a locator").unwrap_err();
        assert!(err.message.contains("no scheme"), "{err}");
    }

    #[test]
    fn rejects_empty_path() {
        let s = PathNameSuggester;
        assert!(s.suggest_name("precomputed://").is_err());
        assert!(s.suggest_name("precomputed://gs:///").is_err());
    }

    #[test]
    fn source_group_ends_after_last_slash() {
        let s = PathNameSuggester;
        let loc = "precomputed://gs://bucket/brain/image";
        let group = s.find_source_group(loc).unwrap();
        assert_eq!(&loc[..group], "precomputed://gs://bucket/brain/");
    }

    #[test]
    fn source_group_without_path_slash_is_whole_locator() {
        let s = PathNameSuggester;
        let loc = "precomputed://gs://bucket";
        assert_eq!(s.find_source_group(loc).unwrap(), loc.len());
    }
}
