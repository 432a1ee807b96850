#![forbid(unsafe_code)]

//! Sample volumes, locators and collections.

use strata_core::{DataType, VolumeInfo, VolumeKind};
use strata_layers::{LayerCollection, LayerEntity, LayerId};

/// `image: 1-channel uint8`
#[must_use]
pub fn image_info() -> VolumeInfo {
    VolumeInfo::new(VolumeKind::Image, 1, DataType::Uint8)
}

/// `segmentation: 1-channel uint64`
#[must_use]
pub fn segmentation_info() -> VolumeInfo {
    VolumeInfo::new(VolumeKind::Segmentation, 1, DataType::Uint64)
}

/// A probe answer the validator must treat as a failure.
#[must_use]
pub fn unusable_info() -> VolumeInfo {
    VolumeInfo {
        valid: false,
        ..VolumeInfo::new(VolumeKind::Unknown, 0, DataType::Uint8)
    }
}

/// A well-formed locator whose suggested name is `name`.
#[must_use]
pub fn locator(name: &str) -> String {
    format!("precomputed://gs://strata-fixtures/volumes/{name}")
}

/// A collection holding one layer per name, each with a fixture locator.
pub fn collection(names: &[&str]) -> (LayerCollection, Vec<LayerId>) {
    let collection = LayerCollection::new();
    let ids = names
        .iter()
        .filter_map(|name| {
            collection
                .add(LayerEntity::new(*name).with_locator(locator(name)), None)
                .ok()
        })
        .collect();
    (collection, ids)
}
