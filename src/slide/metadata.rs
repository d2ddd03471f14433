//! Slide metadata extraction from vendor properties

use std::collections::HashMap;
use std::str::FromStr;

use super::{SlideError, SlideResult};
use crate::models::SlideMetadata;

const MPP_X: &str = "openslide.mpp-x";
const MPP_Y: &str = "openslide.mpp-y";
const SOURCE_LENS: &str = "hamamatsu.SourceLens";
const CREATED: &str = "hamamatsu.Created";

/// Build the metadata object from slide properties
pub fn extract_metadata(properties: &HashMap<String, String>) -> SlideResult<SlideMetadata> {
    Ok(SlideMetadata {
        mpp_x: parse(properties, MPP_X)?,
        mpp_y: parse(properties, MPP_Y)?,
        source_lens: parse(properties, SOURCE_LENS)?,
        created: require(properties, CREATED)?.to_string(),
    })
}

fn require<'a>(properties: &'a HashMap<String, String>, key: &str) -> SlideResult<&'a str> {
    properties
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| SlideError::PropertyMissing(key.to_string()))
}

fn parse<T: FromStr>(properties: &HashMap<String, String>, key: &str) -> SlideResult<T> {
    let value = require(properties, key)?;
    value.parse().map_err(|_| SlideError::InvalidProperty {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn complete() -> HashMap<String, String> {
        props(&[
            (MPP_X, "0.4990"),
            (MPP_Y, "0.5"),
            (SOURCE_LENS, "20"),
            (CREATED, "2009/12/29"),
        ])
    }

    #[test]
    fn test_extract_complete() {
        let metadata = extract_metadata(&complete()).unwrap();
        assert_eq!(metadata.mpp_x, 0.499);
        assert_eq!(metadata.mpp_y, 0.5);
        assert_eq!(metadata.source_lens, 20);
        assert_eq!(metadata.created, "2009/12/29");
    }

    #[test]
    fn test_missing_property() {
        let mut properties = complete();
        properties.remove(CREATED);
        let err = extract_metadata(&properties).unwrap_err();
        assert!(matches!(err, SlideError::PropertyMissing(ref key) if key == CREATED));
    }

    #[test]
    fn test_invalid_values() {
        let mut properties = complete();
        properties.insert(MPP_X.to_string(), "n/a".to_string());
        assert!(matches!(
            extract_metadata(&properties),
            Err(SlideError::InvalidProperty { .. })
        ));

        let mut properties = complete();
        properties.insert(SOURCE_LENS.to_string(), "20.0".to_string());
        assert!(extract_metadata(&properties).is_err());
    }
}
