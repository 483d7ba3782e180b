//! Field conditions supplied by the weather and crop recommendation service

use serde::{Deserialize, Serialize};

fn default_lang() -> String {
    "English".to_string()
}

/// Deployment-wide seed values: location, current weather and recommended crops
///
/// These are opaque strings to the conversation core; they are only rendered
/// into prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSeed {
    #[serde(default)]
    pub city: String,

    /// "lat,lon"
    #[serde(default)]
    pub gps: String,

    /// Weather description with temperature, e.g. "haze, 31.2"
    #[serde(default)]
    pub weather: String,

    /// Crops suited to the region, best first
    #[serde(default)]
    pub crops: Vec<String>,

    /// Language the farmer wants answers in
    #[serde(default = "default_lang")]
    pub lang: String,
}

impl FieldSeed {
    /// Recommended crops as a single comma-separated string
    pub fn crops_list(&self) -> String {
        self.crops.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lang_defaults_to_english() {
        let seed: FieldSeed = serde_yaml::from_str("city: Nashik\ncrops: [grapes, onion]").unwrap();
        assert_eq!(seed.lang, "English");
        assert_eq!(seed.crops_list(), "grapes, onion");
        assert!(seed.gps.is_empty());
    }
}
