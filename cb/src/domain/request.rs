//! Diagnosis requests and the structured replies returned to callers

use serde::{Deserialize, Serialize};

/// One ranked classifier prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(rename = "class")]
    pub class: String,
    pub confidence: f64,
}

/// An inbound diagnosis turn
///
/// Several signal fields may be filled; only the highest-priority one drives
/// the prompt (see [`super::PrimarySignal`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosisRequest {
    /// Top class from the image classifier, e.g. `Tomato___Early_blight`
    pub predicted_class: Option<String>,
    /// Classifier confidence for `predicted_class`
    pub confidence: Option<f64>,
    /// Ranked classifier output, best first
    pub top_predictions: Vec<Prediction>,
    /// Disease the user named themselves
    pub disease_name: Option<String>,
    /// Free-text description of the crop's condition
    #[serde(alias = "disease_image_description")]
    pub description: Option<String>,
    pub symptoms: Option<String>,
    pub crop_type: Option<String>,
    pub follow_up_question: Option<String>,
    pub session_id: Option<String>,
}

impl DiagnosisRequest {
    /// The follow-up question, if it carries any text
    pub fn follow_up(&self) -> Option<&str> {
        non_blank(self.follow_up_question.as_deref())
    }

    /// Crop type as given, or inferred from a `Crop___Disease` classifier label
    pub fn effective_crop_type(&self) -> Option<String> {
        non_blank(self.crop_type.as_deref())
            .map(str::to_string)
            .or_else(|| non_blank(self.predicted_class.as_deref()).and_then(crop_from_class))
    }
}

/// Extract the crop from a classifier label (`Apple___Apple_scab` -> `Apple`)
pub fn crop_from_class(class: &str) -> Option<String> {
    class
        .split_once("___")
        .map(|(crop, _)| crop.replace('_', " ").trim().to_string())
        .filter(|crop| !crop.is_empty())
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Result of a diagnosis turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResponse {
    /// The model's reply, verbatim
    pub response: String,
    pub disease_name: Option<String>,
    /// Classifier confidence echoed from the request
    pub confidence: Option<f64>,
    pub causes: Vec<String>,
    pub symptoms: Vec<String>,
    pub solutions: Vec<String>,
    pub prevention: Vec<String>,
    pub session_id: String,
}

/// Result of a free chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
}
