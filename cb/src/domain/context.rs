//! Accumulated diagnosis context for a session

use serde::{Deserialize, Serialize};
use tracing::debug;

/// The structured understanding of the current diagnosis
///
/// Fields only strengthen over a conversation: merging never replaces a
/// known value with an empty or absent one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisContext {
    pub disease_name: Option<String>,
    pub causes: Vec<String>,
    pub symptoms: Vec<String>,
    pub solutions: Vec<String>,
    pub prevention: Vec<String>,
    /// Classifier confidence in [0,1]; supplied externally, never derived from text
    pub confidence: Option<f64>,
}

impl DiagnosisContext {
    /// True until any field has been learned
    pub fn is_empty(&self) -> bool {
        self.disease_name.is_none()
            && self.causes.is_empty()
            && self.symptoms.is_empty()
            && self.solutions.is_empty()
            && self.prevention.is_empty()
            && self.confidence.is_none()
    }

    /// Merge an update: non-empty wins, nothing regresses to unknown
    pub fn merge(&mut self, update: &DiagnosisContext) {
        debug!(
            has_name = update.disease_name.is_some(),
            causes = update.causes.len(),
            symptoms = update.symptoms.len(),
            solutions = update.solutions.len(),
            prevention = update.prevention.len(),
            "DiagnosisContext::merge: called"
        );
        if let Some(name) = update.disease_name.as_deref().map(str::trim)
            && !name.is_empty()
        {
            self.disease_name = Some(name.to_string());
        }
        merge_list(&mut self.causes, &update.causes);
        merge_list(&mut self.symptoms, &update.symptoms);
        merge_list(&mut self.solutions, &update.solutions);
        merge_list(&mut self.prevention, &update.prevention);
        self.absorb_confidence(update.confidence);
    }

    /// Record an externally supplied confidence; absent or non-finite values are ignored
    pub fn absorb_confidence(&mut self, confidence: Option<f64>) {
        if let Some(c) = confidence
            && c.is_finite()
        {
            self.confidence = Some(c.clamp(0.0, 1.0));
        }
    }

    /// Non-empty fields as `Key: value` lines, list fields comma-joined
    pub fn prompt_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(name) = &self.disease_name {
            lines.push(format!("Disease Name: {}", name));
        }
        for (key, values) in [
            ("Causes", &self.causes),
            ("Symptoms", &self.symptoms),
            ("Solutions", &self.solutions),
            ("Prevention", &self.prevention),
        ] {
            if !values.is_empty() {
                lines.push(format!("{}: {}", key, values.join(", ")));
            }
        }
        if let Some(confidence) = self.confidence {
            lines.push(format!("Confidence: {:.2}", confidence));
        }
        lines
    }
}

fn merge_list(current: &mut Vec<String>, incoming: &[String]) {
    if !incoming.is_empty() {
        *current = incoming.to_vec();
    }
}
