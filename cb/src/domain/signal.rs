//! Primary signal selection
//!
//! A request may carry several pieces of evidence. Exactly one of them, the
//! primary signal, drives the diagnosis prompt and the user-facing summary.

use tracing::debug;

use super::request::{DiagnosisRequest, Prediction, non_blank};

/// Ranked alternatives rendered alongside a classifier result
const MAX_ALTERNATIVES: usize = 3;

/// The single highest-priority piece of evidence in a request
#[derive(Debug, Clone, PartialEq)]
pub enum PrimarySignal<'a> {
    Classifier {
        class: &'a str,
        confidence: Option<f64>,
        alternatives: &'a [Prediction],
    },
    DiseaseName(&'a str),
    Description(&'a str),
    Symptoms(&'a str),
}

type Extractor = for<'a> fn(&'a DiagnosisRequest) -> Option<PrimarySignal<'a>>;

/// Signal extractors, highest priority first
const PRIORITY: [(&str, Extractor); 4] = [
    ("classifier", classifier),
    ("disease_name", disease_name),
    ("description", description),
    ("symptoms", symptoms),
];

fn classifier(request: &DiagnosisRequest) -> Option<PrimarySignal<'_>> {
    non_blank(request.predicted_class.as_deref()).map(|class| PrimarySignal::Classifier {
        class,
        confidence: request.confidence,
        alternatives: &request.top_predictions[..request.top_predictions.len().min(MAX_ALTERNATIVES)],
    })
}

fn disease_name(request: &DiagnosisRequest) -> Option<PrimarySignal<'_>> {
    non_blank(request.disease_name.as_deref()).map(PrimarySignal::DiseaseName)
}

fn description(request: &DiagnosisRequest) -> Option<PrimarySignal<'_>> {
    non_blank(request.description.as_deref()).map(PrimarySignal::Description)
}

fn symptoms(request: &DiagnosisRequest) -> Option<PrimarySignal<'_>> {
    non_blank(request.symptoms.as_deref()).map(PrimarySignal::Symptoms)
}

impl<'a> PrimarySignal<'a> {
    /// Pick the highest-priority signal present in the request
    pub fn select(request: &'a DiagnosisRequest) -> Option<Self> {
        let selected = PRIORITY
            .iter()
            .find_map(|(name, extract)| extract(request).map(|signal| (*name, signal)));
        match selected {
            Some((name, signal)) => {
                debug!(%name, "PrimarySignal::select: selected");
                Some(signal)
            }
            None => {
                debug!("PrimarySignal::select: request carries no signal");
                None
            }
        }
    }

    /// Evidence block embedded in the diagnosis prompt
    pub fn prompt_block(&self) -> String {
        match self {
            PrimarySignal::Classifier {
                class,
                confidence,
                alternatives,
            } => {
                let mut block = match confidence {
                    Some(c) => format!(
                        "Based on an AI image analysis, the most likely disease is: {} with a confidence of {:.2}.",
                        class, c
                    ),
                    None => format!("Based on an AI image analysis, the most likely disease is: {}.", class),
                };
                block.push_str(" Please use this as the primary basis for your diagnosis, but also provide expert insights.");
                if !alternatives.is_empty() {
                    let ranked: Vec<String> = alternatives
                        .iter()
                        .map(|p| format!("{} ({:.2})", p.class, p.confidence))
                        .collect();
                    block.push_str(&format!(" The top predictions were: {}.", ranked.join(", ")));
                }
                block
            }
            PrimarySignal::DiseaseName(name) => format!("The user has identified a potential disease: {}.", name),
            PrimarySignal::Description(text) => format!("The user described the crop's condition: '{}'.", text),
            PrimarySignal::Symptoms(text) => format!("The user described the following symptoms: '{}'.", text),
        }
    }

    /// First-person line recorded as the user's turn
    pub fn summary(&self) -> String {
        match self {
            PrimarySignal::Classifier {
                class,
                confidence: Some(c),
                ..
            } => format!("Image analysis suggests: {} (Confidence: {:.2}).", class, c),
            PrimarySignal::Classifier { class, .. } => format!("Image analysis suggests: {}.", class),
            PrimarySignal::DiseaseName(name) => format!("I think my crop has {}.", name),
            PrimarySignal::Description(text) => format!("I observed: {}.", text.trim_end_matches('.')),
            PrimarySignal::Symptoms(text) => format!("My crop has these symptoms: {}.", text.trim_end_matches('.')),
        }
    }
}
