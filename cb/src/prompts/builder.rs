//! PromptBuilder - turns a request, history and context into one prompt

use eyre::Result;
use serde::Serialize;
use tracing::debug;

use super::PromptLoader;
use crate::config::PromptConfig;
use crate::domain::{DiagnosisContext, DiagnosisRequest, FieldSeed, PrimarySignal, Sender, Turn};

#[derive(Serialize)]
struct FieldBlock<'a> {
    city: &'a str,
    gps: &'a str,
    weather: &'a str,
    crops: String,
    lang: &'a str,
}

impl<'a> From<&'a FieldSeed> for FieldBlock<'a> {
    fn from(seed: &'a FieldSeed) -> Self {
        Self {
            city: &seed.city,
            gps: &seed.gps,
            weather: &seed.weather,
            crops: seed.crops_list(),
            lang: &seed.lang,
        }
    }
}

#[derive(Serialize)]
struct DiagnosisPrompt<'a> {
    signal: Option<String>,
    crop_type: Option<String>,
    follow_up: Option<&'a str>,
    field: Option<FieldBlock<'a>>,
}

#[derive(Serialize)]
struct FollowupPrompt<'a> {
    context: Vec<String>,
    history: Vec<String>,
    question: &'a str,
}

#[derive(Serialize)]
struct ChatPrompt<'a> {
    context: Vec<String>,
    history: Vec<String>,
    message: &'a str,
}

#[derive(Serialize)]
struct QuestionPrompt<'a> {
    #[serde(flatten)]
    field: FieldBlock<'a>,
    question: &'a str,
}

/// Renders the prompt for each kind of turn
pub struct PromptBuilder {
    loader: PromptLoader,
    followup_window: usize,
    chat_window: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(PromptLoader::embedded_only(), &PromptConfig::default())
    }
}

impl PromptBuilder {
    pub fn new(loader: PromptLoader, config: &PromptConfig) -> Self {
        debug!(?config, "PromptBuilder::new: called");
        Self {
            loader,
            followup_window: config.followup_window,
            chat_window: config.chat_window,
        }
    }

    /// Builder using the configured override directory, if any
    pub fn from_config(config: &PromptConfig) -> Self {
        Self::new(PromptLoader::new(config.dir.as_deref()), config)
    }

    /// Prompt for a new diagnosis
    ///
    /// Only the highest-priority signal in the request is rendered. Field
    /// conditions are included on a session's first turn only.
    pub fn build_diagnosis_prompt(
        &self,
        request: &DiagnosisRequest,
        history: &[Turn],
        field: Option<&FieldSeed>,
    ) -> Result<String> {
        debug!(history_len = history.len(), has_field = field.is_some(), "build_diagnosis_prompt: called");
        let first_turn = history.iter().all(|t| t.sender() == Sender::User);
        let prompt = DiagnosisPrompt {
            signal: PrimarySignal::select(request).map(|s| s.prompt_block()),
            crop_type: request.effective_crop_type(),
            follow_up: request.follow_up(),
            field: field.filter(|_| first_turn).map(FieldBlock::from),
        };
        self.loader.render("diagnosis", &prompt)
    }

    /// Prompt for a follow-up question against an established context
    pub fn build_followup_prompt(
        &self,
        request: &DiagnosisRequest,
        history: &[Turn],
        context: &DiagnosisContext,
    ) -> Result<String> {
        debug!(history_len = history.len(), "build_followup_prompt: called");
        let prompt = FollowupPrompt {
            context: context.prompt_lines(),
            history: window(history, self.followup_window),
            question: request.follow_up().unwrap_or_default(),
        };
        self.loader.render("followup", &prompt)
    }

    /// Prompt for a free chat message
    pub fn build_chat_prompt(&self, message: &str, history: &[Turn], context: &DiagnosisContext) -> Result<String> {
        debug!(history_len = history.len(), "build_chat_prompt: called");
        let prompt = ChatPrompt {
            context: context.prompt_lines(),
            history: window(history, self.chat_window),
            message: message.trim(),
        };
        self.loader.render("chat", &prompt)
    }

    /// Crop recommendation for the configured field
    pub fn build_advice_prompt(&self, seed: &FieldSeed) -> Result<String> {
        debug!(city = %seed.city, "build_advice_prompt: called");
        self.loader.render("advice", &FieldBlock::from(seed))
    }

    /// A farmer's own question, answered with field conditions
    pub fn build_question_prompt(&self, question: &str, seed: &FieldSeed) -> Result<String> {
        debug!(city = %seed.city, "build_question_prompt: called");
        let prompt = QuestionPrompt {
            field: FieldBlock::from(seed),
            question: question.trim(),
        };
        self.loader.render("question", &prompt)
    }
}

/// The last `size` turns, oldest first, as `Speaker: text` lines
fn window(history: &[Turn], size: usize) -> Vec<String> {
    let start = history.len().saturating_sub(size);
    history[start..]
        .iter()
        .map(|turn| format!("{}: {}", turn.sender().label(), turn.text()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Prediction;

    fn alternating(count: usize) -> Vec<Turn> {
        (0..count)
            .map(|i| {
                let text = format!("message-{:02}", i);
                if i % 2 == 0 { Turn::user(text) } else { Turn::assistant(text) }
            })
            .collect()
    }

    fn seed() -> FieldSeed {
        FieldSeed {
            city: "Nashik".to_string(),
            gps: "19.99,73.78".to_string(),
            weather: "haze, 31.2".to_string(),
            crops: vec!["grapes".to_string(), "onion".to_string()],
            lang: "English".to_string(),
        }
    }

    fn populated_context() -> DiagnosisContext {
        DiagnosisContext {
            disease_name: Some("Early blight".to_string()),
            causes: vec!["Alternaria solani".to_string(), "humidity".to_string()],
            confidence: Some(0.88),
            ..Default::default()
        }
    }

    #[test]
    fn test_classifier_signal_suppresses_lower_priorities() {
        let request = DiagnosisRequest {
            predicted_class: Some("Tomato___Late_blight".to_string()),
            confidence: Some(0.91),
            top_predictions: vec![
                Prediction {
                    class: "Tomato___Late_blight".to_string(),
                    confidence: 0.91,
                },
                Prediction {
                    class: "Tomato___Early_blight".to_string(),
                    confidence: 0.05,
                },
            ],
            disease_name: Some("Powdery mildew".to_string()),
            symptoms: Some("white dust".to_string()),
            ..Default::default()
        };

        let prompt = PromptBuilder::default().build_diagnosis_prompt(&request, &[], None).unwrap();
        assert!(prompt.contains("the most likely disease is: Tomato___Late_blight with a confidence of 0.91"));
        assert!(prompt.contains("Tomato___Early_blight (0.05)"));
        assert!(!prompt.contains("The user has identified a potential disease"));
        assert!(!prompt.contains("Powdery mildew"));
        assert!(!prompt.contains("white dust"));
    }

    #[test]
    fn test_diagnosis_prompt_infers_crop_and_appends_question() {
        let request = DiagnosisRequest {
            predicted_class: Some("Apple___Apple_scab".to_string()),
            follow_up_question: Some("Is it safe to eat the fruit?".to_string()),
            ..Default::default()
        };

        let prompt = PromptBuilder::default().build_diagnosis_prompt(&request, &[], None).unwrap();
        assert!(prompt.contains("The crop type is: Apple."));
        assert!(prompt.contains("specific question: 'Is it safe to eat the fruit?'"));
        assert!(prompt.trim_end().ends_with("Provide the diagnosis and advice now:"));
    }

    #[test]
    fn test_symptoms_only_request() {
        let request = DiagnosisRequest {
            symptoms: Some("yellow leaves".to_string()),
            crop_type: Some("Rice".to_string()),
            ..Default::default()
        };

        let prompt = PromptBuilder::default().build_diagnosis_prompt(&request, &[], None).unwrap();
        assert!(prompt.contains("The user described the following symptoms: 'yellow leaves'."));
        assert!(prompt.contains("The crop type is: Rice."));
    }

    #[test]
    fn test_field_seed_only_on_first_turn() {
        let request = DiagnosisRequest {
            disease_name: Some("Rust".to_string()),
            ..Default::default()
        };
        let builder = PromptBuilder::default();
        let seed = seed();

        let pending = [Turn::user("I think my crop has Rust.")];
        let first = builder.build_diagnosis_prompt(&request, &pending, Some(&seed)).unwrap();
        assert!(first.contains("Field conditions:"));
        assert!(first.contains("City: Nashik"));
        assert!(first.contains("Recommended crops for this region: grapes, onion"));

        let later = builder
            .build_diagnosis_prompt(&request, &alternating(3), Some(&seed))
            .unwrap();
        assert!(!later.contains("Field conditions:"));
    }

    #[test]
    fn test_followup_prompt_windows_last_four_turns() {
        let request = DiagnosisRequest {
            follow_up_question: Some("How often should I spray?".to_string()),
            ..Default::default()
        };
        let history = alternating(10);

        let prompt = PromptBuilder::default()
            .build_followup_prompt(&request, &history, &populated_context())
            .unwrap();

        for dropped in 0..6 {
            assert!(!prompt.contains(&format!("message-{:02}", dropped)));
        }
        let positions: Vec<usize> = (6..10)
            .map(|i| prompt.find(&format!("message-{:02}", i)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(prompt.contains("User: message-06"));
        assert!(prompt.contains("Assistant: message-09"));
        assert!(prompt.contains("User's follow-up question: How often should I spray?"));
    }

    #[test]
    fn test_followup_prompt_renders_context_fields() {
        let request = DiagnosisRequest {
            follow_up_question: Some("Is it contagious?".to_string()),
            ..Default::default()
        };
        let prompt = PromptBuilder::default()
            .build_followup_prompt(&request, &[], &populated_context())
            .unwrap();

        assert!(prompt.contains("Disease Name: Early blight"));
        assert!(prompt.contains("Causes: Alternaria solani, humidity"));
        assert!(prompt.contains("Confidence: 0.88"));
        assert!(!prompt.contains("Symptoms:"));
    }

    #[test]
    fn test_chat_prompt_windows_last_six_turns() {
        let history = alternating(10);
        let prompt = PromptBuilder::default()
            .build_chat_prompt("What about organic options?", &history, &populated_context())
            .unwrap();

        assert!(!prompt.contains("message-03"));
        for kept in 4..10 {
            assert!(prompt.contains(&format!("message-{:02}", kept)));
        }
        assert!(prompt.contains("User's message: What about organic options?"));
        assert!(prompt.contains("Disease Name: Early blight"));
    }

    #[test]
    fn test_chat_prompt_without_context() {
        let prompt = PromptBuilder::default()
            .build_chat_prompt("hello", &[], &DiagnosisContext::default())
            .unwrap();
        assert!(!prompt.contains("Current disease context"));
    }

    #[test]
    fn test_window_sizes_follow_config() {
        let config = PromptConfig {
            chat_window: 2,
            ..Default::default()
        };
        let builder = PromptBuilder::new(PromptLoader::embedded_only(), &config);
        let prompt = builder
            .build_chat_prompt("next", &alternating(5), &DiagnosisContext::default())
            .unwrap();
        assert!(!prompt.contains("message-02"));
        assert!(prompt.contains("message-03"));
        assert!(prompt.contains("message-04"));
    }

    #[test]
    fn test_advice_prompt() {
        let prompt = PromptBuilder::default().build_advice_prompt(&seed()).unwrap();
        assert!(prompt.contains("City: Nashik"));
        assert!(prompt.contains("Weather Conditions: haze, 31.2"));
        assert!(prompt.contains("CHOOSING ONE BEST CROP from the list: grapes, onion"));
        assert!(prompt.contains("Language Preference: English"));
    }

    #[test]
    fn test_question_prompt() {
        let prompt = PromptBuilder::default()
            .build_question_prompt("  Which fertilizer for onion?  ", &seed())
            .unwrap();
        assert!(prompt.contains("Location: Nashik (19.99,73.78)"));
        assert!(prompt.contains("Question: Which fertilizer for onion?\n"));
    }
}
