//! CLI command definitions and subcommands

use clap::{Args, Parser, Subcommand};
use eyre::{Context, Result};
use std::path::PathBuf;
use tracing::debug;

use crate::domain::{DiagnosisRequest, Prediction};

/// CropBot - crop disease diagnosis conversations
#[derive(Parser)]
#[command(
    name = "cb",
    about = "Diagnose crop diseases and talk them through with a language model",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute; defaults to an interactive chat
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive diagnosis conversation
    Chat {
        /// Resume this session id if it is still live
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Run a single diagnosis turn
    Diagnose(DiagnoseArgs),

    /// Crop recommendation or an answer to a farming question for the configured field
    Advise {
        /// Question to answer; omit for a crop recommendation
        question: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Check that the language model answers
    Ping,
}

/// Evidence for a single diagnosis turn
#[derive(Debug, Default, Args)]
pub struct DiagnoseArgs {
    /// Top class from the image classifier, e.g. Tomato___Early_blight
    #[arg(long = "class", value_name = "CLASS")]
    pub predicted_class: Option<String>,

    /// Classifier confidence for --class (0-1)
    #[arg(long)]
    pub confidence: Option<f64>,

    /// Ranked classifier prediction as CLASS=CONFIDENCE; repeat, best first
    #[arg(long = "top", value_name = "CLASS=CONFIDENCE", value_parser = parse_prediction)]
    pub top_predictions: Vec<Prediction>,

    /// Disease you suspect
    #[arg(long = "disease")]
    pub disease_name: Option<String>,

    /// What the crop looks like
    #[arg(long)]
    pub description: Option<String>,

    /// Symptoms you observed
    #[arg(long)]
    pub symptoms: Option<String>,

    /// Crop type, inferred from --class when omitted
    #[arg(long = "crop")]
    pub crop_type: Option<String>,

    /// Specific question to address in the answer
    #[arg(short = 'q', long = "question")]
    pub follow_up_question: Option<String>,

    /// JSON request file; flags override its fields
    #[arg(short, long, value_name = "FILE")]
    pub request: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

impl DiagnoseArgs {
    /// Build the request from the optional file, then the flags
    pub fn to_request(&self) -> Result<DiagnosisRequest> {
        debug!(request = ?self.request, "DiagnoseArgs::to_request: called");
        let mut request = match &self.request {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .context(format!("Failed to read request file {}", path.display()))?;
                serde_json::from_str(&content).context(format!("Failed to parse request file {}", path.display()))?
            }
            None => DiagnosisRequest::default(),
        };

        override_with(&mut request.predicted_class, &self.predicted_class);
        override_with(&mut request.confidence, &self.confidence);
        override_with(&mut request.disease_name, &self.disease_name);
        override_with(&mut request.description, &self.description);
        override_with(&mut request.symptoms, &self.symptoms);
        override_with(&mut request.crop_type, &self.crop_type);
        override_with(&mut request.follow_up_question, &self.follow_up_question);
        if !self.top_predictions.is_empty() {
            request.top_predictions = self.top_predictions.clone();
        }
        Ok(request)
    }
}

fn override_with<T: Clone>(target: &mut Option<T>, flag: &Option<T>) {
    if flag.is_some() {
        target.clone_from(flag);
    }
}

/// Parse `CLASS=CONFIDENCE`
fn parse_prediction(s: &str) -> Result<Prediction, String> {
    debug!(%s, "parse_prediction: called");
    let (class, confidence) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("Expected CLASS=CONFIDENCE, got '{}'", s))?;
    let class = class.trim();
    if class.is_empty() {
        return Err(format!("Missing class in '{}'", s));
    }
    let confidence: f64 = confidence
        .trim()
        .parse()
        .map_err(|_| format!("Invalid confidence in '{}'", s))?;
    Ok(Prediction {
        class: class.to_string(),
        confidence,
    })
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cropbot")
        .join("logs")
        .join("cropbot.log")
}

/// Generate the after_help text
pub fn generate_after_help() -> String {
    format!("Logs are written to: {}\n", get_log_path().display())
}

/// Output format for command results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
