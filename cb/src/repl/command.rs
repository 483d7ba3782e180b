//! Slash command parsing

use tracing::debug;

/// One line of REPL input
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Help,
    Quit,
    /// Start or resume a session
    New(Option<String>),
    Session,
    Image { class: String, confidence: Option<f64> },
    Disease(String),
    Describe(String),
    Symptoms(String),
    Crop(String),
    Ask(String),
    Context,
    History,
    Advise(Option<String>),
    /// Plain text, not a slash command
    Say(String),
    /// Slash command with a missing argument
    Usage(&'static str),
    Unknown(String),
}

impl ReplCommand {
    pub fn parse(input: &str) -> Self {
        debug!(%input, "ReplCommand::parse: called");
        let input = input.trim();
        if !input.starts_with('/') {
            return Self::Say(input.to_string());
        }

        let (cmd, rest) = match input.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (input, ""),
        };
        let arg = (!rest.is_empty()).then(|| rest.to_string());

        match cmd {
            "/help" | "/h" => Self::Help,
            "/quit" | "/q" | "/exit" => Self::Quit,
            "/new" => Self::New(arg),
            "/session" => Self::Session,
            "/image" => parse_image(rest),
            "/disease" => arg.map_or(Self::Usage("/disease NAME"), Self::Disease),
            "/describe" => arg.map_or(Self::Usage("/describe TEXT"), Self::Describe),
            "/symptoms" => arg.map_or(Self::Usage("/symptoms TEXT"), Self::Symptoms),
            "/crop" => arg.map_or(Self::Usage("/crop TYPE"), Self::Crop),
            "/ask" => arg.map_or(Self::Usage("/ask QUESTION"), Self::Ask),
            "/context" => Self::Context,
            "/history" => Self::History,
            "/advise" => Self::Advise(arg),
            _ => Self::Unknown(cmd.to_string()),
        }
    }
}

/// `/image CLASS [CONFIDENCE]`
fn parse_image(rest: &str) -> ReplCommand {
    let mut parts = rest.split_whitespace();
    let Some(class) = parts.next() else {
        return ReplCommand::Usage("/image CLASS [CONFIDENCE]");
    };
    let confidence = match parts.next().map(str::parse::<f64>) {
        None => None,
        Some(Ok(c)) => Some(c),
        Some(Err(_)) => return ReplCommand::Usage("/image CLASS [CONFIDENCE]"),
    };
    ReplCommand::Image {
        class: class.to_string(),
        confidence,
    }
}
