//! REPL session management

use std::io::{self, Write};
use std::sync::Arc;

use colored::Colorize;
use eyre::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::debug;

use super::ReplCommand;
use crate::domain::{DiagnosisRequest, DiagnosisResponse, Prediction, Sender};
use crate::engine::{ConversationEngine, EngineError};

/// Interactive REPL session bound to one conversation at a time
pub struct ReplSession {
    engine: Arc<ConversationEngine>,
    session_id: String,
    /// Crop type sent with every diagnosis until changed
    crop: Option<String>,
}

impl ReplSession {
    /// Create a REPL on `session_id` if it is live, otherwise a new session
    pub fn new(engine: Arc<ConversationEngine>, session_id: Option<&str>) -> Self {
        let session_id = engine.start_session(session_id);
        debug!(%session_id, "ReplSession::new: called");
        Self {
            engine,
            session_id,
            crop: None,
        }
    }

    /// Run the REPL main loop
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;

        loop {
            let readline = rl.readline(&format!("{} ", ">".bright_green()));

            match readline {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }

                    let _ = rl.add_history_entry(input);

                    match self.handle(ReplCommand::parse(input)).await {
                        SlashResult::Continue => continue,
                        SlashResult::Quit => break,
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl+C - just show new prompt
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    fn print_welcome(&self) {
        println!();
        println!("{}", "CropBot Diagnosis Chat".bright_cyan().bold());
        println!("Model: {}", self.engine.model());
        println!("Session: {}", self.session_id.dimmed());
        println!("Describe what you see, or type {} for commands, {} to quit", "/help".yellow(), "/quit".yellow());
        println!();
    }

    async fn handle(&mut self, command: ReplCommand) -> SlashResult {
        debug!(?command, "ReplSession::handle: called");
        match command {
            ReplCommand::Help => self.print_help(),
            ReplCommand::Quit => return SlashResult::Quit,
            ReplCommand::New(id) => {
                self.session_id = self.engine.start_session(id.as_deref());
                println!("Session: {}", self.session_id.dimmed());
            }
            ReplCommand::Session => println!("Session: {}", self.session_id),
            ReplCommand::Image { class, confidence } => {
                let request = DiagnosisRequest {
                    top_predictions: confidence
                        .map(|c| {
                            vec![Prediction {
                                class: class.clone(),
                                confidence: c,
                            }]
                        })
                        .unwrap_or_default(),
                    predicted_class: Some(class),
                    confidence,
                    ..Default::default()
                };
                self.diagnose(request).await;
            }
            ReplCommand::Disease(name) => {
                self.diagnose(DiagnosisRequest {
                    disease_name: Some(name),
                    ..Default::default()
                })
                .await
            }
            ReplCommand::Describe(text) => {
                self.diagnose(DiagnosisRequest {
                    description: Some(text),
                    ..Default::default()
                })
                .await
            }
            ReplCommand::Symptoms(text) => {
                self.diagnose(DiagnosisRequest {
                    symptoms: Some(text),
                    ..Default::default()
                })
                .await
            }
            ReplCommand::Ask(question) => {
                self.diagnose(DiagnosisRequest {
                    follow_up_question: Some(question),
                    ..Default::default()
                })
                .await
            }
            ReplCommand::Crop(crop) => {
                println!("{}", format!("Crop set to {}", crop).dimmed());
                self.crop = Some(crop);
            }
            ReplCommand::Context => self.print_context().await,
            ReplCommand::History => self.print_history().await,
            ReplCommand::Advise(question) => {
                thinking();
                let result = self.engine.advise(question.as_deref()).await;
                self.print_reply(result);
            }
            ReplCommand::Say(text) => self.say(text).await,
            ReplCommand::Usage(usage) => println!("{} Usage: {}", "?".yellow(), usage),
            ReplCommand::Unknown(cmd) => {
                println!("{} Unknown command: {}", "?".yellow(), cmd);
                println!("Type {} for available commands", "/help".yellow());
            }
        }
        SlashResult::Continue
    }

    /// Plain input chats once a diagnosis exists, otherwise it starts one
    async fn say(&mut self, text: String) {
        let has_context = match self.engine.store().snapshot(&self.session_id).await {
            Ok(session) => !session.context().is_empty(),
            Err(_) => false,
        };
        if has_context {
            thinking();
            let result = self
                .engine
                .chat(&text, Some(&self.session_id))
                .await
                .map(|reply| reply.response);
            self.print_reply(result);
        } else {
            self.diagnose(DiagnosisRequest {
                description: Some(text),
                ..Default::default()
            })
            .await;
        }
    }

    async fn diagnose(&mut self, mut request: DiagnosisRequest) {
        request.session_id = Some(self.session_id.clone());
        if request.crop_type.is_none() {
            request.crop_type.clone_from(&self.crop);
        }
        thinking();
        let result = self.engine.diagnose(request).await;
        if let Ok(response) = &result
            && response.session_id != self.session_id
        {
            // The previous session was evicted while idle
            self.session_id.clone_from(&response.session_id);
            println!("{}", format!("Started new session {}", self.session_id).dimmed());
        }
        self.print_reply(result.map(|r| summarize(&r)));
    }

    fn print_reply(&self, result: Result<String, EngineError>) {
        // Clear the thinking indicator
        print!("\r{}\r", " ".repeat(THINKING.len()));
        println!();
        match result {
            Ok(text) => println!("{}", text),
            Err(e) if e.is_client_error() => println!("{} {}", "?".yellow(), e),
            Err(e) => println!("{} {}", "Error:".red(), e),
        }
        println!();
    }

    fn print_help(&self) {
        println!();
        println!("{}", "Available Commands:".bright_cyan());
        println!("  {:26} Show this help", "/help".yellow());
        println!("  {:26} Exit the REPL", "/quit".yellow());
        println!("  {:26} Start a new session or resume one", "/new [ID]".yellow());
        println!("  {:26} Show the current session id", "/session".yellow());
        println!("  {:26} Diagnose from a classifier result", "/image CLASS [CONFIDENCE]".yellow());
        println!("  {:26} Diagnose a disease you suspect", "/disease NAME".yellow());
        println!("  {:26} Diagnose from a description", "/describe TEXT".yellow());
        println!("  {:26} Diagnose from symptoms", "/symptoms TEXT".yellow());
        println!("  {:26} Set the crop type for diagnoses", "/crop TYPE".yellow());
        println!("  {:26} Follow-up question on the diagnosis", "/ask QUESTION".yellow());
        println!("  {:26} Show what is known so far", "/context".yellow());
        println!("  {:26} Show the conversation", "/history".yellow());
        println!("  {:26} Crop advice for the configured field", "/advise [QUESTION]".yellow());
        println!();
    }

    async fn print_context(&self) {
        let Ok(session) = self.engine.store().snapshot(&self.session_id).await else {
            println!("{}", "Session has expired. Use /new to start another.".dimmed());
            return;
        };
        let lines = session.context().prompt_lines();
        if lines.is_empty() {
            println!("{}", "No diagnosis yet.".dimmed());
            return;
        }
        println!();
        println!("{}", "Diagnosis Context:".bright_cyan());
        for line in lines {
            println!("  {}", line);
        }
        println!();
    }

    async fn print_history(&self) {
        let Ok(session) = self.engine.store().snapshot(&self.session_id).await else {
            println!("{}", "Session has expired. Use /new to start another.".dimmed());
            return;
        };
        if session.turns().is_empty() {
            println!("{}", "No conversation history.".dimmed());
            return;
        }

        println!();
        println!("{}", "Conversation History:".bright_cyan());
        for (i, turn) in session.turns().iter().enumerate() {
            let who = match turn.sender() {
                Sender::User => turn.sender().label().bright_green(),
                Sender::Assistant => turn.sender().label().bright_blue(),
            };
            let text = turn.text();
            let preview: String = text.chars().take(60).collect();
            let preview = if text.chars().count() > 60 {
                format!("{}...", preview)
            } else {
                preview
            };
            println!("  {}. {}: {}", i + 1, who, preview.replace('\n', " "));
        }
        println!();
    }
}

const THINKING: &str = "thinking...";

fn thinking() {
    print!("{}", THINKING.dimmed());
    let _ = io::stdout().flush();
}

/// Reply text followed by the confidence, when the classifier gave one
fn summarize(response: &DiagnosisResponse) -> String {
    match response.confidence {
        Some(c) => format!("{}\n\n(classifier confidence {:.0}%)", response.response, c * 100.0),
        None => response.response.clone(),
    }
}

/// Result of handling a line of input
enum SlashResult {
    Continue,
    Quit,
}
