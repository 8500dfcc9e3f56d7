//! Careerpath - terminal client for the career-guidance chat.

mod chat;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use careerpath_client::{
    ChatRequest, ChatSession, ClientConfig, CsQuizAnswers, Endpoint, FlowPayload, Transcript,
};

/// Career guidance chat in the terminal
#[derive(Parser)]
#[command(name = "careerpath")]
#[command(about = "Terminal client for the careerpath guidance API")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Server base URL (overrides config and CAREERPATH_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Model selector, e.g. gemini or custom_mistral
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Log level
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive conversation
    Chat {
        #[arg(long, value_enum, default_value_t = Mode::Rag)]
        mode: Mode,

        /// Wait for the whole reply instead of streaming it
        #[arg(long)]
        no_stream: bool,

        /// JSON file with a quiz profile for the chatbot
        #[arg(long)]
        quiz_data: Option<PathBuf>,
    },

    /// Ask a single question
    Ask {
        message: String,

        #[arg(long, value_enum, default_value_t = Mode::Rag)]
        mode: Mode,

        #[arg(long)]
        no_stream: bool,
    },

    /// General career quiz
    Quiz {
        /// One answer per question, in order
        #[arg(short, long = "answer", required = true)]
        answers: Vec<String>,

        /// Continue with the chatbot after the recommendation
        #[arg(long)]
        chat: bool,
    },

    /// Computer-science career quiz
    CsQuiz {
        #[command(flatten)]
        answers: CsQuizArgs,

        /// Continue with the chatbot after the recommendation
        #[arg(long)]
        chat: bool,
    },

    /// Analyze a CV from its extracted text
    AnalyzeCv {
        /// Plain-text CV
        #[arg(short, long)]
        file: PathBuf,
    },
}

/// Which conversation backend to talk to.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Career guidance grounded on the knowledge base
    Rag,
    /// General chatbot
    Chatbot,
    /// Temporary knowledge base, replies carry sources
    Kb,
}

impl Mode {
    fn endpoint(self, stream: bool) -> Endpoint {
        match (self, stream) {
            (Mode::Rag, true) => Endpoint::ChatStream,
            (Mode::Rag, false) => Endpoint::Chat,
            (Mode::Chatbot, true) => Endpoint::ChatbotStream,
            (Mode::Chatbot, false) => Endpoint::Chatbot,
            (Mode::Kb, true) => Endpoint::KnowledgeBaseChatStream,
            (Mode::Kb, false) => Endpoint::KnowledgeBaseChat,
        }
    }
}

#[derive(clap::Args)]
struct CsQuizArgs {
    #[arg(long)]
    gpa: f64,
    #[arg(long, default_value = "Computer Science")]
    major: String,
    /// Python skill level
    #[arg(long, default_value = "Beginner")]
    python: String,
    /// SQL skill level
    #[arg(long, default_value = "Beginner")]
    sql: String,
    /// Java skill level
    #[arg(long, default_value = "Beginner")]
    java: String,
    /// Interested domains (up to two)
    #[arg(long = "domain", num_args = 1..=2)]
    domains: Vec<String>,
    /// Notable projects (up to three)
    #[arg(long = "project", num_args = 1..=3)]
    projects: Vec<String>,
}

impl From<CsQuizArgs> for CsQuizAnswers {
    fn from(args: CsQuizArgs) -> Self {
        let nth = |items: &[String], i: usize| items.get(i).cloned().unwrap_or_default();
        Self {
            gpa: args.gpa,
            major: args.major,
            python: args.python,
            sql: args.sql,
            java: args.java,
            interested_domain_1: nth(&args.domains, 0),
            interested_domain_2: nth(&args.domains, 1),
            projects_1: nth(&args.projects, 0),
            projects_2: nth(&args.projects, 1),
            projects_3: nth(&args.projects, 2),
        }
    }
}

fn setup_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // stdout carries the conversation
    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = ClientConfig::discover(args.config.as_deref())?;
    if let Some(url) = &args.api_url {
        config.base_url = url.clone();
    }
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    setup_logging(&args.log_level, args.json_logs);

    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {e:#}");
            eprintln!("careerpath: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    info!(base_url = %config.base_url, model = %config.model, "Using server");

    match run(args.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("careerpath: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: &ClientConfig) -> Result<()> {
    let mut session = ChatSession::from_config(config)?;

    match command {
        Command::Chat {
            mode,
            no_stream,
            quiz_data,
        } => {
            let endpoint = mode.endpoint(!no_stream);
            let flow = match quiz_data {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    let data: serde_json::Value = serde_json::from_str(&raw)
                        .with_context(|| format!("{} is not valid JSON", path.display()))?;
                    FlowPayload::QuizData(data)
                }
                None => FlowPayload::None,
            };
            chat::interactive(&mut session, |text| {
                ChatRequest::new(endpoint, text).with_flow(flow.clone())
            })
            .await
        }

        Command::Ask {
            message,
            mode,
            no_stream,
        } => {
            let report =
                chat::stream_reply(&mut session, ChatRequest::new(mode.endpoint(!no_stream), message))
                    .await?;
            anyhow::ensure!(report.is_success(), "no reply received");
            Ok(())
        }

        Command::Quiz {
            answers,
            chat: follow_up,
        } => {
            let text = format!("Here are my quiz answers: {}", answers.join(", "));
            let request = ChatRequest::new(Endpoint::CareerQuiz, text)
                .with_flow(FlowPayload::QuizAnswers(answers.clone()));
            let profile = serde_json::json!({ "answers": answers });
            quiz_then_chat(&mut session, config, request, profile, follow_up).await
        }

        Command::CsQuiz {
            answers,
            chat: follow_up,
        } => {
            let answers = CsQuizAnswers::from(answers);
            let profile = serde_json::to_value(&answers)?;
            let request = ChatRequest::new(Endpoint::CsCareerQuiz, "Here are my CS quiz answers")
                .with_flow(FlowPayload::CsQuiz(answers));
            quiz_then_chat(&mut session, config, request, profile, follow_up).await
        }

        Command::AnalyzeCv { file } => {
            let cv_text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            anyhow::ensure!(!cv_text.trim().is_empty(), "{} is empty", file.display());
            let request = ChatRequest::new(Endpoint::AnalyzeCv, "Analyze my CV")
                .with_flow(FlowPayload::CvText(cv_text));
            let report = chat::stream_reply(&mut session, request).await?;
            anyhow::ensure!(report.is_success(), "no analysis received");
            Ok(())
        }
    }
}

/// Show the quiz recommendation, then optionally hand the conversation to
/// the chatbot with the quiz profile as context.
async fn quiz_then_chat(
    session: &mut ChatSession,
    config: &ClientConfig,
    request: ChatRequest,
    profile: serde_json::Value,
    follow_up: bool,
) -> Result<()> {
    let report = chat::stream_reply(session, request).await?;
    anyhow::ensure!(report.is_success(), "no recommendation received");
    if !follow_up {
        return Ok(());
    }

    println!("Ask follow-up questions, /exit to quit.");
    let transcript = Transcript::from_messages(report.transcript.messages().to_vec());
    let mut follow = ChatSession::from_config(config)?.with_transcript(transcript);
    chat::interactive(&mut follow, |text| {
        ChatRequest::new(Endpoint::ChatbotStream, text)
            .with_flow(FlowPayload::QuizData(profile.clone()))
    })
    .await
}
