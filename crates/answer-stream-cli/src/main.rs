//! Streams a chat answer for a prompt to stdout.
//!
//! Reads `OPENAI_API_KEY`, `OPENAI_MODEL` and `OPENAI_BASE_URL` from the
//! environment (a `.env` file is loaded first). Ctrl-C cancels the answer.

use std::io::Write as _;
use std::process::ExitCode;
use std::time::Duration;

use answer_stream::observability::init_observability;
use answer_stream::prelude::*;
use answer_stream::vendors::openai::{OpenAiClientConfig, OpenAiProvider};
use clap::Parser;

/// Exit status used when the user interrupts the answer.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Parser)]
#[command(name = "answer-stream", version, about = "Stream a chat answer to stdout")]
struct Args {
    /// Model identifier (overrides OPENAI_MODEL).
    #[arg(long)]
    model: Option<String>,
    /// Alternate API base URL (overrides OPENAI_BASE_URL).
    #[arg(long)]
    base_url: Option<String>,
    /// System instruction sent before the prompt.
    #[arg(long)]
    system: Option<String>,
    /// Seconds without data before the stream is abandoned; 0 disables.
    #[arg(long, default_value_t = 120)]
    idle_timeout: u64,
    /// Prompt text; multiple words are joined with spaces.
    #[arg(required = true)]
    prompt: Vec<String>,
}

impl Args {
    fn client_config(&self) -> Result<OpenAiClientConfig, HarnessError> {
        let mut config = OpenAiClientConfig::from_env()?;
        if let Some(model) = &self.model {
            config = config.model(model);
        }
        if let Some(base_url) = &self.base_url {
            config = config.base_url(base_url);
        }
        if let Some(system) = &self.system {
            config = config.system_prompt(system);
        }
        let idle = (self.idle_timeout > 0).then(|| Duration::from_secs(self.idle_timeout));
        Ok(config.idle_timeout(idle))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_observability("warn");
    let args = Args::parse();

    match run(&args).await {
        Ok(Outcome::Completed) => ExitCode::SUCCESS,
        Ok(Outcome::Interrupted) => ExitCode::from(EXIT_INTERRUPTED),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

enum Outcome {
    Completed,
    Interrupted,
}

async fn run(args: &Args) -> Result<Outcome, Box<dyn std::error::Error>> {
    let provider = OpenAiProvider::new(args.client_config()?)?;
    let signal = CancellationToken::new();

    let interrupt = signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupt received, cancelling answer");
            interrupt.cancel();
        }
    });

    let params = AnswerParams::new(args.prompt.join(" ")).signal(signal.clone());
    let mut events = provider.generate_answer(params).await;
    tracing::debug!(call_id = %events.call_id(), "answer stream opened");

    let mut stdout = std::io::stdout();
    let mut printed = 0;
    while let Some(event) = events.next_event().await {
        match event {
            AnswerEvent::Answer { text, .. } => {
                let fresh = text.get(printed..).unwrap_or(&text);
                stdout.write_all(fresh.as_bytes())?;
                stdout.flush()?;
                printed = text.len();
            }
            AnswerEvent::Done => {
                writeln!(stdout)?;
                return Ok(Outcome::Completed);
            }
            AnswerEvent::Error { error } => {
                if printed > 0 {
                    writeln!(stdout)?;
                }
                return Err(error.into());
            }
        }
    }

    if printed > 0 {
        writeln!(stdout)?;
    }
    if signal.is_cancelled() {
        Ok(Outcome::Interrupted)
    } else {
        Err(StreamError::Protocol("answer stream ended unexpectedly".into()).into())
    }
}
