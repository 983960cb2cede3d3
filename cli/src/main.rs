//! Rulebot CLI - terminal chat loop against the rulebot service.
//!
//! # Flow
//!
//! ```text
//! main() -> init_tracing() -> CliOptions::parse() -> chat_loop()
//!                                                        |
//!                                 read line -> ask() -> render_reply() -> print
//! ```
//!
//! One request/response exchange per turn; the transcript lives in memory for
//! the process lifetime only. `/clear` resets it to the opening greeting,
//! `/history` reprints it, `/quit` exits.

use std::env;
use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing_subscriber::EnvFilter;

use rulebot_client::{ChatConfig, RequestMode, ask, render_reply};
use rulebot_types::{AccessToken, LlmModel, Query, TopK};

const DEFAULT_BASE_URL: &str = "https://ice-hockey-rulebot-d4e727a4fff5.herokuapp.com";
const API_KEY_ENV: &str = "RULEBOT_API_KEY";
const BASE_URL_ENV: &str = "RULEBOT_BASE_URL";

const GREETING: &str = "I am ready to assist you in understanding the IIHF 2023/24 rulebook!";
const PROMPT: &str = "you> ";
const ANSWER_PREFIX: &str = "rulebot> ";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_else(|_| EnvFilter::new("error"));

    // Logs go to stderr so the chat transcript on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
}

#[derive(Debug)]
struct CliOptions {
    base_url: String,
    api_key: Option<String>,
    model: Option<LlmModel>,
    top_k: Option<TopK>,
    show_rules: bool,
    stream: bool,
    timeout_secs: Option<u64>,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            base_url: env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            api_key: env::var(API_KEY_ENV).ok(),
            model: None,
            top_k: None,
            show_rules: false,
            stream: false,
            timeout_secs: None,
        }
    }
}

enum Invocation {
    Run(CliOptions),
    Help,
    Version,
}

impl CliOptions {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Invocation> {
        let mut options = CliOptions::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => return Ok(Invocation::Help),
                "-V" | "--version" => return Ok(Invocation::Version),
                "--show-rules" => options.show_rules = true,
                "--stream" => options.stream = true,
                "--base-url" => {
                    options.base_url = take_value(&mut args, "--base-url")?;
                }
                "--api-key" => {
                    options.api_key = Some(take_value(&mut args, "--api-key")?);
                }
                "--model" => {
                    let raw = take_value(&mut args, "--model")?;
                    options.model = Some(LlmModel::parse(&raw)?);
                }
                "--top-k" => {
                    let raw = take_value(&mut args, "--top-k")?;
                    let value: u8 = raw
                        .parse()
                        .with_context(|| format!("--top-k value '{raw}' is not a number"))?;
                    options.top_k = Some(TopK::new(value)?);
                }
                "--timeout-secs" => {
                    let raw = take_value(&mut args, "--timeout-secs")?;
                    let value: u64 = raw
                        .parse()
                        .with_context(|| format!("--timeout-secs value '{raw}' is not a number"))?;
                    options.timeout_secs = Some(value);
                }
                other => bail!("unknown argument '{other}' (try --help)"),
            }
        }

        Ok(Invocation::Run(options))
    }
}

fn take_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .with_context(|| format!("{flag} requires a value"))
}

fn print_usage() {
    println!(
        "rulebot - chat with the IIHF ice-hockey rulebook\n\
         \n\
         USAGE:\n\
         \x20   rulebot [OPTIONS]\n\
         \n\
         OPTIONS:\n\
         \x20   --api-key <KEY>        Access key (or set {API_KEY_ENV})\n\
         \x20   --base-url <URL>       Chat server base URL (or set {BASE_URL_ENV})\n\
         \x20   --model <ID>           Answering model, one of: {models}\n\
         \x20   --top-k <N>            Rule matches to interpret (4, 5 or 6)\n\
         \x20   --show-rules           Show rules retrieved for analysis with each answer\n\
         \x20   --stream               Use the streamed response wire format\n\
         \x20   --timeout-secs <N>     Give up on a turn after N seconds\n\
         \x20   -h, --help             Print this help\n\
         \x20   -V, --version          Print the version\n\
         \n\
         COMMANDS (inside the chat):\n\
         \x20   /clear    Reset the transcript\n\
         \x20   /history  Reprint the transcript\n\
         \x20   /quit     Exit",
        models = LlmModel::all()
            .iter()
            .map(|m| m.model_id())
            .collect::<Vec<_>>()
            .join(", "),
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
struct ChatMessage {
    role: Role,
    content: String,
}

impl ChatMessage {
    fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    fn print(&self) {
        match self.role {
            Role::User => println!("{PROMPT}{}", self.content),
            Role::Assistant => println!("{ANSWER_PREFIX}{}\n", self.content),
        }
    }
}

fn fresh_transcript() -> Vec<ChatMessage> {
    vec![ChatMessage::assistant(GREETING)]
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let options = match CliOptions::parse(env::args().skip(1))? {
        Invocation::Help => {
            print_usage();
            return Ok(());
        }
        Invocation::Version => {
            println!("rulebot {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Invocation::Run(options) => options,
    };

    let Some(ref api_key) = options.api_key else {
        bail!("no API key: pass --api-key or set {API_KEY_ENV}");
    };
    let token = AccessToken::new(api_key).context("API key must not be empty")?;

    let mut config = ChatConfig::new(&options.base_url, token)?;
    if options.stream {
        config = config.with_mode(RequestMode::StreamedJson);
    }
    if let Some(secs) = options.timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs));
    }

    tracing::info!(base_url = %options.base_url, streamed = options.stream, "Rulebot session starting");

    chat_loop(&config, &options).await
}

async fn chat_loop(config: &ChatConfig, options: &CliOptions) -> Result<()> {
    let mut transcript = fresh_transcript();
    transcript[0].print();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("{PROMPT}");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break; // EOF
        };
        let line = line?;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" => break,
            "/clear" => {
                transcript = fresh_transcript();
                transcript[0].print();
                continue;
            }
            "/history" => {
                for message in &transcript {
                    message.print();
                }
                continue;
            }
            _ => {}
        }

        let mut query = match Query::new(input) {
            Ok(query) => query,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        if let Some(model) = options.model {
            query = query.with_model(model);
        }
        if let Some(top_k) = options.top_k {
            query = query.with_top_k(top_k);
        }

        transcript.push(ChatMessage::user(input));

        let result = ask(config, &query).await;
        if let Err(error) = &result {
            tracing::warn!(%error, "Chat turn failed");
        }
        let answer = render_reply(&result, options.show_rules);

        let message = ChatMessage::assistant(answer);
        message.print();
        transcript.push(message);
    }

    Ok(())
}
