use clap::{Args, Parser, Subcommand};
use gfy::grammar::{self, Style};
use gfy::{Callbacks, GenerationOptions, InferenceSession, ServiceProbe, SessionConfig};
use std::error::Error;
use std::io::Write;
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "gfy", about = "Talk to a local text-generation backend")]
struct Cli {
    /// Backend API root
    #[arg(long, env = "GFY_BASE_URL", default_value = gfy::DEFAULT_BASE_URL, global = true)]
    base_url: String,

    #[arg(long, short, env = "GFY_MODEL", default_value = gfy::DEFAULT_MODEL, global = true)]
    model: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the models installed on the backend
    Models,
    /// Send one prompt and print the reply
    Chat {
        prompt: String,
        /// Wait for the whole reply instead of streaming tokens
        #[arg(long)]
        no_stream: bool,
        #[arg(long, env = "GFY_SYSTEM_PROMPT")]
        system: Option<String>,
        #[command(flatten)]
        sampling: SamplingArgs,
    },
    /// Fix the grammar of text read from stdin. Sampling starts from the
    /// tuned preset.
    Fix {
        #[arg(long, default_value = "regular")]
        style: Style,
        #[command(flatten)]
        sampling: SamplingArgs,
    },
}

#[derive(Args)]
struct SamplingArgs {
    /// Start from the tuned option preset (always on for `fix`)
    #[arg(long)]
    recommended: bool,
    #[arg(long)]
    temperature: Option<f64>,
    #[arg(long)]
    top_k: Option<i64>,
    #[arg(long)]
    top_p: Option<f64>,
    #[arg(long)]
    num_predict: Option<i64>,
    #[arg(long)]
    num_ctx: Option<i64>,
    #[arg(long)]
    seed: Option<i64>,
    #[arg(long)]
    stop: Option<String>,
}

impl SamplingArgs {
    /// Overlays the explicit flags on `base`, or on the preset when
    /// `--recommended` was given.
    fn to_options(&self, base: GenerationOptions) -> GenerationOptions {
        let mut options = if self.recommended {
            GenerationOptions::recommended()
        } else {
            base
        };
        options.temperature = self.temperature.or(options.temperature);
        options.top_k = self.top_k.or(options.top_k);
        options.top_p = self.top_p.or(options.top_p);
        options.num_predict = self.num_predict.or(options.num_predict);
        options.num_ctx = self.num_ctx.or(options.num_ctx);
        options.seed = self.seed.or(options.seed);
        if let Some(stop) = &self.stop {
            options.stop = Some(stop.clone());
        }
        options
    }
}

#[tokio::main]
async fn main() -> CliResult<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gfy=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = SessionConfig::new(cli.model).base_url(&cli.base_url);

    match cli.command {
        Command::Models => list_models(&config).await,
        Command::Chat {
            prompt,
            no_stream,
            system,
            sampling,
        } => {
            let mut config = config.options(sampling.to_options(GenerationOptions::new()));
            config.system_prompt = system;
            chat(config, prompt, !no_stream).await
        }
        Command::Fix { style, sampling } => {
            let options = sampling.to_options(GenerationOptions::recommended());
            fix(config.options(options), style).await
        }
    }
}

async fn list_models(config: &SessionConfig) -> CliResult<()> {
    let probe = ServiceProbe::new(reqwest::Client::new(), config);
    for model in probe.list_models().await? {
        println!("{}", model.name);
    }
    Ok(())
}

async fn connect(config: SessionConfig) -> CliResult<InferenceSession> {
    let session = InferenceSession::new(config);
    session.wait_ready().await?;
    Ok(session)
}

async fn chat(config: SessionConfig, prompt: String, stream: bool) -> CliResult<()> {
    let session = connect(config).await?;

    if !stream {
        println!("{}", session.complete(prompt).await?);
        return Ok(());
    }

    let (tx, rx) = oneshot::channel();
    let callbacks = Callbacks::on_result(move |result| {
        let _ = tx.send(result);
    })
    .on_token(|delta| {
        print!("{}", delta);
        let _ = std::io::stdout().flush();
    });
    session.generate(prompt, callbacks);

    tokio::select! {
        result = rx => {
            result.map_err(|_| "session closed before replying")??;
            println!();
        }
        _ = tokio::signal::ctrl_c() => {
            session.cancel().await;
            println!();
            eprintln!("cancelled");
        }
    }

    Ok(())
}

async fn fix(config: SessionConfig, style: Style) -> CliResult<()> {
    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;
    let text = grammar::validate_selection(&input)?;

    let session = connect(config).await?;
    let reply = session.complete(grammar::build_prompt(text, style)).await?;

    match grammar::interpret_reply(&reply) {
        Some(fixed) => println!("{}", fixed),
        None => {
            tracing::info!("no changes needed");
            println!("{}", text);
        }
    }
    Ok(())
}
