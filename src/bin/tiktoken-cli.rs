//! `tiktoken-cli`: a small command-line front-end over the library, for quick manual inspection
//! of how a string tokenizes under a given encoding.

use std::io::Read as _;

use clap::{Parser, Subcommand};
use tiktoken_compat::loader::LoaderConfig;
use tiktoken_compat::{AllowedSpecial, DisallowedSpecial};

#[derive(Parser)]
#[command(name = "tiktoken-cli", about = "Encode, decode, or count tokens for a tiktoken-compatible encoding")]
struct Cli {
    /// Encoding name (cl100k_base, r50k_base, p50k_base, p50k_edit, o200k_base, o200k_harmony, gpt2).
    #[arg(short, long, default_value = "cl100k_base")]
    encoding: String,

    /// Resolve the encoding from a model name instead of `--encoding`.
    #[arg(short, long)]
    model: Option<String>,

    /// Directory to cache downloaded vocabulary files in.
    #[arg(long)]
    cache_dir: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode text from stdin (or --text) to token ids, one per line.
    Encode {
        #[arg(short, long)]
        text: Option<String>,
        /// Allow all special tokens to be encoded as dedicated ids instead of left as text.
        #[arg(long)]
        allow_special: bool,
    },
    /// Decode a whitespace-separated list of token ids from stdin (or --tokens) back to text.
    Decode {
        #[arg(short, long)]
        tokens: Option<String>,
    },
    /// Print the token count for text from stdin (or --text).
    Count {
        #[arg(short, long)]
        text: Option<String>,
    },
    /// List the built-in encoding names this binary knows about.
    ListEncodings,
}

fn read_stdin() -> std::io::Result<String> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if matches!(cli.command, Command::ListEncodings) {
        for name in tiktoken_compat::registry::list_encoding_names() {
            println!("{name}");
        }
        return Ok(());
    }

    let loader_config = LoaderConfig {
        cache_dir: cli.cache_dir.clone(),
        ..Default::default()
    };

    let enc = match &cli.model {
        Some(model) => tiktoken_compat::encoding_for_model(model, &loader_config)?,
        None => tiktoken_compat::get_encoding(&cli.encoding, &loader_config)?,
    };

    match cli.command {
        Command::Encode { text, allow_special } => {
            let text = match text {
                Some(t) => t,
                None => read_stdin()?,
            };
            let tokens = if allow_special {
                enc.encode(&text, AllowedSpecial::All, DisallowedSpecial::Some(Default::default()))?
            } else {
                enc.encode_ordinary(&text)?
            };
            for token in tokens {
                println!("{token}");
            }
        }
        Command::Decode { tokens } => {
            let tokens_str = match tokens {
                Some(t) => t,
                None => read_stdin()?,
            };
            let tokens: Vec<u32> = tokens_str
                .split_whitespace()
                .map(|s| s.parse())
                .collect::<Result<_, _>>()?;
            print!("{}", enc.decode(&tokens)?);
        }
        Command::Count { text } => {
            let text = match text {
                Some(t) => t,
                None => read_stdin()?,
            };
            println!("{}", enc.encode_ordinary(&text)?.len());
        }
        Command::ListEncodings => unreachable!("handled above"),
    }

    Ok(())
}
