use clap::Parser;
use mtrans_core::{Config, TranslateInput, Translator};
use serde::Serialize;
use std::io::{self, Read};

/// Translate text through the embedded engine and emit JSON result.
#[derive(Parser, Debug)]
#[command(name = "mtrans-cli", about = "Translate text and emit JSON result")]
struct Args {
    /// Read source text from file instead of stdin
    #[arg(long)]
    file: Option<std::path::PathBuf>,

    /// Source language code, or "auto" to detect
    #[arg(long, default_value = "auto")]
    from: String,

    /// Target language code
    #[arg(long)]
    to: String,

    /// Treat the input as HTML rather than plain text
    #[arg(long)]
    html: bool,
}

#[derive(Serialize)]
struct CliResult {
    text: String,
    error: Option<String>,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let source = if let Some(path) = args.file {
        std::fs::read_to_string(&path).unwrap_or_else(|e| {
            eprintln!("Error reading file: {e}");
            std::process::exit(1);
        })
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).unwrap_or_else(|e| {
            eprintln!("Error reading stdin: {e}");
            std::process::exit(1);
        });
        buf
    };

    let translator = Translator::new(Config::default());
    let result = translator.translate(TranslateInput::One(source), &args.from, &args.to, args.html);

    let cli_result = match result {
        Ok(TranslateInput::One(text)) => CliResult { text, error: None },
        Ok(TranslateInput::Many(mut texts)) => CliResult { text: texts.pop().unwrap_or_default(), error: None },
        Err(e) => CliResult { text: String::new(), error: Some(e.to_string()) },
    };

    let json = serde_json::to_string(&cli_result).expect("CliResult is always serializable");
    println!("{json}");
    translator.shutdown();
}
