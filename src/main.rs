use clap::Parser;
use std::io::Write;
use std::path::PathBuf;

use docxview::{Config, FileType, OutputFormat};

#[derive(Parser)]
#[command(name = "docxview", about = "Convert DOCX and PPTX files to Markdown, JSON or paged HTML")]
struct Args {
    /// Input document
    input: PathBuf,
    /// Output file (defaults to the input with the format's extension; `-` for stdout)
    output: Option<PathBuf>,
    /// Output format: markdown, json or html
    #[arg(short, long, default_value = "markdown")]
    format: OutputFormat,
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Markdown wrap column (0 disables wrapping)
    #[arg(long)]
    line_width: Option<usize>,
    /// Prepend YAML front matter built from document properties
    #[arg(long)]
    frontmatter: bool,
    /// Force the input type: docx, pptx, pages or key
    #[arg(long = "type")]
    file_type: Option<FileType>,
}

fn run(args: Args) -> docxview::Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(width) = args.line_width {
        config.line_width = width;
    }
    if args.frontmatter {
        config.include_frontmatter = true;
    }

    let output = docxview::convert_file_as(&args.input, args.file_type, args.format, &config)?;

    match args.output {
        Some(path) if path.as_os_str() == "-" => {
            std::io::stdout().write_all(output.as_str().as_bytes())?;
        }
        Some(path) => std::fs::write(path, output.as_str())?,
        None => {
            let path = args.input.with_extension(args.format.extension());
            std::fs::write(&path, output.as_str())?;
            log::info!("wrote {}", path.display());
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if !args.input.exists() {
        eprintln!("Error: file not found: {}", args.input.display());
        std::process::exit(1);
    }
    if !args.input.is_file() {
        eprintln!("Error: not a file: {}", args.input.display());
        std::process::exit(1);
    }

    if let Err(e) = run(args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
