mod cli;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio::io::AsyncRead;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use imgest::{DecodedImage, Ingest, IngestOptions, ReadRequest, StreamEvent};

#[derive(Serialize)]
struct FrameSummary<'a> {
    source: &'a str,
    index: usize,
    width: u32,
    height: u32,
    channels: u8,
    element_type: String,
    bytes: usize,
    digest: String,
}

impl<'a> FrameSummary<'a> {
    fn new(source: &'a str, index: usize, img: &DecodedImage) -> Self {
        Self {
            source,
            index,
            width: img.width(),
            height: img.height(),
            channels: img.channels(),
            element_type: img.element_type().to_string(),
            bytes: img.data().len(),
            digest: img.digest(),
        }
    }

    fn print(&self, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string(self)?);
        } else {
            println!(
                "{}[{}] {}x{}x{} {} {}",
                self.source,
                self.index,
                self.width,
                self.height,
                self.channels,
                self.element_type,
                self.digest
            );
        }
        Ok(())
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_options(cli: &Cli) -> Result<IngestOptions> {
    let mut options = match &cli.config {
        Some(path) => IngestOptions::load(path)?,
        None => IngestOptions::default(),
    };
    if let Some(workers) = cli.workers {
        options = options.with_workers(workers);
    }

    if let Commands::Stream {
        stream_mode,
        on_error,
        chunk_size,
        ..
    } = &cli.command
    {
        let mut stream = options.stream.clone();
        if let Some(mode) = stream_mode {
            stream = stream.with_mode(*mode);
        }
        if let Some(policy) = on_error {
            stream = stream.with_policy(*policy);
        }
        if let Some(size) = chunk_size {
            stream = stream.with_read_chunk_size(*size);
        }
        options = options.with_stream(stream);
    }

    Ok(options)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = load_options(&cli)?;
    let ingest = Ingest::new(options).context("Failed to start decoder")?;

    match cli.command {
        Commands::Decode {
            inputs,
            mode,
            format,
            json,
        } => run_decode(&ingest, &inputs, mode, format, json).await,
        Commands::Demux { input, mode, json } => run_demux(&ingest, &input, mode, json).await,
        Commands::Stream { input, json, .. } => run_stream(&ingest, input, json).await,
    }
}

async fn run_decode(
    ingest: &Ingest,
    inputs: &[PathBuf],
    mode: Option<imgest::ReadMode>,
    format: Option<imgest::ImageFormat>,
    json: bool,
) -> Result<()> {
    // queue everything first so the pool decodes in parallel
    let pending: Vec<_> = inputs
        .iter()
        .map(|path| {
            let mut request = ReadRequest::path(path);
            if let Some(mode) = mode {
                request = request.with_mode(mode);
            }
            if let Some(format) = format {
                request = request.with_format(format);
            }
            ingest.read_image(request)
        })
        .collect();

    let mut failures = 0;
    for (path, pending) in inputs.iter().zip(pending) {
        let name = path.display().to_string();
        match pending.await {
            Ok(img) => FrameSummary::new(&name, 0, &img).print(json)?,
            Err(err) => {
                warn!("{}: {}", name, err);
                eprintln!("{name}: {err}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} inputs failed to decode", inputs.len());
    }
    Ok(())
}

async fn run_demux(
    ingest: &Ingest,
    input: &Path,
    mode: Option<imgest::ReadMode>,
    json: bool,
) -> Result<()> {
    let mut request = ReadRequest::path(input);
    if let Some(mode) = mode {
        request = request.with_mode(mode);
    }

    let name = input.display().to_string();
    let frames = ingest
        .read_multi(request)
        .await
        .with_context(|| format!("Failed to demux {name}"))?;

    info!("{} frames in {}", frames.len(), name);
    for (index, frame) in frames.iter().enumerate() {
        FrameSummary::new(&name, index, frame).print(json)?;
    }
    Ok(())
}

async fn run_stream(ingest: &Ingest, input: Option<PathBuf>, json: bool) -> Result<()> {
    let (name, reader): (String, Box<dyn AsyncRead + Unpin + Send>) = match input {
        Some(path) if path.as_os_str() != "-" => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            (path.display().to_string(), Box::new(file))
        }
        _ => ("stdin".to_string(), Box::new(tokio::io::stdin())),
    };

    let mut events = ingest.decode_stream(reader)?;
    let mut index = 0;
    let mut errors = 0;

    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Frame(img) => {
                FrameSummary::new(&name, index, &img).print(json)?;
                index += 1;
            }
            StreamEvent::Error(err) => {
                eprintln!("{name}: {err}");
                errors += 1;
            }
            StreamEvent::End => break,
        }
    }

    info!("{} frames decoded from {}, {} errors", index, name, errors);
    if errors > 0 {
        anyhow::bail!("{errors} stream errors");
    }
    Ok(())
}
