//! acl-run CLI: classify packet batches against a compiled rule set image.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use acl_run::{Isa, RuleSet, RuleSetImage, SearchConfig, Transition, Width};

#[derive(Debug, Parser)]
#[command(name = "acl-run")]
#[command(about = "Vectorized ACL trie classification", long_about = None)]
#[command(version)]
struct Cli {
    /// Print debug diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify packets and print one line of results per packet
    Classify(ClassifyArgs),
    /// Print rule set statistics
    Inspect(InspectArgs),
}

/// Classify packets and print one line of results per packet
#[derive(Debug, Parser)]
struct ClassifyArgs {
    /// Rule set image (JSON)
    #[arg(short, long)]
    rules: PathBuf,

    /// Packet file: one hex-encoded packet per line, `-` for an empty packet.
    /// Blank lines and lines starting with `#` are skipped.
    #[arg(short, long)]
    packets: PathBuf,

    /// Result categories per packet (1 or a multiple of 4, default: all)
    #[arg(short, long)]
    categories: Option<usize>,

    /// Concurrent trie walks
    #[arg(short, long, default_value = "8")]
    width: WidthArg,

    /// Instruction set for the lane groups
    #[arg(long, default_value = "auto")]
    isa: IsaArg,

    /// Output file path (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Print rule set statistics
#[derive(Debug, Parser)]
struct InspectArgs {
    /// Rule set image (JSON)
    #[arg(short, long)]
    rules: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WidthArg {
    /// One group of four lanes
    #[value(name = "4")]
    X4,
    /// Two groups of four lanes
    #[value(name = "8")]
    X8,
}

impl From<WidthArg> for Width {
    fn from(arg: WidthArg) -> Self {
        match arg {
            WidthArg::X4 => Width::X4,
            WidthArg::X8 => Width::X8,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum IsaArg {
    /// SSE4.1 when supported, otherwise portable
    Auto,
    /// Emulated vectors
    Portable,
    /// SSSE3/SSE4.1 intrinsics
    Sse41,
}

impl From<IsaArg> for Isa {
    fn from(arg: IsaArg) -> Self {
        match arg {
            IsaArg::Auto => Isa::Auto,
            IsaArg::Portable => Isa::Portable,
            IsaArg::Sse41 => Isa::Sse41,
        }
    }
}

/// Minimal stderr sink for the `log` facade.
struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        log::set_logger(&LOGGER)
            .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))?;
        log::set_max_level(log::LevelFilter::Debug);
    }

    match cli.command {
        Command::Classify(args) => run_classify(args),
        Command::Inspect(args) => run_inspect(args),
    }
}

fn load_rules(path: &Path) -> Result<RuleSet> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read rule set: {}", path.display()))?;
    let image: RuleSetImage = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse rule set image: {}", path.display()))?;
    RuleSet::from_image(image).with_context(|| format!("Invalid rule set: {}", path.display()))
}

fn load_packets(path: &Path) -> Result<Vec<Vec<u8>>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read packets: {}", path.display()))?;

    let mut packets = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line == "-" {
            packets.push(Vec::new());
            continue;
        }
        let packet = hex::decode(line)
            .with_context(|| format!("{}:{}: invalid hex packet", path.display(), n + 1))?;
        packets.push(packet);
    }
    Ok(packets)
}

fn run_classify(args: ClassifyArgs) -> Result<()> {
    let rules = load_rules(&args.rules)?;
    let packets = load_packets(&args.packets)?;
    let categories = args.categories.unwrap_or(rules.categories());

    let config = SearchConfig::default()
        .with_width(args.width.into())
        .with_isa(args.isa.into());

    let data: Vec<&[u8]> = packets.iter().map(Vec::as_slice).collect();
    let mut results = vec![0u32; data.len() * categories];
    rules
        .search_with(&data, &mut results, categories, &config)
        .context("Search failed")?;

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(fs::File::create(path).with_context(|| {
            format!("Failed to create output file: {}", path.display())
        })?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    for row in results.chunks(categories) {
        let line: Vec<String> = row.iter().map(u32::to_string).collect();
        writeln!(out, "{}", line.join(" "))?;
    }
    out.flush()?;
    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    let rules = load_rules(&args.rules)?;
    let counts = rules.node_counts();
    let image = rules.to_image();

    println!("words:        {}", image.words.len());
    println!("match entries: {}", image.matches.len());
    println!("categories:   {}", rules.categories());
    println!("tries:        {}", rules.num_tries());
    println!(
        "nodes:        {} dfa, {} quad, {} single, {} match",
        counts.dfa, counts.quad, counts.single, counts.matches
    );

    for (n, trie) in image.tries.iter().enumerate() {
        let root = match Transition::decode(trie.root)? {
            Transition::Dfa { index, .. } => format!("dfa @{}", index),
            Transition::Range { kind, index, .. } => format!("{:?} @{}", kind, index).to_lowercase(),
            Transition::Match { result } => format!("match #{}", result),
        };
        println!(
            "  trie {}: root {}, {} input chunks",
            n,
            root,
            trie.data_index.len()
        );
    }
    Ok(())
}
