use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wadtex::archive::WadArchive;
use wadtex::hash::hash_path;
use wadtex::locate::{LocateOptions, PORTRAIT_HEIGHT, PORTRAIT_WIDTH};

#[derive(Parser)]
#[command(name = "wadtex", about = "Inspect WAD skin archives and pull out loading-screen portraits")]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct LocateArgs {
    /// Character name used to predict the portrait path
    #[arg(long)]
    hint: Option<String>,
    /// Skin number for skin-specific portrait paths
    #[arg(long)]
    skin: Option<u32>,
    #[arg(long, default_value_t = PORTRAIT_WIDTH)]
    width: u16,
    #[arg(long, default_value_t = PORTRAIT_HEIGHT)]
    height: u16,
}

impl From<LocateArgs> for LocateOptions {
    fn from(a: LocateArgs) -> Self {
        LocateOptions {
            hint:          a.hint,
            skin:          a.skin,
            target_width:  a.width,
            target_height: a.height,
            ..LocateOptions::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show header fields
    Info {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List chunk descriptors
    List {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print the path hash of one or more virtual paths
    Hash {
        #[arg(required = true, num_args = 1..)]
        paths: Vec<String>,
    },
    /// Find the loading-screen portrait
    Locate {
        input: PathBuf,
        #[command(flatten)]
        args: LocateArgs,
    },
    /// Find the loading-screen portrait and write it to a scratch directory
    Extract {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        #[command(flatten)]
        args: LocateArgs,
    },
    /// Decode every chunk into a directory
    Unpack {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Check per-chunk checksums
    Verify {
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let wad = WadArchive::open(&input)?;
            let h   = wad.header();
            if json {
                println!("{}", serde_json::to_string_pretty(h)?);
                return Ok(());
            }
            println!("── WAD Archive ──────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Version        {}.{}", h.version_major, h.version_minor);
            match h.checksum {
                Some(sum) => println!("  Checksum       {sum:016x}"),
                None      => println!("  Checksum       -"),
            }
            println!("  Header size    {} B", h.header_len());
            println!("  Entries        {}", h.entry_count);
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let wad = WadArchive::open(&input)?;
            if json {
                let rows: Vec<_> = wad.chunks().iter().map(|c| c.summary()).collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{:>6}  {:<16}  {:>10} {:>10} {:>10}  {:<12} {:>4}",
                         "Index", "Path hash", "Offset", "Stored", "Size", "Codec", "Sub");
                for c in wad.chunks() {
                    println!("{:>6}  {}  {:>10} {:>10} {:>10}  {:<12} {:>4}{}",
                        c.index, c.path_hash, c.offset, c.compressed_size, c.size,
                        c.codec.name(), c.subchunk_count,
                        if c.is_duplicate { "  dup" } else { "" });
                }
            }
        }

        // ── Hash ─────────────────────────────────────────────────────────────
        Commands::Hash { paths } => {
            for p in paths {
                println!("{}  {}", hash_path(&p), p);
            }
        }

        // ── Locate ───────────────────────────────────────────────────────────
        Commands::Locate { input, args } => {
            let wad  = WadArchive::open(&input)?;
            let opts = LocateOptions::from(args);
            match wad.locate(&opts)? {
                Some(found) => {
                    println!("chunk     {}", found.chunk.index);
                    println!("hash      {}", found.chunk.path_hash);
                    println!("strategy  {:?}", found.strategy);
                    if let Some(path) = &found.path {
                        println!("path      {path}");
                    }
                    println!("size      {}x{}", found.tex.width, found.tex.height);
                    println!("format    {} ({})", found.tex.format, found.tex.format_name());
                }
                None => println!("No loading-screen portrait in {}", input.display()),
            }
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, output_dir, args } => {
            let wad = WadArchive::open(&input)?;
            match wad.extract_portrait(&LocateOptions::from(args), &output_dir)? {
                Some(path) => println!("Extracted: {}", path.display()),
                None       => println!("No loading-screen portrait in {}", input.display()),
            }
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, output_dir } => {
            let wad    = WadArchive::open(&input)?;
            let report = wad.unpack_all(&output_dir)?;
            println!("Unpacked {} chunk(s) to {}", report.written, output_dir.display());
            if !report.skipped.is_empty() {
                println!("Skipped {} chunk(s): {:?}", report.skipped.len(), report.skipped);
            }
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { input } => {
            let wad    = WadArchive::open(&input)?;
            let report = wad.verify_checksums();
            if report.unsupported {
                println!("Version {}.{} chunk checksums cannot be verified",
                         wad.header().version_major, wad.header().version_minor);
            } else {
                println!("{} chunk(s) checked, {} mismatch(es)", report.checked, report.mismatched.len());
                for i in &report.mismatched {
                    println!("  mismatch  chunk {i}");
                }
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
