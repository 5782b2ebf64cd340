//! bnsdat CLI - Command-line tool for inspecting and repacking datafiles.
//!
//! This is the main entry point for the bnsdat command-line application.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use bnsdat::datafile::DEFAULT_COMPRESSION_BLOCK_SIZE;
use bnsdat::prelude::*;

/// bnsdat - datafile inspection and repacking tool
#[derive(Parser)]
#[command(name = "bnsdat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that opens a datafile.
#[derive(Args)]
struct DatafileArgs {
    /// Input datafile
    #[arg(short, long, env = "INPUT_DATAFILE")]
    input: PathBuf,

    /// Read the file with 64-bit size fields
    #[arg(long)]
    x64: bool,
}

impl DatafileArgs {
    fn width(&self) -> IntWidth {
        if self.x64 {
            IntWidth::Bits64
        } else {
            IntWidth::Bits32
        }
    }

    fn open(&self, lazy: bool) -> Result<Datafile> {
        let options = ReadOptions::new().width(self.width()).lazy(lazy);
        Datafile::open(&self.input, &options)
            .with_context(|| format!("Failed to open datafile {}", self.input.display()))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show the header and table list of a datafile
    Info {
        #[command(flatten)]
        datafile: DatafileArgs,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Read a datafile and write it back out
    Repack {
        #[command(flatten)]
        datafile: DatafileArgs,

        /// Output datafile
        #[arg(short, long)]
        output: PathBuf,

        /// Decode every table instead of copying untouched ones through
        #[arg(long)]
        eager: bool,

        /// Upper bound for the inflated size of one compressed block
        #[arg(long, default_value_t = DEFAULT_COMPRESSION_BLOCK_SIZE)]
        block_size: usize,
    },

    /// Query the alias name table
    Aliases {
        #[command(flatten)]
        datafile: DatafileArgs,

        #[command(subcommand)]
        action: AliasAction,
    },

    /// Write the raw bytes of one table
    ExtractTable {
        #[command(flatten)]
        datafile: DatafileArgs,

        /// Table type to extract
        #[arg(short = 't', long)]
        table_type: i16,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Read a terrain file and write it back out
    TerrainRepack {
        /// Input terrain file
        #[arg(short, long)]
        input: PathBuf,

        /// Output terrain file
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum AliasAction {
    /// List every alias, optionally only those starting with a prefix
    List {
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Look up the reference stored under one alias
    Resolve { alias: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Info { datafile, json } => {
            cmd_info(&datafile, json)?;
        }
        Commands::Repack {
            datafile,
            output,
            eager,
            block_size,
        } => {
            cmd_repack(&datafile, &output, eager, block_size)?;
        }
        Commands::Aliases { datafile, action } => {
            cmd_aliases(&datafile, action)?;
        }
        Commands::ExtractTable {
            datafile,
            table_type,
            output,
        } => {
            cmd_extract_table(&datafile, table_type, &output)?;
        }
        Commands::TerrainRepack { input, output } => {
            cmd_terrain_repack(&input, &output)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn cmd_info(args: &DatafileArgs, as_json: bool) -> Result<()> {
    let datafile = args.open(true)?;
    let header = &datafile.header;

    if as_json {
        let tables: Vec<_> = datafile
            .tables
            .iter()
            .map(|table| {
                let header = table.header();
                json!({
                    "type": header.table_type,
                    "version": format!("{}.{}", header.major_version, header.minor_version),
                    "compressed": header.is_compressed,
                    "size": header.size,
                })
            })
            .collect();

        let info = json!({
            "magic": header.magic_str(),
            "version": header.version,
            "client_version": header.client_version,
            "created_at": header.created_at,
            "table_count": header.table_count,
            "alias_count": header.alias_count,
            "alias_map_size": header.alias_map_size,
            "max_buffer_size": header.max_buffer_size,
            "tables": tables,
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let [major, minor, build, revision] = header.client_version;
    println!("Magic:          {}", header.magic_str());
    println!("Version:        {}", header.version);
    println!("Client version: {major}.{minor}.{build}.{revision}");
    println!("Created at:     {}", header.created_at);
    println!("Tables:         {}", header.table_count);
    println!("Aliases:        {}", header.alias_count);
    println!("Max buffer:     {}", header.max_buffer_size);
    println!();

    println!("{:>6} {:>8} {:>4} {:>12}", "type", "version", "", "size");
    for table in &datafile.tables {
        let header = table.header();
        println!(
            "{:>6} {:>8} {:>4} {:>12}",
            header.table_type,
            format!("{}.{}", header.major_version, header.minor_version),
            if header.is_compressed { "Z" } else { " " },
            header.size
        );
    }

    Ok(())
}

fn cmd_repack(args: &DatafileArgs, output: &Path, eager: bool, block_size: usize) -> Result<()> {
    println!("Opening datafile: {}", args.input.display());

    let start = Instant::now();
    let datafile = args.open(true)?;
    println!("Read {} tables in {:?}", datafile.tables.len(), start.elapsed());

    if eager {
        let pb = progress_bar(datafile.tables.len())?;
        for (index, table) in datafile.tables.iter().enumerate() {
            table
                .load()
                .with_context(|| format!("Failed to decode table {index} (type {})", table.table_type()))?;
            pb.inc(1);
        }
        pb.finish_with_message("Done");
    }

    let options = WriteOptions::new().compression_block_size(block_size);
    let start = Instant::now();
    datafile
        .write_to_file(output, &options)
        .context("Failed to write datafile")?;

    println!("Wrote {} in {:?}", output.display(), start.elapsed());

    Ok(())
}

fn cmd_aliases(args: &DatafileArgs, action: AliasAction) -> Result<()> {
    let datafile = args.open(true)?;
    let Some(names) = &datafile.name_table else {
        bail!("{} has no name table", args.input.display());
    };

    match action {
        AliasAction::List { prefix } => {
            let mut count = 0;
            for (alias, key) in names.aliases().context("Failed to read name table")? {
                if let Some(prefix) = &prefix {
                    if !alias.starts_with(prefix.as_str()) {
                        continue;
                    }
                }
                println!("{:>16} {alias}", key.to_string());
                count += 1;
            }
            println!("\nTotal: {} aliases", count);
        }
        AliasAction::Resolve { alias } => match names.resolve(&alias).context("Failed to read name table")? {
            Some(key) => println!("{key}"),
            None => bail!("alias {alias:?} not found"),
        },
    }

    Ok(())
}

fn cmd_extract_table(args: &DatafileArgs, table_type: i16, output: &Path) -> Result<()> {
    let datafile = args.open(true)?;
    let table = datafile
        .table_by_type(table_type)
        .with_context(|| format!("No table of type {table_type}"))?;

    let bytes = table
        .to_bytes(datafile.width, &WriteOptions::default())
        .context("Failed to encode table")?;
    fs::write(output, &bytes).context("Failed to write output file")?;

    println!("Wrote {} bytes to {}", bytes.len(), output.display());

    Ok(())
}

fn cmd_terrain_repack(input: &Path, output: &Path) -> Result<()> {
    println!("Processing terrain file: {}", input.display());

    let terrain = BinTerrain::open(input).context("Failed to read terrain file")?;
    println!(
        "Zone {}: {}x{} grid, {} sectors",
        terrain.zone_id,
        terrain.sector_count_x,
        terrain.sector_count_y,
        terrain.sectors.len()
    );

    let bytes = terrain.to_bytes().context("Failed to encode terrain file")?;
    fs::write(output, bytes).context("Failed to write output file")?;

    println!("Written to: {}", output.display());

    Ok(())
}
