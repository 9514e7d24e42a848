use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use hotbackup_sync::config::Config;
use hotbackup_sync::error::{Error, Result};
use hotbackup_sync::journal::{JournalValue, Sibling};
use hotbackup_sync::orchestrate::{self, RetrieveOutcome};

#[derive(Parser)]
#[command(name = "hotbackup-sync", version, about = "Sync Riak hot-backups with S3, and retrieve objects from them")]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace); overridden by RUST_LOG
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror this node's owned partitions to S3 under a tag
    Backup {
        tag: String,
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Stage a tagged S3 backup back onto local disk
    Restore {
        tag: String,
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Retrieve a single object from a tagged backup without restoring it
    Retrieve {
        tag: String,
        #[arg(short, long)]
        bucket: String,
        #[arg(short, long)]
        key: String,
        #[arg(short = 't', long)]
        buckettype: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the version history of the top-level MANIFESTS object
    ListVersions {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// `-v`/`-vv` raises the default filter; `RUST_LOG` always wins if set.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Backup { tag, config } => {
            let config = Config::load(&config)?;
            orchestrate::backup(&config, &tag)
        }
        Commands::Restore { tag, config } => {
            let config = Config::load(&config)?;
            orchestrate::restore(&config, &tag)
        }
        Commands::Retrieve { tag, bucket, key, buckettype, output, config } => {
            let config = Config::load(&config)?;
            let outcome = orchestrate::retrieve(
                &config,
                &tag,
                bucket.as_bytes(),
                key.as_bytes(),
                buckettype.as_deref().map(str::as_bytes),
            )?;
            report_retrieve(outcome, output.as_deref())
        }
        Commands::ListVersions { config } => {
            let config = Config::load(&config)?;
            for version in orchestrate::list_versions(&config)? {
                println!("{}  {}", version.last_modified.to_rfc3339(), version.version_id);
            }
            Ok(())
        }
    }
}

fn report_retrieve(outcome: RetrieveOutcome, output: Option<&std::path::Path>) -> Result<()> {
    let (journal_file, riak_object) = match outcome {
        RetrieveOutcome::NotFoundInBackup => {
            println!("Could not find key in hotbackup.");
            return Ok(());
        }
        RetrieveOutcome::Found { journal_file, riak_object, .. } => (journal_file, riak_object),
    };

    match riak_object.siblings.len() {
        0 => println!("Could not find bucket/key in {journal_file}\n"),
        1 => {
            println!("Found object in journal.");
            match output {
                Some(path) => write_sibling(path, &riak_object.siblings[0])?,
                None => print_sibling(&riak_object.siblings[0]),
            }
        }
        n => {
            println!("Found {n} siblings.\n");
            for (idx, sibling) in riak_object.siblings.iter().enumerate() {
                match output {
                    Some(path) => {
                        let indexed = path.with_extension(format!("{idx}"));
                        write_sibling(&indexed, sibling)?;
                    }
                    None => {
                        println!("Sibling {idx}:");
                        print_sibling(sibling);
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_sibling(sibling: &Sibling) {
    println!("Last Modified: {}. Vtag: {}\n", sibling.metadata.last_modified_string(), String::from_utf8_lossy(&sibling.metadata.vtag));
    match &sibling.value {
        JournalValue::Binary(bytes) => println!("Object value:\n\n{}\n", String::from_utf8_lossy(bytes)),
        JournalValue::Term(term) => println!("Object value:\n\n{term:?}\n"),
    }
}

fn write_sibling(path: &std::path::Path, sibling: &Sibling) -> Result<()> {
    println!("Writing object to file {}", path.display());
    let bytes = match &sibling.value {
        JournalValue::Binary(bytes) => bytes.clone(),
        JournalValue::Term(term) => format!("{term:?}").into_bytes(),
    };
    std::fs::write(path, bytes).map_err(Error::from)
}
