use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use rephile::database::{paths, Node, Store};
use rephile::ingest::{hash_size, scanner, CacheCoordinator};
use rephile::media::ExifTool;
use rephile::utils::config::{self, Settings};
use rephile::utils::logging;

#[derive(Parser, Debug)]
#[command(author, version, about = "Content-addressable file cache", long_about = None)]
struct Cli {
    /// Cache database file
    #[arg(short, long, global = true)]
    cache: Option<PathBuf>,

    /// Worker threads for hashing and probing
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the cache schema
    Init {
        /// Record the cache location in ./.env
        #[arg(long)]
        remember: bool,
    },
    /// Print the SHA-256 and size of files
    Hashsize {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print raw exiftool metadata as JSON
    Exif {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Ingest files into the cache
    Digest {
        /// Re-hash and re-probe paths that are already cached
        #[arg(short, long)]
        force: bool,
        /// Descend into directories
        #[arg(short, long)]
        recursive: bool,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print what the cache knows about files as JSON
    Show {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    #[command(subcommand)]
    Tag(TagCommand),
}

#[derive(Subcommand, Debug)]
enum TagCommand {
    /// Create tags
    Add {
        names: Vec<String>,
        /// Create or describe a tag, as name=description
        #[arg(short, long = "describe", value_parser = parse_description)]
        describe: Vec<(String, String)>,
    },
    /// Tag other tags, or files with --files
    Link {
        #[arg(short = 'u', long = "head", required = true)]
        heads: Vec<String>,
        #[arg(required = true)]
        tails: Vec<String>,
        #[arg(long)]
        files: bool,
    },
    /// Print a tag with its neighbours as JSON
    Show { name: String },
}

fn parse_description(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(name, description)| (name.trim().to_string(), description.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected name=description, got {:?}", s))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let settings = || Settings::resolve(cli.cache.clone(), cli.jobs);
    match &cli.command {
        Command::Init { remember } => init(&settings()?, *remember),
        Command::Hashsize { files } => hashsize(files),
        Command::Exif { files } => exif(files),
        Command::Digest { force, recursive, files } => digest(&settings()?, files, *force, *recursive),
        Command::Show { files } => show(&settings()?, files),
        Command::Tag(command) => tag(&settings()?, command),
    }
}

fn open(settings: &Settings) -> Result<Store> {
    Store::open(&settings.cache).with_context(|| format!("Failed to open cache {:?}", settings.cache))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init(settings: &Settings, remember: bool) -> Result<()> {
    Store::init(&settings.cache).with_context(|| format!("Failed to initialize {:?}", settings.cache))?;
    if remember {
        let cache = paths::absolute(&settings.cache)?;
        config::save_to_env(Path::new(config::DOTENV), config::CACHE_VAR, &cache.to_string_lossy())?;
    }
    println!("{}", settings.cache.display());
    Ok(())
}

fn hashsize(files: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for path in files {
        match hash_size(path) {
            Ok(content) => println!("{}\t{}\t{}", content.hash, content.size, path.display()),
            Err(e) => {
                warn!("Failed to hash {:?}: {}", path, e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} files could not be hashed", failed, files.len());
    }
    Ok(())
}

fn exif(files: &[PathBuf]) -> Result<()> {
    let records = ExifTool::default().records(files)?;
    print_json(&records)
}

fn digest(settings: &Settings, files: &[PathBuf], force: bool, recursive: bool) -> Result<()> {
    let mut store = open(settings)?;
    let files = scanner::expand(files, recursive);

    let bar = ProgressBar::new(files.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-"),
    );
    bar.set_message("hashing");

    let coordinator = CacheCoordinator::new(settings.jobs)?.with_progress(bar.clone());
    let results = coordinator.build(&mut store, &files, force);
    bar.finish_and_clear();

    let mut failed = 0;
    for (path, result) in files.iter().zip(results?) {
        match result {
            Ok(digest) => println!("{}\t{}", digest.id, path.display()),
            Err(e) => {
                warn!("{}", e);
                failed += 1;
            }
        }
    }
    info!("Cache holds {} digests", store.digests().count()?);
    if failed > 0 {
        bail!("{} of {} paths could not be read", failed, files.len());
    }
    Ok(())
}

fn show(settings: &Settings, files: &[PathBuf]) -> Result<()> {
    let store = open(settings)?;
    let mut reports = Vec::new();
    for (path, digest) in files.iter().zip(store.digests_by_path(files)?) {
        match digest {
            Some(digest) => reports.push(store.describe(&digest)?),
            None => warn!("{:?} is not in the cache", path),
        }
    }
    print_json(&reports)
}

fn tag(settings: &Settings, command: &TagCommand) -> Result<()> {
    let store = open(settings)?;
    let tags = store.tags();
    match command {
        TagCommand::Add { names, describe } => {
            let described: BTreeMap<String, String> = describe.iter().cloned().collect();
            for tag in tags.ensure(names, &described)? {
                println!("{}", tag.name);
            }
        }
        TagCommand::Link { heads, tails, files } => {
            let heads = tags.ensure(heads, &BTreeMap::new())?;
            let nodes: Vec<Node> = if *files {
                let digests = store.digests_by_path(tails)?;
                tails
                    .iter()
                    .zip(digests)
                    .map(|(path, digest)| {
                        digest
                            .map(|d| Node::from(&d))
                            .ok_or_else(|| anyhow!("{:?} is not in the cache; run `rephile digest` first", path))
                    })
                    .collect::<Result<_>>()?
            } else {
                tags.ensure(tails, &BTreeMap::new())?.iter().map(Node::from).collect()
            };
            let created = tags.link(&nodes, &heads)?;
            println!("{} new links", created);
        }
        TagCommand::Show { name } => {
            let tag = tags.by_name(name)?.ok_or_else(|| anyhow!("No tag named {:?}", name))?;
            let names = |list: Vec<rephile::database::Tag>| list.into_iter().map(|t| t.name).collect::<Vec<_>>();
            print_json(&serde_json::json!({
                "name": tag.name,
                "description": tag.description,
                "parents": names(tags.parents(&tag)?),
                "children": names(tags.children(&tag)?),
                "ancestors": names(tags.ancestors(&tag)?),
                "content": tags.tagged(&tag)?.into_iter().map(|d| d.id).collect::<Vec<_>>(),
            }))?;
        }
    }
    Ok(())
}
