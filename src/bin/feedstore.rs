use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use feedstore::core::QuantaClock;
use feedstore::exchange::{self, ArchiveLimits, CancelFlag, DownloadOptions, UploadOptions};
use feedstore::lifecycle::{self, OrphanPolicy};
use feedstore::volume::DirectoryVolumes;
use feedstore::{Channel, Criteria, MetaProperties, MetaService, Status, Store, StoreConfig};

const CATALOG_FILE: &str = "catalog.json";

#[derive(Parser)]
#[command(name = "feedstore", version, about = "Feed stream store tooling")]
struct Cli {
    /// Store root holding the catalog
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Volume directory for container data (repeatable; default {root}/volumes/0)
    #[arg(long = "volume", global = true)]
    volumes: Vec<PathBuf>,

    /// Node name reported for local volumes
    #[arg(long, global = true, default_value = "local")]
    node: String,

    /// JSON store config (block size, compression level, placement)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store files as the entries of one new stream
    Write(WriteArgs),
    /// List streams in the catalog
    List(FilterArgs),
    /// Print one channel of one entry
    Cat(CatArgs),
    /// Logically delete streams
    Delete {
        ids: Vec<u64>,
        /// Also delete streams that are still LOCKED
        #[arg(long)]
        force: bool,
    },
    /// Export matching streams to zip archives
    Download(DownloadArgs),
    /// Import a zip archive as new streams
    Upload(UploadArgs),
    /// List or retire streams left LOCKED by aborted writers
    Orphans {
        /// Minimum age since creation
        #[arg(long, default_value_t = 3_600_000)]
        min_age_ms: u64,
        /// Move the orphans to DELETED
        #[arg(long)]
        abandon: bool,
    },
}

#[derive(Args)]
struct WriteArgs {
    #[arg(long)]
    feed: String,
    #[arg(long = "type", default_value = "Raw Events")]
    type_name: String,
    /// One entry per file
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Context channel content, applied to every entry
    #[arg(long)]
    context: Option<PathBuf>,
    /// Meta channel content, applied to every entry
    #[arg(long)]
    meta: Option<PathBuf>,
    /// Mark a segment boundary after every line of the data channel
    #[arg(long)]
    segment_lines: bool,
    #[arg(long)]
    effective_ms: Option<u64>,
    #[arg(long)]
    parent: Option<u64>,
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    feed: Option<String>,
    #[arg(long = "type")]
    type_name: Option<String>,
    #[arg(long)]
    status: Option<Status>,
}

impl FilterArgs {
    fn criteria(&self) -> Criteria {
        let mut criteria = Criteria::All;
        if let Some(feed) = &self.feed {
            criteria = criteria.and(Criteria::feed(feed.as_str()));
        }
        if let Some(type_name) = &self.type_name {
            criteria = criteria.and(Criteria::type_name(type_name.as_str()));
        }
        if let Some(status) = self.status {
            criteria = criteria.and(Criteria::status(status));
        }
        criteria
    }
}

#[derive(Args)]
struct CatArgs {
    id: u64,
    /// 1-based entry number
    #[arg(long, default_value_t = 1)]
    entry: usize,
    #[arg(long, default_value = "data")]
    channel: Channel,
    /// Only these segments (repeatable)
    #[arg(long = "segment")]
    segments: Vec<u64>,
    /// Skip these segments (repeatable)
    #[arg(long = "exclude")]
    excludes: Vec<u64>,
    /// Read DELETED streams too
    #[arg(long)]
    any_status: bool,
}

#[derive(Args)]
struct DownloadArgs {
    #[command(flatten)]
    filter: FilterArgs,
    /// Restrict to these stream ids (repeatable)
    #[arg(long = "id")]
    ids: Vec<u64>,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value = "download")]
    name: String,
    #[arg(long)]
    max_entries: Option<usize>,
    #[arg(long)]
    max_bytes: Option<u64>,
}

#[derive(Args)]
struct UploadArgs {
    archive: PathBuf,
    #[arg(long)]
    user: String,
    #[arg(long)]
    feed: Option<String>,
    #[arg(long = "type")]
    type_name: Option<String>,
    /// Extra Key:Value lines for every uploaded meta channel
    #[arg(long)]
    extra_meta: Option<String>,
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let store = open_store(&cli)?;
    let mut out = io::BufWriter::new(io::stdout());

    match cli.command {
        Commands::Write(args) => {
            let meta = write_stream(&store, &args)?;
            writeln!(out, "{}", meta.id)?;
        }
        Commands::List(filter) => {
            for meta in store.meta_service().find(&filter.criteria()) {
                writeln!(
                    out,
                    "{:>8}  {:<8}  {:<24}  {:<16}  created={} effective={}",
                    meta.id,
                    meta.status,
                    meta.feed_name,
                    meta.type_name,
                    meta.created_at_ms,
                    meta.effective_or_created_ms()
                )?;
            }
        }
        Commands::Cat(args) => {
            let source = store.open_source(args.id, args.any_status)?;
            let index = args
                .entry
                .checked_sub(1)
                .context("entry numbers start at 1")?;
            let entry = source.entry(index)?;
            let Some(mut reader) = entry.channel(args.channel)? else {
                bail!("stream {} entry {} has no {} channel", args.id, args.entry, args.channel);
            };
            for segment in args.segments {
                reader.include(segment);
            }
            for segment in args.excludes {
                reader.exclude(segment);
            }
            reader.read_into(&mut out)?;
        }
        Commands::Delete { ids, force } => {
            let criteria = ids
                .iter()
                .map(|id| Criteria::id(*id))
                .reduce(Criteria::or)
                .context("no stream ids given")?;
            let deleted = store.meta_service().soft_delete_matching(&criteria, !force)?;
            writeln!(out, "deleted {deleted} of {}", ids.len())?;
        }
        Commands::Download(args) => {
            let mut criteria = args.filter.criteria();
            if let Some(ids) = args
                .ids
                .iter()
                .map(|id| Criteria::id(*id))
                .reduce(Criteria::or)
            {
                criteria = criteria.and(ids);
            }
            let options = DownloadOptions::new(&args.out, &args.name).with_limits(ArchiveLimits {
                max_entries: args.max_entries,
                max_bytes: args.max_bytes,
            });
            let summary = exchange::download(&store, &criteria, &options, &CancelFlag::new())?;
            for archive in &summary.archives {
                writeln!(out, "{}", archive.display())?;
            }
            writeln!(
                out,
                "{} streams, {} entries, {} skipped, {} empty",
                summary.meta_count,
                summary.entry_count,
                summary.skipped.len(),
                summary.empty.len()
            )?;
        }
        Commands::Upload(args) => {
            let mut options = UploadOptions::new(args.user);
            options.feed_name = args.feed;
            options.type_name = args.type_name;
            options.extra_meta = args.extra_meta;
            let summary = exchange::upload(&store, &args.archive, &options)?;
            for meta in &summary.created {
                writeln!(out, "created {} ({})", meta.id, meta.feed_name)?;
            }
            for failure in &summary.failures {
                writeln!(out, "failed {}: {}", failure.base_name, failure.error)?;
            }
            if !summary.is_complete() {
                out.flush()?;
                bail!("{} archive groups failed", summary.failures.len());
            }
        }
        Commands::Orphans {
            min_age_ms,
            abandon,
        } => {
            let policy = OrphanPolicy::older_than_ms(min_age_ms);
            if abandon {
                let stats = lifecycle::reconcile(store.meta_service(), &policy)?;
                writeln!(out, "{}", stats.summary())?;
            } else {
                for meta in lifecycle::find_orphans(store.meta_service(), &policy) {
                    writeln!(
                        out,
                        "{:>8}  {:<24}  created={}",
                        meta.id, meta.feed_name, meta.created_at_ms
                    )?;
                }
            }
        }
    }
    out.flush()?;
    Ok(())
}

fn open_store(cli: &Cli) -> Result<Store> {
    let config = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StoreConfig::default(),
    };
    std::fs::create_dir_all(&cli.root)
        .with_context(|| format!("creating store root {}", cli.root.display()))?;
    let catalog = cli.root.join(CATALOG_FILE);
    let service = MetaService::open(&catalog, Arc::new(QuantaClock::new()))
        .with_context(|| format!("opening catalog {}", catalog.display()))?;
    let volumes = if cli.volumes.is_empty() {
        vec![cli.root.join("volumes").join("0")]
    } else {
        cli.volumes.clone()
    };
    let volumes = DirectoryVolumes::new(cli.node.as_str(), volumes);
    Ok(Store::new(config, Arc::new(service), Arc::new(volumes)))
}

fn write_stream(store: &Store, args: &WriteArgs) -> Result<feedstore::Meta> {
    let mut properties = MetaProperties::new(args.feed.as_str(), args.type_name.as_str());
    if let Some(effective) = args.effective_ms {
        properties = properties.effective_at(effective);
    }
    if let Some(parent) = args.parent {
        properties = properties.parent(parent);
    }
    let context = read_optional(args.context.as_deref())?;
    let meta = read_optional(args.meta.as_deref())?;

    let mut target = store.open_target(properties)?;
    for input in &args.inputs {
        let mut entry = target.next_entry()?;
        let file = std::fs::File::open(input)
            .with_context(|| format!("opening {}", input.display()))?;
        let data = entry.primary()?;
        if args.segment_lines {
            let mut reader = BufReader::new(file);
            let mut line = Vec::new();
            while reader.read_until(b'\n', &mut line)? > 0 {
                data.write_all(&line)?;
                data.mark_segment_boundary()?;
                line.clear();
            }
        } else {
            io::copy(&mut BufReader::new(file), data)?;
        }
        if let Some(context) = &context {
            entry.channel(Channel::Context)?.write_all(context)?;
        }
        if let Some(meta) = &meta {
            entry.channel(Channel::Meta)?.write_all(meta)?;
        }
        entry.close()?;
    }
    Ok(target.close()?)
}

fn read_optional(path: Option<&Path>) -> Result<Option<Vec<u8>>> {
    path.map(|path| std::fs::read(path).with_context(|| format!("reading {}", path.display())))
        .transpose()
}
