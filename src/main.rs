use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::ProgressBar;
use stackstream::checkpoint::{self, CheckpointManager};
use stackstream::config::{StreamConfig, CHECKPOINT_INTERVAL, PROGRESS_INTERVAL};
use stackstream::crossref::CrossReference;
use stackstream::models::ContentType;
use stackstream::resume::ResumeFrom;
use stackstream::stream::{community_from_path, RecordStream};
use stackstream::tracker::ParentTracker;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "stackstream")]
#[command(about = "Stream StackExchange dumps as normalized text records")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write one JSON record per line for every usable row of a dump file
    Stream(StreamArgs),
}

#[derive(Args)]
struct StreamArgs {
    /// Path to a decompressed dump file (Posts.xml, Comments.xml or Tags.xml)
    #[arg(short, long)]
    input: String,

    /// post_title, post_body, post_both, all_text, comments, comments_both or tags
    #[arg(short, long, default_value = "post_title")]
    content_type: String,

    /// Community name for record metadata (defaults to the input's parent directory)
    #[arg(long)]
    community: Option<String>,

    /// Only emit posts carrying one of these tags (comma separated)
    #[arg(long, value_delimiter = ',')]
    only_tags: Vec<String>,

    /// Replace newlines with spaces instead of collapsing them
    #[arg(long)]
    no_newlines: bool,

    /// Skip rows up to and including this Id
    #[arg(long, conflicts_with = "resume_date")]
    resume_id: Option<u64>,

    /// Only emit rows created, edited or active at or after this timestamp
    #[arg(long)]
    resume_date: Option<String>,

    /// Comments.xml used to append comments for all_text
    #[arg(long)]
    comments: Option<String>,

    /// Posts.xml used to resolve parent titles for comments_both
    #[arg(long)]
    posts: Option<String>,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<String>,

    /// Stop after this many records
    #[arg(long)]
    limit: Option<u64>,

    /// Checkpoint file recording the last processed Id and the questions still open
    #[arg(long)]
    checkpoint: Option<String>,

    /// Continue after the Id stored in --checkpoint if it matches this input
    #[arg(long, requires = "checkpoint")]
    resume: bool,

    /// Checkpoint interval in emitted records
    #[arg(long, default_value_t = CHECKPOINT_INTERVAL)]
    checkpoint_interval: u64,
}

/// Stream options, plus the open questions to restore when resuming from a checkpoint.
fn build_config(
    args: &StreamArgs,
    content_type: ContentType,
) -> Result<(StreamConfig, Option<ParentTracker>)> {
    let mut tracker = None;
    let mut config = StreamConfig::new(content_type)
        .with_keep_newlines(!args.no_newlines)
        .with_only_tags(args.only_tags.iter().map(|t| t.trim().to_string()));

    if let Some(id) = args.resume_id {
        config = config.with_resume_from(ResumeFrom::Id(id));
    } else if let Some(date) = &args.resume_date {
        config = config.with_resume_from(ResumeFrom::parse_date(date)?);
    } else if args.resume {
        if let Some(path) = &args.checkpoint {
            match checkpoint::load_if_valid(Path::new(path), &args.input, content_type)? {
                Some(cp) => {
                    info!(last_id = cp.last_row_id, "Resuming from checkpoint");
                    config = config.with_resume_from(cp.resume_from());
                    tracker = Some(cp.tracker);
                }
                None => info!("No valid checkpoint found, starting fresh"),
            }
        }
    }

    Ok((config, tracker))
}

fn load_cross_reference(
    args: &StreamArgs,
    content_type: ContentType,
) -> Result<Option<CrossReference>> {
    match content_type {
        ContentType::AllText => match &args.comments {
            Some(path) => Ok(Some(CrossReference::load_comments(path)?)),
            None => {
                warn!("all_text without --comments, records will hold title and body only");
                Ok(None)
            }
        },
        ContentType::CommentsBoth => match &args.posts {
            Some(path) => Ok(Some(CrossReference::load_posts(path)?)),
            None => {
                warn!("comments_both without --posts, records will hold comment text only");
                Ok(None)
            }
        },
        _ => {
            if args.comments.is_some() || args.posts.is_some() {
                warn!(
                    content_type = %content_type,
                    "Cross-reference file ignored for this content type"
                );
            }
            Ok(None)
        }
    }
}

fn run_stream(args: StreamArgs) -> Result<()> {
    let content_type: ContentType = args.content_type.parse()?;
    let (config, restored) = build_config(&args, content_type)?;

    let community = match &args.community {
        Some(c) => c.clone(),
        None => community_from_path(Path::new(&args.input))
            .context("Cannot infer the community from the input path, pass --community")?,
    };

    let xref = load_cross_reference(&args, content_type)?;

    let mut stream = RecordStream::open(&args.input, &community, config)?;
    if let Some(xref) = xref {
        stream = stream.with_cross_reference(xref);
    }
    if let Some(tracker) = restored {
        stream = stream.with_tracker(tracker);
    }

    let mut checkpoint_mgr = match &args.checkpoint {
        Some(path) => Some(CheckpointManager::new(
            path,
            &args.input,
            content_type,
            args.checkpoint_interval,
        )?),
        None => None,
    };

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create output file: {}", path))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::with_capacity(128 * 1024, sink);

    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    let mut emitted = 0u64;

    while let Some(record) = stream.next() {
        serde_json::to_writer(&mut writer, &record).context("Failed to write record")?;
        writer.write_all(b"\n")?;

        emitted += 1;
        if emitted % PROGRESS_INTERVAL == 0 {
            pb.set_message(format!("{} records", emitted));
            pb.tick();
        }
        if let Some(mgr) = checkpoint_mgr.as_mut() {
            mgr.maybe_save(record.meta.id, stream.stats(), stream.tracker())?;
        }
        if args.limit.is_some_and(|limit| emitted >= limit) {
            info!(limit = emitted, "Record limit reached");
            break;
        }
    }

    writer.flush().context("Failed to flush output")?;
    pb.finish_and_clear();

    if let Some(mgr) = checkpoint_mgr.as_mut() {
        if stream.is_finished() && stream.error().is_none() {
            mgr.clear()?;
        } else if let Some(id) = stream.last_row_id() {
            mgr.save(id, stream.stats(), stream.tracker())?;
        }
    }

    let stats = stream.stats();
    eprintln!();
    eprintln!("=== Summary ===");
    eprintln!("Elapsed:            {:.2}s", start.elapsed().as_secs_f64());
    eprintln!("Rows seen:          {}", stats.seen());
    eprintln!("Records emitted:    {}", stats.parsed());
    eprintln!("Skipped (resume):   {}", stats.skipped_resume());
    eprintln!("Skipped (type):     {}", stats.skipped_post_type());
    eprintln!("Dropped (no text):  {}", stats.dropped_no_text());
    eprintln!("Dropped (tags):     {}", stats.dropped_tags());
    eprintln!("Unresolved parents: {}", stats.unresolved_parents());
    eprintln!("Open questions:     {}", stream.tracker().len());

    if let Some(e) = stream.error() {
        bail!("Stream ended early: {:#}", e);
    }

    Ok(())
}

fn verbosity_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // -v sets the default level, RUST_LOG directives apply on top
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity_level(cli.verbose).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Stream(args) => run_stream(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
