//! CLI entry point for `takeout-xref`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, CommandFactory, Parser, Subcommand};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use takeout_xref::config::{self, Config};
use takeout_xref::host::console::ConsoleProgress;
use takeout_xref::host::json_case::{JsonCase, TagLedger};
use takeout_xref::index::{MboxXrefBuilder, XmlDocumentIndex};
use takeout_xref::run::{format_elapsed, RunCoordinator, RunPaths, RunReport};

#[derive(Parser)]
#[command(
    name = "takeout-xref",
    version,
    about = "Attach Google Takeout mail metadata and labels to case email items"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Correlate a case's email items with Takeout XML documents
    Run(RunArgs),
    /// Build the MBOX xref CSV only
    Xref {
        /// MBOX container files
        #[arg(required = true)]
        mbox_files: Vec<PathBuf>,
        /// Output CSV path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Parse Takeout XML files and report what they contain
    Inspect {
        #[arg(required = true)]
        xml_files: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[derive(Args)]
struct RunArgs {
    /// Case manifest (JSON) holding the email items
    #[arg(long, value_name = "FILE")]
    case: PathBuf,

    /// Where to write the annotated case (defaults to overwriting --case)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Takeout XML file (repeatable)
    #[arg(long = "xml", value_name = "FILE")]
    xml_files: Vec<PathBuf>,

    /// MBOX container for the legacy xref (repeatable)
    #[arg(long = "mbox", value_name = "FILE")]
    mbox_files: Vec<PathBuf>,

    /// Only process emails inside this MBOX item (repeatable)
    #[arg(long = "select", value_name = "GUID")]
    selected_mbox_guids: Vec<String>,

    /// Directory for the log file and CSV reports
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Prefix of the tags created from labels
    #[arg(long, value_name = "PREFIX")]
    tag_prefix: Option<String>,

    /// Do not apply labels as tags
    #[arg(long)]
    no_label_tags: bool,

    /// Data was processed before host format 7.4
    #[arg(long)]
    pre_74: bool,

    /// Host format version
    #[arg(long, value_name = "VERSION")]
    host_version: Option<String>,

    /// Correlation worker threads (0 = one per CPU)
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Save the effective settings to the config file
    #[arg(long)]
    save_config: bool,
}

impl RunArgs {
    /// Layer command-line flags over the loaded configuration.
    fn apply(&self, config: &mut Config) {
        if !self.xml_files.is_empty() {
            config.run.xml_files = self.xml_files.clone();
        }
        if !self.mbox_files.is_empty() {
            config.run.mbox_files = self.mbox_files.clone();
        }
        if !self.selected_mbox_guids.is_empty() {
            config.run.selected_mbox_guids = self.selected_mbox_guids.clone();
        }
        if let Some(ref dir) = self.log_dir {
            config.run.log_directory = dir.clone();
        }
        if let Some(ref prefix) = self.tag_prefix {
            config.run.tag_prefix = prefix.clone();
        }
        if self.no_label_tags {
            config.run.apply_label_tags = false;
        }
        if self.pre_74 {
            config.run.data_is_pre_74 = true;
        }
        if let Some(ref version) = self.host_version {
            config.host.format_version = version.clone();
        }
        if let Some(workers) = self.workers {
            config.performance.workers = workers;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (mut config, config_source) = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };

    match cli.command {
        Commands::Run(args) => {
            args.apply(&mut config);
            config.validate()?;
            let paths = RunPaths::prepare(&config.run.log_directory)?;
            setup_logging(&log_level, Some(&paths.log_file));
            config_source.log();
            cmd_run(&args, &config, paths)
        }
        Commands::Xref { mbox_files, output } => {
            setup_logging(&log_level, None);
            config_source.log();
            cmd_xref(&mbox_files, &output, config.performance.read_buffer_size)
        }
        Commands::Inspect { xml_files, json } => {
            setup_logging(&log_level, None);
            config_source.log();
            cmd_inspect(&xml_files, json)
        }
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and, for runs, the run's log file.
fn setup_logging(level: &str, log_file: Option<&Path>) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let file_target = log_file.and_then(|path| Some((path.parent()?, path.file_name()?)));
    if let Some((dir, name)) = file_target {
        let file_appender = tracing_appender::rolling::never(dir, name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "takeout-xref", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Correlate the case and write the annotated manifest.
fn cmd_run(args: &RunArgs, config: &Config, paths: RunPaths) -> anyhow::Result<()> {
    if args.save_config {
        let saved = config::save_config(config)?;
        println!("  Saved settings to {}", saved.display());
    }

    let options = config.run_options(paths)?;
    let mut case = JsonCase::load(&args.case)?;
    let mut tags = TagLedger::new();
    let progress = ConsoleProgress::new();

    let report = RunCoordinator::new(options, &mut case, &mut tags, &progress).run();
    progress.finish();
    let report = report?;

    let output = args.output.as_deref().unwrap_or(&args.case);
    case.save(output, &tags)?;

    print_run_summary(&report, tags.tag_count(), output);
    Ok(())
}

/// Build the xref from MBOX files and save it as CSV.
fn cmd_xref(mbox_files: &[PathBuf], output: &Path, read_buffer_size: usize) -> anyhow::Result<()> {
    for path in mbox_files {
        if !path.exists() {
            anyhow::bail!("File not found: {}", path.display());
        }
    }

    let mut xref = MboxXrefBuilder::new().with_read_buffer_size(read_buffer_size);
    let start = Instant::now();
    let mut total_bytes = 0u64;

    for path in mbox_files {
        let file_size = std::fs::metadata(path)?.len();
        total_bytes += file_size;
        let pb = ProgressBar::new(file_size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} Scanning {prefix} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                )
                .expect("valid template")
                .progress_chars("#>-"),
        );
        pb.set_prefix(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );

        xref.build_from_path(
            path,
            Some(&|current, total| {
                pb.set_length(total);
                pb.set_position(current);
            }),
        )?;
        pb.finish_and_clear();
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    xref.save(output)?;

    println!();
    println!("  {:<20} {}", "MBOX files", mbox_files.len());
    println!("  {:<20} {}", "Scanned", format_size(total_bytes, BINARY));
    println!("  {:<20} {}", "Xref records", xref.size());
    println!("  {:<20} {:.2?}", "Time", start.elapsed());
    println!("  {:<20} {}", "Output", output.display());
    println!();
    Ok(())
}

/// Parse XML exports and print what they hold.
fn cmd_inspect(xml_files: &[PathBuf], json: bool) -> anyhow::Result<()> {
    let mut index = XmlDocumentIndex::new();
    let mut files = Vec::with_capacity(xml_files.len());

    for path in xml_files {
        match index.parse(path) {
            Ok(report) => files.push(serde_json::json!({
                "file": path.to_string_lossy(),
                "documents": report.documents,
                "merged": report.merged,
                "tag_errors": report.tag_errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
            })),
            Err(e) => files.push(serde_json::json!({
                "file": path.to_string_lossy(),
                "error": e.to_string(),
            })),
        }
    }

    let labels: std::collections::BTreeSet<&String> = index
        .documents()
        .iter()
        .flat_map(|d| d.labels.iter())
        .collect();

    if json {
        let output = serde_json::json!({
            "files": files,
            "document_nodes": index.nodes_parsed(),
            "distinct_documents": index.document_count(),
            "tag_names": index.distinct_tag_names(),
            "labels": labels,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    for file in &files {
        let name = file["file"].as_str().unwrap_or_default();
        match file.get("error") {
            Some(err) => println!("  {name}: {}", err.as_str().unwrap_or_default()),
            None => println!("  {name}: {} document(s)", file["documents"]),
        }
    }
    println!();
    println!("  {:<25} {}", "Document nodes", index.nodes_parsed());
    println!("  {:<25} {}", "Distinct documents", index.document_count());
    println!("  {:<25} {}", "Distinct labels", labels.len());
    println!();
    println!("  Distinct 'TagName' values:");
    for name in index.distinct_tag_names() {
        println!("    {name}");
    }
    println!();
    Ok(())
}

fn print_run_summary(report: &RunReport, tags_applied: usize, output: &Path) {
    println!();
    println!("  {:<20} {}", "Mode", report.mode);
    println!("  {:<20} {}", "XML documents", report.documents);
    if report.mode.needs_xref() {
        println!("  {:<20} {}", "Xref records", report.xref_records);
    }
    println!("  {:<20} {}", "Email items", report.results.len());
    println!("  {:<20} {}", "Matches", report.counters.matches);
    println!("  {:<20} {}", "Warnings", report.counters.warnings);
    println!("  {:<20} {}", "Errors", report.counters.errors);
    println!(
        "  {:<20} {}",
        "Skipped attached", report.counters.skipped_attached
    );
    println!("  {:<20} {}", "Tags applied", tags_applied);
    println!("  {:<20} {}", "Elapsed", format_elapsed(report.elapsed));
    if let Some(ref path) = report.status_csv {
        println!("  {:<20} {}", "Status report", path.display());
    }
    if let Some(ref path) = report.xref_csv {
        println!("  {:<20} {}", "Xref report", path.display());
    }
    println!("  {:<20} {}", "Annotated case", output.display());
    println!();
}
