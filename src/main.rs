use anyhow::Context;
use clap::{Args, ColorChoice, CommandFactory, FromArgMatches, Parser, Subcommand};
use colored::Colorize;
use cropsense::config::Config;
use cropsense::history::{AdmissionPolicy, HistoryError};
use cropsense::inference::{InferenceReply, parse_replies};
use cropsense::schema::{Category, SeverityReport};
use cropsense::session::{Session, SessionError};
use cropsense::severity::SeverityBucket;
use std::io::{IsTerminal, stderr, stdout};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

#[derive(Parser)]
#[command(
    name = "cropsense",
    about = "Crop infestation severity reports from detection results",
    arg_required_else_help = true
)]
struct Cli {
    /// Disable color
    #[arg(long = "no-color", global = true)]
    no_color: bool,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded inference replies and print the severity report
    Report(ReportArgs),
    /// List the known crop and infestation labels
    Labels(LabelsArgs),
    /// Print the JSON schema of the severity report
    Schema,
}

#[derive(Args, Clone)]
struct ReportArgs {
    /// Files holding one inference reply or an array of replies
    #[arg(value_name = "REPLY_FILE", required = true)]
    replies: Vec<PathBuf>,

    /// Output JSON (stable schema)
    #[arg(long, conflicts_with = "raw")]
    json: bool,

    /// Print the CSV table without colors/headers
    #[arg(long)]
    raw: bool,

    /// Also write the CSV table to this file
    #[arg(long, value_name = "FILE", conflicts_with = "csv_default")]
    csv: Option<PathBuf>,

    /// Also write the CSV table to the configured default file name
    #[arg(long)]
    csv_default: bool,

    /// Use the compact per-infestation presence table for CSV output
    #[arg(long)]
    presence: bool,

    /// Number of images kept in the history
    #[arg(long, value_name = "N")]
    capacity: Option<usize>,

    /// Admission policy: fixed-lock or sliding-window
    #[arg(long, value_name = "POLICY")]
    policy: Option<AdmissionPolicy>,

    /// Images with an infestation required before a sliding-window report
    #[arg(long, value_name = "K")]
    min_qualifying: Option<usize>,
}

#[derive(Args, Clone)]
struct LabelsArgs {
    /// Output JSON
    #[arg(long)]
    json: bool,
}

fn detect_color_choice() -> ColorChoice {
    // Scan args before clap so help/errors honor `--no-color`.
    // Stop at `--` which terminates flags.
    let mut args = std::env::args_os();
    args.next();
    let mut flag = false;
    for arg in args {
        if arg == "--" {
            break;
        }
        if arg == "--no-color" {
            flag = true;
            break;
        }
    }
    if flag || std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

fn stdout_wants_color(color: ColorChoice) -> bool {
    !matches!(color, ColorChoice::Never)
        && stdout().is_terminal()
        && supports_color::on(supports_color::Stream::Stdout).is_some()
}

fn init_tracing(color: ColorChoice) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .with_env_var("CROPSENSE_LOG")
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(stderr)
        .with_target(false)
        .with_ansi(!matches!(color, ColorChoice::Never) && stderr().is_terminal())
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<Config, i32> {
    let loaded = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    loaded.map_err(|e| {
        eprintln!("Error: {}", e);
        2
    })
}

fn read_replies(path: &Path) -> anyhow::Result<Vec<InferenceReply>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_replies(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn heading(text: &str, color: bool) -> String {
    if color {
        text.bold().cyan().to_string()
    } else {
        text.to_string()
    }
}

fn colorize_bucket(bucket: SeverityBucket, color: bool) -> String {
    if !color {
        return bucket.to_string();
    }
    match bucket {
        SeverityBucket::HighlySevere => bucket.as_str().red().bold().to_string(),
        SeverityBucket::Severe => bucket.as_str().red().to_string(),
        SeverityBucket::Moderate => bucket.as_str().yellow().to_string(),
        SeverityBucket::Low => bucket.as_str().green().to_string(),
    }
}

fn or_none(value: Option<&str>) -> &str {
    value.unwrap_or("none")
}

fn percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}%", v),
        None => "n/a".to_string(),
    }
}

fn render_human(report: &SeverityReport, color: bool) -> String {
    let mut out = String::new();

    out.push_str(&heading("Summary:", color));
    out.push_str(&format!(
        "\n  images = {}\n  final crop = {}\n  major infestation = {}\n  estimated damage = {}",
        report.total_images,
        or_none(report.final_crop.as_deref()),
        or_none(report.major_infestation.as_deref()),
        percent(report.overall_damage_pct),
    ));

    out.push('\n');
    out.push_str(&heading("Infestations:", color));
    if report.infestation_breakdown.is_empty() {
        out.push_str(" none");
    }
    for entry in &report.infestation_breakdown {
        let marker = if entry.is_major { " (major)" } else { "" };
        out.push_str(&format!(
            "\n  {} [{}] = {} in {:.1}% of images, avg confidence {}{}",
            entry.label,
            entry.kind,
            colorize_bucket(entry.severity, color),
            entry.prevalence_pct,
            percent(entry.avg_confidence_pct),
            marker,
        ));
    }

    out.push('\n');
    out.push_str(&heading("Crops:", color));
    if report.crops.is_empty() {
        out.push_str(" none");
    }
    for crop in &report.crops {
        let avg = crop
            .avg_confidence
            .map(|v| format!("{:.3}", v))
            .unwrap_or_else(|| "n/a".to_string());
        out.push_str(&format!(
            "\n  {} = {} detections, avg confidence {}",
            crop.label, crop.count, avg
        ));
    }

    out
}

fn run_report(
    args: ReportArgs,
    config_path: Option<&Path>,
    color: ColorChoice,
) -> Result<(), i32> {
    let mut config = load_config(config_path)?;
    if let Some(capacity) = args.capacity {
        config.history.capacity = capacity;
    }
    if let Some(policy) = args.policy {
        config.history.admission_policy = policy;
    }
    if let Some(k) = args.min_qualifying {
        config.history.min_qualifying_images = k;
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return Err(2);
    }

    let mut session = Session::from_config(&config);
    let mut ignored = 0usize;

    for path in &args.replies {
        let replies = match read_replies(path) {
            Ok(replies) => replies,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                return Err(2);
            }
        };
        for (i, reply) in replies.into_iter().enumerate() {
            let response = match reply.into_result() {
                Ok(response) => response,
                Err(e) => {
                    eprintln!("warning: {} reply {}: {}", path.display(), i + 1, e);
                    continue;
                }
            };
            match session.ingest(response) {
                Ok(submitted) => session = submitted.session,
                Err(SessionError::History(HistoryError::HistoryFull { .. })) => ignored += 1,
                Err(e) => eprintln!("warning: {} reply {}: {}", path.display(), i + 1, e),
            }
        }
    }

    if ignored > 0 {
        eprintln!("warning: {} replies ignored after the history filled up", ignored);
    }

    let Some(report) = session.report() else {
        eprintln!(
            "No severity report yet: {}",
            session.history().readiness_hint()
        );
        return Err(1);
    };

    let csv = if args.presence {
        report.to_presence_csv()
    } else {
        report.to_csv()
    };

    let target = match (&args.csv, args.csv_default) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => Some(PathBuf::from(&config.output.csv_file_name)),
        (None, false) => None,
    };
    if let Some(path) = target {
        if let Err(e) = std::fs::write(&path, &csv) {
            eprintln!("Error: failed to write {}: {}", path.display(), e);
            return Err(3);
        }
        tracing::info!(path = %path.display(), "wrote csv report");
    }

    if args.json {
        match serde_json::to_string_pretty(report) {
            Ok(s) => println!("{}", s),
            Err(_) => return Err(3),
        }
    } else if args.raw {
        print!("{}", csv);
    } else {
        println!("{}", render_human(report, stdout_wants_color(color)));
    }
    Ok(())
}

fn run_labels(args: LabelsArgs, config_path: Option<&Path>) -> Result<(), i32> {
    let config = load_config(config_path)?;
    let entries = config.catalog().entries();

    if args.json {
        match serde_json::to_string_pretty(&entries) {
            Ok(s) => println!("{}", s),
            Err(_) => return Err(3),
        }
        return Ok(());
    }

    println!("crops:");
    for entry in entries.iter().filter(|e| e.category == Category::Crop) {
        println!("  {}", entry.label);
    }
    println!("infestations:");
    for entry in entries
        .iter()
        .filter(|e| e.category == Category::Infestation)
    {
        println!("  {} ({})", entry.label, entry.kind);
    }
    Ok(())
}

fn run_schema() -> Result<(), i32> {
    let schema = schemars::schema_for!(SeverityReport);
    match serde_json::to_string_pretty(&schema) {
        Ok(s) => println!("{}", s),
        Err(_) => return Err(3),
    }
    Ok(())
}

fn main() {
    let color = detect_color_choice();
    init_tracing(color);
    let matches = Cli::command().color(color).get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Some(Commands::Report(args)) => run_report(args, config_path, color),
        Some(Commands::Labels(args)) => run_labels(args, config_path),
        Some(Commands::Schema) => run_schema(),
        None => Ok(()),
    };
    if let Err(code) = result {
        std::process::exit(code);
    }
}
