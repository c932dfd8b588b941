//! pgsleuth - PostgreSQL statement insight report.
//!
//! Connects to a PostgreSQL server, ranks captured statements, collects
//! execution plans for the worst offenders under a strict budget and
//! prints warnings, recommendations and informational findings.
//!
//! Usage:
//!   pgsleuth                  # inspect the database from PG* env vars
//!   pgsleuth --db app1 --db app2   # inspect extra databases as well
//!   pgsleuth --json           # machine-readable report
//!   pgsleuth --explain-limit 20

use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use pgsleuth::analysis::Severity;
use pgsleuth::collector::Inspector;
use pgsleuth::report::{DatabaseReport, Report, inspect_database};

/// PostgreSQL statement insight report.
#[derive(Parser)]
#[command(name = "pgsleuth", about = "PostgreSQL statement insight report", version)]
struct Args {
    /// Additional databases to inspect, visited sequentially after the
    /// primary one. May be repeated.
    #[arg(long = "db", value_name = "NAME")]
    databases: Vec<String>,

    /// Maximum number of statements per ranked list that receive a
    /// plan attempt. Zero or negative falls back to 10.
    #[arg(long, default_value = "10")]
    explain_limit: i64,

    /// Print the full report as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("pgsleuth={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    info!("pgsleuth {} starting", env!("CARGO_PKG_VERSION"));

    let primary = match Inspector::from_env() {
        Ok(inspector) => inspector,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let mut report = Report::new();

    let primary_name = std::env::var("PGDATABASE")
        .or_else(|_| std::env::var("PGUSER"))
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "postgres".to_string());

    let mut inspector = primary;
    report.databases.push(inspect_database(
        primary_name.clone(),
        &mut inspector,
        args.explain_limit,
    ));

    // Extra databases are visited strictly sequentially, one
    // connection each; a failure is reported and the run continues.
    for datname in &args.databases {
        if *datname == primary_name {
            continue;
        }
        let mut extra = inspector.for_database(datname);
        report
            .databases
            .push(inspect_database(datname.clone(), &mut extra, args.explain_limit));
    }

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("failed to serialize report: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        print_text_report(&report);
    }
}

fn print_text_report(report: &Report) {
    println!("pgsleuth report - generated {}", report.generated_at);

    for db in &report.databases {
        println!();
        println!("== database: {} ==", db.datname);

        if let Some(ref error) = db.error {
            println!("  unreachable: {}", error);
            continue;
        }
        if !db.statistics_available {
            println!("  statement statistics unavailable (pg_stat_statements missing?)");
            continue;
        }

        if db.findings.is_empty() {
            println!("  no findings");
        }
        for finding in &db.findings {
            let tag = match finding.severity {
                Severity::Warning => "WARN",
                Severity::Info => "INFO",
            };
            println!("  [{}] {}", tag, finding.title);
            if let Some(ref detail) = finding.detail {
                println!("         {}", detail);
            }
        }

        print_attention_statements(db);
    }
}

fn print_attention_statements(db: &DatabaseReport) {
    let flagged = db
        .statements
        .by_total_time
        .iter()
        .chain(db.statements.by_calls.iter())
        .filter(|s| s.needs_attention);

    // The same statement may rank in both explained lists.
    let mut printed: Vec<&str> = Vec::new();

    for stmt in flagged {
        let Some(ref advice) = stmt.advice else {
            continue;
        };
        if printed.contains(&stmt.query.as_str()) {
            continue;
        }
        printed.push(&stmt.query);
        println!();
        println!(
            "  -- statement (calls={}, mean={:.1}ms, calls/h={:.1})",
            stmt.calls, stmt.mean_time, stmt.calls_per_hour
        );
        println!("     {}", stmt.query.chars().take(200).collect::<String>());
        for highlight in &advice.highlights {
            println!("     * {}", highlight);
        }
        for suggestion in &advice.suggestions {
            println!("     > {}", suggestion);
        }
        if !advice.plan.is_empty() {
            for line in advice.plan.lines() {
                println!("     | {}", line);
            }
        }
    }
}
