use clap::{CommandFactory, Parser};
use colored::*;
use std::io::Write;
use std::process;

use sqlaudit_core::{
    read_lines, AuditConfig, AuditOrchestrator, AuditReport, AuditState, ConsoleSink, ScanProfile, SinkRef,
    Target, TargetQueue,
};

#[derive(Parser, Debug)]
#[command(
    name = "sqlaudit",
    version,
    about = "Automated SQL-injection audit: discover databases, dump them, summarize the findings",
    override_usage = "sqlaudit <target>  <options>",
    after_help = "\x1b[1;36mEXAMPLES:\x1b[0m
  Quick audit:                    sqlaudit 'http://target.com/item.php?id=1'
  Without analysis:               sqlaudit 'http://target.com/item.php?id=1' --no-analysis
  Deeper discovery:               sqlaudit 'http://target.com/item.php?id=1' --level 5 --risk 3
  Custom scanner path:            sqlaudit 'http://target.com/item.php?id=1' --scanner /opt/sqlmap/sqlmap.py
  Audit from file:                sqlaudit -l targets.txt -o audit.jsonl
  Dry-run test:                   sqlaudit 'http://target.com/item.php?id=1' --dry-run"
)]
pub struct Args {
    #[arg(required_unless_present_any = ["list", "config"])]
    pub target: Option<String>,

    #[arg(short = 'l', long = "list", help = "File containing target URLs (one per line)")]
    pub list: Option<String>,

    #[arg(long, help = "JSON configuration file; command-line flags override it")]
    pub config: Option<String>,

    #[arg(long, help = "Scanner binary name or path [default: sqlmap]")]
    pub scanner: Option<String>,

    #[arg(long, help = "Per-invocation scanner timeout in seconds [default: 900]")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Discovery test level 1-5 [default: 2]")]
    pub level: Option<u8>,

    #[arg(long, help = "Discovery risk 1-3 [default: 2]")]
    pub risk: Option<u8>,

    #[arg(long = "scanner-arg", allow_hyphen_values = true, help = "Extra argument passed to every scanner run (repeatable)")]
    pub scanner_args: Vec<String>,

    #[arg(long, help = "Model used for the analysis summary [default: mistral]")]
    pub model: Option<String>,

    #[arg(long, help = "Text-completion endpoint [default: http://localhost:11434/api/generate]")]
    pub analysis_url: Option<String>,

    #[arg(long, help = "Maximum characters of dump output sent for analysis [default: 8000]")]
    pub analysis_cap: Option<usize>,

    #[arg(long, default_value_t = false, help = "Skip the analysis summary")]
    pub no_analysis: bool,

    #[arg(short = 'c', long, help = "Databases dumped in parallel [default: 1]")]
    pub concurrency: Option<usize>,

    #[arg(short = 'o', long, help = "Output file for JSON-lines results [default: audit_results.jsonl]")]
    pub output: Option<String>,

    #[arg(short = 'v', long, default_value_t = false, help = "Verbose logging")]
    pub verbose: bool,

    #[arg(long, help = "Print the scanner commands without running them")]
    pub dry_run: bool,
}

impl Args {
    /// Config file values first, then any flag given on the command line.
    fn to_config(&self) -> anyhow::Result<AuditConfig> {
        let mut config = match self.config {
            Some(ref path) => AuditConfig::load(path)?,
            None => AuditConfig::default(),
        };

        if let Some(ref t) = self.target {
            config.target = t.clone();
        }
        if let Some(ref l) = self.list {
            config.list_file = l.clone();
        }
        if let Some(ref s) = self.scanner {
            config.scanner = s.clone();
        }
        if let Some(t) = self.timeout {
            config.timeout = t;
        }
        if let Some(l) = self.level {
            config.level = l;
        }
        if let Some(r) = self.risk {
            config.risk = r;
        }
        if !self.scanner_args.is_empty() {
            config.extra_args = self.scanner_args.clone();
        }
        if let Some(ref m) = self.model {
            config.model = m.clone();
        }
        if let Some(ref u) = self.analysis_url {
            config.analysis_url = u.clone();
        }
        if let Some(c) = self.analysis_cap {
            config.analysis_cap = c;
        }
        if self.no_analysis {
            config.analysis_enabled = false;
        }
        if let Some(c) = self.concurrency {
            config.dump_concurrency = c;
        }
        if let Some(ref o) = self.output {
            config.output = o.clone();
        }
        config.verbose |= self.verbose;
        config.dry_run |= self.dry_run;

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    print_banner();

    let config = match args.to_config() {
        Ok(c) => c,
        Err(e) => {
            eprint!("{}\r\n", format!("[!] {}", e).red());
            process::exit(1);
        }
    };
    log::debug!("effective configuration: {:?}", config);

    let mut targets = TargetQueue::new();

    if !config.list_file.is_empty() {
        match read_lines(&config.list_file) {
            Ok(lines) => {
                print!(
                    "{}\r\n",
                    format!("[+] Loaded {} target(s) from {}", lines.len(), config.list_file)
                        .green().bold()
                );
                std::io::stdout().flush().ok();
                for line in lines {
                    targets.add_target(line);
                }
            }
            Err(e) => {
                eprint!("{}\r\n", format!("[!] Failed to read '{}': {}", config.list_file, e).red());
                process::exit(1);
            }
        }
    }

    if !config.target.is_empty() {
        targets.add_target(config.target.clone());
    }

    if targets.is_empty() {
        eprint!("{}\r\n", "[!] No targets specified. Provide a URL or use -l <file>.".red());
        let mut cmd = Args::command();
        cmd.print_help().ok();
        process::exit(1);
    }

    if config.dry_run {
        let profile = ScanProfile::from_config(&config);
        while let Some(target) = targets.next() {
            print_dry_run(&target, &profile);
        }
        return;
    }

    print_audit_config(&config);

    let sink: SinkRef = ConsoleSink::new_ref();
    let orchestrator = match AuditOrchestrator::from_config(&config, sink.clone()) {
        Ok(o) => o,
        Err(e) => {
            eprint!("{}\r\n", format!("[!] {}", e).red());
            process::exit(1);
        }
    };
    let mut report = match AuditReport::open(&config.output) {
        Ok(r) => r,
        Err(e) => {
            eprint!("{}\r\n", format!("[!] {}", e).red());
            process::exit(1);
        }
    };

    let total = targets.len();
    let mut index = 0;
    while let Some(target) = targets.next() {
        index += 1;
        if total > 1 {
            print!(
                "\r\n{}\r\n",
                format!("━━━ Target {}/{}: {} ━━━", index, total, target)
                    .bright_white().bold()
            );
            std::io::stdout().flush().ok();
        }

        let summary = orchestrator
            .perform_audit_until(&target, async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            })
            .await;

        let cancelled = summary.state == AuditState::Cancelled;
        report.record(summary);
        if cancelled {
            print!("{}\r\n", "[System] Interrupted. Remaining targets skipped.".yellow());
            break;
        }
    }

    print!("\r\n");
    report.report_summary(&sink);
}

/// Prints the sqlaudit ASCII banner.
fn print_banner() {
    let banner = r#"
   ____   ___  _        _             _ _ _
  / ___| / _ \| |      / \  _   _  __| (_) |_
  \___ \| | | | |     / _ \| | | |/ _` | | __|
   ___) | |_| | |___ / ___ \ |_| | (_| | | |_
  |____/ \__\_\_____/_/   \_\__,_|\__,_|_|\__|
    "#;
    print!("{}\r\n", banner.bright_cyan().bold());
    print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
    std::io::stdout().flush().ok();
}

/// Shows what would run for a target without spawning anything.
fn print_dry_run(target: &str, profile: &ScanProfile) {
    println!("[DRY RUN] Would scan target: {}", target);
    match Target::parse(target) {
        Ok(t) => {
            println!("  discovery: {}", profile.discovery(&t).display());
            println!("  per database: {}", profile.dump(&t, "<db>").display());
        }
        Err(e) => println!("  skipped: {}", e),
    }
}

/// Prints the audit configuration summary.
fn print_audit_config(config: &AuditConfig) {
    let analysis_label = if config.analysis_enabled {
        format!("{} via {}", config.model, config.analysis_url)
    } else {
        "OFF".to_string()
    };

    print!("{}\r\n", format!("[+] Scanner:     {}", config.scanner).green().bold());
    print!("{}\r\n", format!("[+] Timeout:     {}s per stage", config.timeout).blue());
    print!("{}\r\n", format!("[+] Level/Risk:  {}/{}", config.level, config.risk).magenta().bold());
    print!("{}\r\n", format!("[+] Analysis:    {}", analysis_label).magenta());
    print!("{}\r\n", format!("[+] Concurrency: {} dump(s)", config.dump_concurrency).blue());
    print!("{}\r\n", format!("[+] Output:      {}", config.output).blue());
    if !config.extra_args.is_empty() {
        print!("{}\r\n", format!("[+] Extra args:  {}", config.extra_args.join(" ")).yellow());
    }
    print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
    std::io::stdout().flush().ok();
}
