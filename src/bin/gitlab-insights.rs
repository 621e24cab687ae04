use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use gitlab_insights::classify::{generate_stories, IssueSuggestions};
use gitlab_insights::model::{parse_label_list, IssueState};
use gitlab_insights::{
    resolve_epic, resolve_scope, ActivityPeriod, ActivityRow, DateWindow, EpicIssueRow,
    EscapeMetrics, FlowMetrics, GitlabConfig, GitlabInsights, IssueAnalyticsRow, IssueQuery,
    IssueSource, MilestoneDetail, MilestoneSummary, Report, Scope, ScopeKind, Settings, TatPoint,
    TimeInStatus, TrendPoint, TriageLagOptions, TriageLagRow,
};

#[derive(Parser)]
#[command(name = "gitlab-insights", about = "Delivery analytics for GitLab groups and projects")]
struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// GitLab base URL (default: $GITLAB_URL, then settings, then https://gitlab.com)
    #[arg(long)]
    url: Option<String>,

    /// Personal access token (default: $GITLAB_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Read issues from a JSON snapshot file instead of the API
    #[arg(long, value_name = "FILE")]
    snapshot: Option<PathBuf>,

    /// Settings file (default: ~/.gitlab-insights/config.json)
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    /// Group or project: numeric id, full path or GitLab URL
    #[arg(value_name = "GROUP_OR_PROJECT")]
    target: String,
    /// Treat the target as a project rather than a group
    #[arg(long)]
    project: bool,
}

impl Target {
    fn scope(&self) -> gitlab_insights::Result<Scope> {
        let kind = if self.project { ScopeKind::Project } else { ScopeKind::Group };
        resolve_scope(kind, &self.target)
    }
}

#[derive(Args)]
struct EscapeLabels {
    /// Labels marking QA-found bugs (comma-separated; default from settings)
    #[arg(long = "qa-label", value_delimiter = ',')]
    qa: Vec<String>,
    /// Labels marking production bugs (comma-separated; default from settings)
    #[arg(long = "prod-label", value_delimiter = ',')]
    prod: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Defect escape metrics for issues created in a window
    Escape {
        #[command(flatten)]
        target: Target,
        /// Window (e.g. 2024, 2024-Q1, 2024-03, 30d, 2024-01-01..2024-01-31)
        #[arg(long, default_value = "30d")]
        window: String,
        #[command(flatten)]
        labels: EscapeLabels,
    },
    /// Monthly defect escape trend
    Trend {
        #[command(flatten)]
        target: Target,
        /// Number of full months before the current one
        #[arg(long, default_value = "6")]
        months: u32,
        #[command(flatten)]
        labels: EscapeLabels,
    },
    /// Weekly mean turnaround time of closed issues
    Tat {
        #[command(flatten)]
        target: Target,
        #[arg(long, default_value = "3")]
        months: u32,
    },
    /// Time spent in each workflow stage
    Status {
        #[command(flatten)]
        target: Target,
        #[arg(long, default_value = "30d")]
        window: String,
        /// Stage mapping as NAME=label[,label...]; repeatable (default from settings)
        #[arg(long = "stage", value_name = "NAME=LABELS")]
        stages: Vec<String>,
    },
    /// Days between milestone assignment and the milestone's due date
    TriageLag {
        #[command(flatten)]
        target: Target,
        #[arg(long, default_value = "30d")]
        window: String,
        /// Also include the next open milestones due after today
        #[arg(long)]
        upcoming: bool,
        /// Only issues carrying one of these labels (comma-separated)
        #[arg(long = "label", value_delimiter = ',')]
        labels: Vec<String>,
    },
    /// Milestones of a group due in a window
    Milestones {
        /// Group id, full path or URL
        group: String,
        #[arg(long, default_value = "90d")]
        window: String,
    },
    /// Detail and burndown for one milestone
    Milestone {
        /// Group id, full path or URL
        group: String,
        /// Milestone id
        id: u64,
    },
    /// Per-issue analytics
    Analytics {
        #[command(flatten)]
        target: Target,
        /// Only issues created in this window
        #[arg(long)]
        window: Option<String>,
        /// opened or closed
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        label: Option<String>,
        /// Milestone title
        #[arg(long)]
        milestone: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Issues of an epic and all its descendant epics
    Epic {
        /// Epic IID (e.g. 5 or &5) or epic URL
        epic: String,
        /// Group owning the epic, when an IID is given
        #[arg(long)]
        group: Option<String>,
    },
    /// Issues assigned to a user
    Activity {
        username: String,
        /// current or last-week
        #[arg(long, default_value = "current")]
        period: String,
    },
    /// Lead and cycle time from the first value stream
    Flow {
        #[command(flatten)]
        target: Target,
        #[arg(long, default_value = "30d")]
        window: String,
    },
    /// Suggest scoped labels for open issues missing them
    SuggestLabels {
        #[command(flatten)]
        target: Target,
        #[arg(long, default_value = "30d")]
        window: String,
        /// Label prefixes to check (comma-separated)
        #[arg(long = "prefix", value_delimiter = ',', default_value = "type::,workflow::,priority::")]
        prefixes: Vec<String>,
    },
    /// Turn a requirements document into user stories
    Stories {
        /// Path to a plain-text or markdown document
        file: PathBuf,
    },
    /// Manage the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings
    Show,
    /// Write an empty settings file if none exists
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli).await {
        let upstream = e
            .downcast_ref::<gitlab_insights::Error>()
            .is_some_and(|e| e.is_upstream());
        if upstream {
            eprintln!("Error: failed to fetch data from GitLab");
            eprintln!("  Cause: {e:#}");
        } else {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings_path = cli.settings.clone().or_else(Settings::default_path);
    let settings = match &settings_path {
        Some(path) => Settings::load_from(path)?,
        None => Settings::default(),
    };

    let command = match cli.command {
        Commands::Stories { file } => {
            let prd = std::fs::read_to_string(&file)
                .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", file.display()))?;
            let stories = generate_stories(&prd);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stories)?);
            } else if stories.is_empty() {
                println!("No stories found.");
            } else {
                for s in &stories {
                    println!("{}  {}", s.id, s.title);
                    println!("    {}", s.description);
                }
            }
            return Ok(());
        }
        Commands::Config { action } => {
            return handle_config(action, settings_path, &settings);
        }
        other => other,
    };

    if let Some(path) = &cli.snapshot {
        let insights = GitlabInsights::from_snapshot(path, settings)?;
        return handle_report(&insights, command, cli.json).await;
    }

    let url_from_env = std::env::var("GITLAB_URL").is_ok_and(|v| !v.trim().is_empty());
    let mut config = settings.apply_to(GitlabConfig::from_env(), url_from_env);
    if let Some(url) = cli.url {
        config = config.with_url(url);
    }
    if let Some(token) = cli.token {
        config = config.with_token(token);
    }
    log::info!("Using GitLab at {}", config.url);
    let insights = GitlabInsights::connect(&config, settings)?;
    handle_report(&insights, command, cli.json).await
}

fn handle_config(action: ConfigAction, path: Option<PathBuf>, settings: &Settings) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            if let Some(ref p) = path {
                eprintln!("Settings file: {}", p.display());
            }
            println!("{}", serde_json::to_string_pretty(settings)?);
        }
        ConfigAction::Init => {
            let path = path.ok_or_else(|| anyhow::anyhow!("No home directory; pass --settings"))?;
            if path.exists() {
                println!("Settings file already exists: {}", path.display());
            } else {
                Settings::default().save_to(&path)?;
                println!("Wrote {}", path.display());
            }
        }
    }
    Ok(())
}

fn parse_stages(specs: &[String]) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
    let mut stages = BTreeMap::new();
    for spec in specs {
        let (name, labels) = spec
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected NAME=LABELS, got '{spec}'"))?;
        let labels = parse_label_list(labels);
        if name.trim().is_empty() || labels.is_empty() {
            anyhow::bail!("expected NAME=LABELS, got '{spec}'");
        }
        stages.insert(name.trim().to_string(), labels);
    }
    Ok(stages)
}

async fn handle_report<S: IssueSource>(
    insights: &GitlabInsights<S>,
    command: Commands,
    json: bool,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let today = now.date_naive();

    match command {
        Commands::Escape { target, window, labels } => {
            let scope = target.scope()?;
            let window = DateWindow::parse(&window, today)?;
            let m = insights
                .escape_metrics(&scope, &window, &labels.qa, &labels.prod)
                .await?
                .rounded();
            if json {
                println!("{}", serde_json::to_string_pretty(&m)?);
            } else {
                println!("Defect Escape: {scope} ({window})");
                print_escape(&m);
            }
        }
        Commands::Trend { target, months, labels } => {
            let scope = target.scope()?;
            let points = insights
                .escape_trend(&scope, months, &labels.qa, &labels.prod, today)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&points)?);
            } else {
                println!("Defect Escape Trend: {scope}");
                print_trend(&points);
            }
        }
        Commands::Tat { target, months } => {
            let report = insights.tat_trend(&target.scope()?, months, today).await?;
            emit(&report, json, |points| print_tat(points))?;
        }
        Commands::Status { target, window, stages } => {
            let scope = target.scope()?;
            let window = DateWindow::parse(&window, today)?;
            let stages = parse_stages(&stages)?;
            let stages = (!stages.is_empty()).then_some(&stages);
            let report = insights.time_in_status(&scope, &window, stages).await?;
            emit(&report, json, print_time_in_status)?;
        }
        Commands::TriageLag { target, window, upcoming, labels } => {
            let scope = target.scope()?;
            let window = DateWindow::parse(&window, today)?;
            let options = TriageLagOptions {
                include_upcoming: upcoming,
                labels,
            };
            let report = insights.triage_lag(&scope, &window, &options, today).await?;
            emit(&report, json, |rows| print_triage_lag(rows))?;
        }
        Commands::Milestones { group, window } => {
            let group = resolve_scope(ScopeKind::Group, &group)?;
            let window = DateWindow::parse(&window, today)?;
            let report = insights.milestones(&group, &window).await?;
            emit(&report, json, |rows| print_milestones(rows))?;
        }
        Commands::Milestone { group, id } => {
            let group = resolve_scope(ScopeKind::Group, &group)?;
            let report = insights.milestone_detail(&group, id).await?;
            emit(&report, json, print_milestone_detail)?;
        }
        Commands::Analytics {
            target,
            window,
            state,
            label,
            milestone,
            assignee,
            author,
            search,
        } => {
            let scope = target.scope()?;
            let mut query = IssueQuery::new();
            if let Some(w) = window {
                query = query.created_in(&DateWindow::parse(&w, today)?);
            }
            if let Some(s) = state {
                query = query.state(parse_state(&s)?);
            }
            if let Some(l) = label {
                query = query.label(&l);
            }
            if let Some(m) = milestone {
                query = query.milestone(&m);
            }
            if let Some(a) = assignee {
                query = query.assignee(&a);
            }
            if let Some(a) = author {
                query = query.author(&a);
            }
            if let Some(s) = search {
                query = query.search(&s);
            }
            let report = insights.issue_analytics(&scope, &query).await?;
            emit(&report, json, |rows| print_analytics(rows))?;
        }
        Commands::Epic { epic, group } => {
            let (group, iid) = resolve_epic(group.as_deref(), &epic)?;
            let report = insights.epic_report(&group, iid).await?;
            emit(&report, json, |rows| print_epic(rows))?;
        }
        Commands::Activity { username, period } => {
            let period = ActivityPeriod::parse(&period)
                .ok_or_else(|| anyhow::anyhow!("unknown period '{period}' (use current or last-week)"))?;
            let report = insights.user_activity(&username, period, now).await?;
            emit(&report, json, |rows| print_activity(rows))?;
        }
        Commands::Flow { target, window } => {
            let scope = target.scope()?;
            let window = DateWindow::parse(&window, today)?;
            let report = insights.lead_cycle_time(&scope, &window).await?;
            emit(&report, json, print_flow)?;
        }
        Commands::SuggestLabels { target, window, prefixes } => {
            let scope = target.scope()?;
            let window = DateWindow::parse(&window, today)?;
            let report = insights.label_suggestions(&scope, &window, &prefixes).await?;
            emit(&report, json, |rows| print_suggestions(rows))?;
        }
        Commands::Stories { .. } | Commands::Config { .. } => {}
    }
    Ok(())
}

fn parse_state(s: &str) -> anyhow::Result<IssueState> {
    match s.trim().to_lowercase().as_str() {
        "opened" | "open" => Ok(IssueState::Opened),
        "closed" => Ok(IssueState::Closed),
        _ => anyhow::bail!("unknown state '{s}' (use opened or closed)"),
    }
}

/// Print a report as JSON, its rows, or its no-data message.
fn emit<T: Serialize>(report: &Report<T>, json: bool, print: impl FnOnce(&T)) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    match report {
        Report::Ready(value) => print(value),
        Report::NoData(message) => println!("{message}"),
    }
    Ok(())
}

fn date_or_dash(d: Option<chrono::NaiveDate>) -> String {
    d.map_or_else(|| "-".to_string(), |d| d.to_string())
}

fn print_escape(m: &EscapeMetrics) {
    println!("  QA bugs:          {}", m.qa_count);
    println!("  Production bugs:  {}", m.prod_count);
    println!("  Created:          {}", m.total_created);
    println!("  Net (non-QA):     {}", m.net_total);
    println!("  QA escape ratio:  {:.2}%", m.qa_escape_ratio);
    println!("  Dev escape rate:  {:.2}%", m.dev_escape_rate);
}

fn print_trend(points: &[TrendPoint]) {
    println!("  {:<8} {:>5} {:>5} {:>7} {:>9} {:>9}", "Month", "QA", "Prod", "Created", "QA esc%", "Dev esc%");
    for p in points {
        let m = &p.metrics;
        println!(
            "  {:<8} {:>5} {:>5} {:>7} {:>9.2} {:>9.2}",
            p.label, m.qa_count, m.prod_count, m.total_created, m.qa_escape_ratio, m.dev_escape_rate
        );
    }
}

fn print_tat(points: &[TatPoint]) {
    println!("  {:<10} {:>10} {:>7}", "Week", "Mean days", "Issues");
    for p in points {
        println!("  {:<10} {:>10.2} {:>7}", p.week, p.mean_tat_days, p.issue_count);
    }
}

fn print_time_in_status(t: &TimeInStatus) {
    println!("Calendar days per stage, by week:");
    print!("  {:<16}", "Stage");
    for w in &t.weeks {
        print!(" {w:>10}");
    }
    println!();
    for s in &t.series {
        print!("  {:<16}", s.stage);
        for v in &s.values {
            print!(" {v:>10.2}");
        }
        println!();
    }

    println!("\nMan-days per issue:");
    for row in &t.issues {
        let stages: Vec<String> = row
            .stage_man_days
            .iter()
            .map(|(stage, days)| format!("{stage}={days:.2}"))
            .collect();
        println!("  #{:<6} {:>8.2}  {}  {}", row.iid, row.total_man_days, row.title, stages.join(" "));
    }
}

fn print_triage_lag(rows: &[TriageLagRow]) {
    for r in rows {
        println!(
            "  {:>4}d  {:<24} {} #{} {} (due {}, assigned {})",
            r.lag_days, r.milestone, r.project, r.iid, r.title, r.due_date, r.assigned_on
        );
    }
}

fn print_milestones(rows: &[MilestoneSummary]) {
    if rows.is_empty() {
        println!("No milestones due in this window.");
        return;
    }
    for m in rows {
        println!(
            "  [{}] {:<30} due {}  {}/{} closed",
            m.id,
            m.title,
            date_or_dash(m.due_date),
            m.closed_issues,
            m.total_issues
        );
    }
}

fn print_milestone_detail(d: &MilestoneDetail) {
    println!("Milestone: {} [{}]", d.title, d.id);
    println!("  Start:      {}", date_or_dash(d.start_date));
    println!("  Due:        {}", date_or_dash(d.due_date));
    println!("  Issues:     {} ({} closed, {} open)", d.total_issues, d.closed_issues, d.open_issues);
    println!("  Completion: {:.2}%", d.completion_pct);
    println!("  Burndown:");
    for (i, label) in d.burndown.labels.iter().enumerate() {
        let ideal = d.burndown.ideal.get(i).copied().unwrap_or(0.0);
        let actual = d.burndown.actual.get(i).copied().unwrap_or(0);
        println!("    {label:<10} ideal {ideal:>7.2}  actual {actual:>4}");
    }
    println!("  Issues:");
    for issue in &d.issues {
        println!("    #{:<6} {:<7} {}", issue.iid, issue.state, issue.title);
    }
}

fn print_analytics(rows: &[IssueAnalyticsRow]) {
    for r in rows {
        let assignees = if r.assignees.is_empty() {
            "-".to_string()
        } else {
            r.assignees.join(", ")
        };
        println!(
            "  #{:<6} {:<7} {:<14} {:>6.2}md  {}  [{}] {}",
            r.iid, r.state, r.issue_type, r.effort_man_days, r.project, assignees, r.title
        );
    }
}

fn print_epic(rows: &[EpicIssueRow]) {
    for r in rows {
        println!(
            "  {:<16} {:<12} {}  {} ({})",
            r.display_ref, r.status, r.created, r.title, r.assignees
        );
    }
}

fn print_activity(rows: &[ActivityRow]) {
    for r in rows {
        println!(
            "  #{:<6} {:<14} {:<12} {:>6.2}md  {}",
            r.iid, r.issue_type, r.workflow, r.estimate_man_days, r.title
        );
    }
}

fn print_flow(f: &FlowMetrics) {
    let fmt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |d| format!("{d:.2} days"));
    println!("  Lead time:  {}", fmt(f.lead_time_days));
    println!("  Cycle time: {}", fmt(f.cycle_time_days));
}

fn print_suggestions(rows: &[IssueSuggestions]) {
    for r in rows {
        let labels: Vec<&str> = r.suggestions.iter().map(|s| s.label).collect();
        println!("  #{:<6} {}  -> {}", r.iid, r.title, labels.join(", "));
    }
}
