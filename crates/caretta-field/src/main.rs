use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use caretta_field::api::{ApiClient, Backend, events_for_nests};
use caretta_field::catalog::TagPosition;
use caretta_field::config::{AppConfig, ExportFormat, PASSWORD_ENV, load_app_config, resolve_password};
use caretta_field::error::{Error, ErrorKind, Result};
use caretta_field::forms::nest_entry::{self, NestEntryForm, next_nest_code};
use caretta_field::forms::nest_inventory::{self, NestInventoryForm, expected_eggs, expected_label};
use caretta_field::forms::night_survey::{self, NightSurveyForm};
use caretta_field::forms::tagging::{self, TagIndex, TaggingForm, TurtleSubmitOutcome, TurtleTarget};
use caretta_field::forms::{RuleOutcome, first_issue};
use caretta_field::logging::{self, LogOptions};
use caretta_field::mappers::{NestEventRow, NestRow, TurtleRow, format_cm, format_date, or_missing};
use caretta_field::models::{Credentials, NestStatus, TurtleId};
use caretta_field::text::{sanitize_server_text, single_line};
use caretta_field::views::dashboard::DashboardStats;
use caretta_field::views::nest_details::{NestDetails, SiteCard, SiteMeasures};
use caretta_field::views::records::{NestQuery, NestSort, filter_nests, search_turtles};
use caretta_field::views::turtle_details::TurtleDetails;

#[derive(Debug, Parser)]
#[command(name = "caretta", author, version, about)]
struct Args {
    /// Config file (defaults to ./caretta.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Backend base URL, overriding config and environment
    #[arg(long, global = true)]
    api: Option<String>,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExportKind {
    Nests,
    Turtles,
    NestEvents,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List nests
    Nests {
        /// Case-insensitive match on code or beach
        #[arg(long)]
        search: Option<String>,
        #[arg(long, value_parser = parse_status)]
        status: Option<NestStatus>,
        #[arg(long)]
        beach: Option<String>,
        /// code, date or status
        #[arg(long, default_value = "code")]
        sort: NestSort,
        #[arg(long)]
        desc: bool,
        /// Include archived nests
        #[arg(long)]
        all: bool,
    },
    /// Nest details with its event timeline
    Nest { code: String },
    /// Record a newly found nest from a TOML draft
    NestEntry {
        draft: PathBuf,
        /// Validate and print the record without sending it
        #[arg(long)]
        dry_run: bool,
    },
    /// Record an excavation/inventory session for a nest
    Inventory {
        code: String,
        draft: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },
    /// List turtles
    Turtles {
        /// Match on any tag, species or id
        #[arg(long)]
        search: Option<String>,
    },
    /// Turtle details with tag and measurement history
    Turtle { id: TurtleId },
    /// Tag a turtle (new, or existing with --turtle)
    Tag {
        draft: PathBuf,
        #[arg(long)]
        turtle: Option<TurtleId>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Record a night-survey sighting (new, or existing with --turtle)
    Survey {
        draft: PathBuf,
        #[arg(long)]
        turtle: Option<TurtleId>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the next free nest code for a beach
    NextCode {
        /// Beach name or abbreviation
        beach: String,
        #[arg(long)]
        relocated: bool,
    },
    /// Season statistics
    Dashboard,
    /// Export records as JSON or CSV
    Export {
        #[arg(value_enum)]
        kind: ExportKind,
        /// json or csv (defaults to export.default_format)
        #[arg(long)]
        format: Option<ExportFormat>,
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List registered users
    Users,
    /// Create an account (password from CARETTA_PASSWORD or stdin)
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Check credentials (password from CARETTA_PASSWORD or stdin)
    Login {
        #[arg(long)]
        email: String,
    },
    /// Terminal UI (dashboard, nests, turtles)
    Tui,
}

fn parse_status(raw: &str) -> std::result::Result<NestStatus, String> {
    NestStatus::parse(raw)
        .ok_or_else(|| format!("unknown status '{raw}' (incubating, hatching or hatched)"))
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            match e.kind() {
                ErrorKind::Validation { .. } => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run(args: Args) -> Result<()> {
    let cfg = load_app_config(args.config.as_deref())?;
    logging::init(
        &cfg.logging,
        LogOptions {
            verbose: args.verbose,
            json: args.log_json,
            silent: matches!(args.cmd, Command::Tui),
        },
    )?;
    let client = ApiClient::from_config(&cfg, args.api.as_deref())?;
    tracing::debug!(base = client.base_url(), "backend");

    match args.cmd {
        Command::Nests {
            search,
            status,
            beach,
            sort,
            desc,
            all,
        } => cmd_nests(
            &client,
            &NestQuery {
                search,
                status,
                beach,
                sort,
                descending: desc,
                include_archived: all,
            },
        ),
        Command::Nest { code } => cmd_nest(&client, &code),
        Command::NestEntry { draft, dry_run } => cmd_nest_entry(&client, &cfg, &draft, dry_run),
        Command::Inventory {
            code,
            draft,
            dry_run,
        } => cmd_inventory(&client, &code, &draft, dry_run),
        Command::Turtles { search } => cmd_turtles(&client, search.as_deref()),
        Command::Turtle { id } => cmd_turtle(&client, id),
        Command::Tag {
            draft,
            turtle,
            dry_run,
        } => cmd_tag(&client, &cfg, &draft, target(turtle), dry_run),
        Command::Survey {
            draft,
            turtle,
            dry_run,
        } => cmd_survey(&client, &draft, target(turtle), dry_run),
        Command::NextCode { beach, relocated } => cmd_next_code(&client, &cfg, &beach, relocated),
        Command::Dashboard => cmd_dashboard(&client, &cfg),
        Command::Export { kind, format, out } => cmd_export(
            &client,
            kind,
            format.unwrap_or(cfg.export.default_format),
            out.as_deref(),
        ),
        Command::Users => cmd_users(&client),
        Command::Register { name, email } => {
            let user = client.register(&Credentials {
                name: Some(name),
                email,
                password: password_input()?,
            })?;
            println!("registered {} <{}>", clean(&user.name), clean(&user.email));
            Ok(())
        }
        Command::Login { email } => {
            let user = client.login(&Credentials {
                name: None,
                email,
                password: password_input()?,
            })?;
            println!(
                "signed in as {} <{}> role={}",
                clean(&user.name),
                clean(&user.email),
                or_missing(user.role.as_deref())
            );
            Ok(())
        }
        Command::Tui => caretta_field::ui::run_tui(Box::new(client), cfg),
    }
}

fn target(turtle: Option<TurtleId>) -> TurtleTarget {
    match turtle {
        Some(id) => TurtleTarget::Existing(id),
        None => TurtleTarget::New,
    }
}

fn clean(s: &str) -> String {
    single_line(s, 48)
}

fn password_input() -> Result<String> {
    resolve_password(std::env::var(PASSWORD_ENV).ok(), &mut std::io::stdin().lock())
}

fn load_draft<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::msg(format!("failed to read draft {}: {e}", path.display())))?;
    toml::from_str(&raw).map_err(|e| Error::msg(format!("invalid draft {}: {e}", path.display())))
}

fn print_rules(outcomes: &[RuleOutcome]) {
    for o in outcomes {
        match &o.issue {
            None => println!("  ok    {}", o.rule),
            Some(issue) => println!("  FAIL  {:<20} {} [{}]", o.rule, issue.message, issue.field),
        }
    }
}

/// Prints every rule, then turns the first failure into the command's error.
fn gate(outcomes: &[RuleOutcome]) -> Result<()> {
    print_rules(outcomes);
    match first_issue(outcomes) {
        Some(issue) => Err(issue.clone().into()),
        None => Ok(()),
    }
}

fn print_json<T: serde::Serialize>(v: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

fn cmd_nests(client: &ApiClient, q: &NestQuery) -> Result<()> {
    let nests = client.list_nests()?;
    let rows: Vec<NestRow> = filter_nests(&nests, q).into_iter().map(NestRow::from).collect();
    println!(
        "{:<10} {:<18} {:<11} {:<11} {:>9}  {:<3} {}",
        "CODE", "BEACH", "FOUND", "STATUS", "EGGS", "REL", "GPS"
    );
    for r in &rows {
        println!(
            "{:<10} {:<18} {:<11} {:<11} {:>9}  {:<3} {}",
            clean(&r.code),
            single_line(&r.beach, 18),
            r.date_found,
            r.status,
            r.eggs,
            if r.relocated { "R" } else { "" },
            r.gps
        );
    }
    println!("{} nest(s)", rows.len());
    Ok(())
}

fn site_line(label: &str, m: &SiteMeasures) {
    let coord = |v: Option<f64>| v.map(|n| format!("{n:.5}")).unwrap_or_else(|| "N/A".into());
    println!(
        "{label:<10} h={} H={} w={} S={} gps={}, {}",
        format_cm(m.depth_top_egg_h),
        format_cm(m.depth_bottom_chamber_h),
        format_cm(m.width_w),
        format_cm(m.distance_to_sea_s),
        coord(m.gps_lat),
        coord(m.gps_long),
    );
}

fn cmd_nest(client: &ApiClient, code: &str) -> Result<()> {
    let nest = client.get_nest(code)?;
    let events = client.nest_events(&nest.code)?;
    let d = NestDetails::build(nest, &events);
    let row = NestRow::from(&d.nest);
    println!("Nest {}  ({})", clean(&row.code), row.beach);
    println!("found      {}", row.date_found);
    println!("status     {}", row.status);
    println!("eggs       {}", row.eggs);
    site_line("current", &d.current_site);
    match &d.original_site {
        Some(SiteCard::Site(m)) => site_line("original", m),
        Some(SiteCard::Archived) => println!("original   (data archived)"),
        None => {}
    }
    if let Some(notes) = d.nest.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        println!("notes      {}", sanitize_server_text(notes));
    }
    println!();
    println!("Timeline");
    for entry in &d.timeline {
        let row = entry.event.as_ref().map(NestEventRow::from);
        let detail = row
            .map(|r| {
                format!(
                    "counted={} reburied={} observer={}",
                    r.eggs_counted,
                    r.eggs_reburied,
                    clean(&r.observer)
                )
            })
            .unwrap_or_default();
        println!(
            "  {:<8} {:<11} {:<18} {}",
            entry.day_label(),
            format_date(entry.date.as_deref()),
            entry.event_type.as_str(),
            detail
        );
    }
    Ok(())
}

fn cmd_nest_entry(client: &ApiClient, cfg: &AppConfig, draft: &Path, dry_run: bool) -> Result<()> {
    let form: NestEntryForm = load_draft(draft)?;
    gate(&form.evaluate(&cfg.beaches))?;
    if dry_run {
        let codes: Vec<String> = client.list_nests()?.into_iter().map(|n| n.code).collect();
        return print_json(&form.prepare(&cfg.beaches, &codes)?);
    }
    let nest = nest_entry::submit(client, &form, &cfg.beaches)?;
    println!("created nest {} on {}", clean(&nest.code), clean(&nest.beach));
    Ok(())
}

fn cmd_inventory(client: &ApiClient, code: &str, draft: &Path, dry_run: bool) -> Result<()> {
    let form: NestInventoryForm = load_draft(draft)?;
    if dry_run {
        let nest = client.get_nest(code)?;
        let expected = expected_eggs(&nest);
        println!(
            "recorded {} / expected {}  ({})",
            form.recorded_total(),
            expected_label(expected),
            form.event_type().as_str()
        );
        gate(&form.evaluate(expected))?;
        print_json(&form.build_event(&nest.code))?;
        return print_json(&form.parent_update(&nest));
    }
    let out = nest_inventory::submit(client, code, &form)?;
    println!(
        "saved {} for nest {}",
        out.event.event_type.as_str(),
        clean(&out.event.nest_code)
    );
    if let Some(nest) = &out.nest {
        let row = NestRow::from(nest);
        println!("nest now {} with {} eggs", row.status, row.eggs);
    }
    if let Some(err) = out.nest_update_error {
        return Err(Error::msg(format!(
            "event saved but nest update failed: {err}"
        )));
    }
    Ok(())
}

fn cmd_turtles(client: &ApiClient, search: Option<&str>) -> Result<()> {
    let turtles = client.list_turtles()?;
    let rows: Vec<TurtleRow> = search_turtles(&turtles, search)
        .into_iter()
        .map(TurtleRow::from)
        .collect();
    println!("{:<6} {:<14} {:<4} {:<40} HEALTH", "ID", "SPECIES", "SEX", "TAGS");
    for r in &rows {
        println!(
            "{:<6} {:<14} {:<4} {:<40} {}",
            r.id,
            clean(&r.species),
            clean(&r.sex),
            clean(&r.tags),
            clean(&r.health)
        );
    }
    println!("{} turtle(s)", rows.len());
    Ok(())
}

fn cmd_turtle(client: &ApiClient, id: TurtleId) -> Result<()> {
    let turtle = client.get_turtle(id)?;
    let events = client.turtle_survey_events(id)?;
    let d = TurtleDetails::build(turtle, &events);
    println!(
        "Turtle #{id}  {} ({})",
        clean(&d.common_name),
        clean(&d.turtle.species)
    );
    println!("sex        {}", or_missing(d.turtle.sex.as_deref()));
    println!("health     {}", clean(&or_missing(d.turtle.health_condition.as_deref())));
    println!();
    println!("Tags");
    for t in &d.tags {
        println!(
            "  {:<12} {:<12} last seen {:<12} history [{}]  {}",
            t.position.label(),
            or_missing(t.current.as_deref()),
            or_missing(t.latest_observed.as_deref()),
            t.history.join(", "),
            clean(&or_missing(t.address.as_deref())),
        );
    }
    println!();
    println!("Measurements");
    for m in &d.measurements {
        println!(
            "  {:<18} {:<10} {}",
            m.name,
            format_cm(m.value),
            m.observed_on
                .as_deref()
                .map(|day| format!("(survey {})", format_date(Some(day))))
                .unwrap_or_default()
        );
    }
    println!();
    println!("Surveys");
    for ev in &d.surveys {
        println!(
            "  {:<11} {:<13} {}",
            format_date(Some(ev.event_date.as_str())),
            ev.event_type.as_str(),
            clean(&or_missing(ev.observer.as_deref()))
        );
    }
    Ok(())
}

fn report_turtle(out: TurtleSubmitOutcome) -> Result<()> {
    let id = out
        .turtle
        .id
        .map(|i| format!("#{i}"))
        .unwrap_or_else(|| "(no id)".into());
    match (&out.event, out.event_error) {
        (Some(ev), _) => {
            println!("saved {} for turtle {id}", ev.event_type.as_str());
            Ok(())
        }
        (None, Some(err)) => Err(Error::msg(format!(
            "turtle {id} saved but event failed: {err}"
        ))),
        (None, None) => Ok(()),
    }
}

fn cmd_tag(
    client: &ApiClient,
    cfg: &AppConfig,
    draft: &Path,
    target: TurtleTarget,
    dry_run: bool,
) -> Result<()> {
    let mut form: TaggingForm = load_draft(draft)?;
    let turtles = client.list_turtles()?;
    if target == TurtleTarget::New && form.prefill_tags(&turtles, &cfg.tags.prefix) {
        println!(
            "assigned tags {} / {}",
            or_missing(form.turtle.tags.tag(TagPosition::FrontLeft)),
            or_missing(form.turtle.tags.tag(TagPosition::FrontRight)),
        );
    }
    let index = TagIndex::build(&turtles);
    gate(&form.evaluate(&index, target))?;
    if dry_run {
        return print_json(&form.build_event(target.editing().unwrap_or_default()));
    }
    report_turtle(tagging::submit(client, &form, target)?)
}

fn cmd_survey(client: &ApiClient, draft: &Path, target: TurtleTarget, dry_run: bool) -> Result<()> {
    let form: NightSurveyForm = load_draft(draft)?;
    let index = TagIndex::build(&client.list_turtles()?);
    gate(&form.evaluate(&index, target))?;
    if dry_run {
        return print_json(&form.build_event(target.editing().unwrap_or_default()));
    }
    report_turtle(night_survey::submit(client, &form, target)?)
}

fn cmd_next_code(client: &ApiClient, cfg: &AppConfig, beach: &str, relocated: bool) -> Result<()> {
    let b = cfg
        .beach_by_name(beach)
        .ok_or_else(|| Error::config(format!("unknown beach '{beach}'")))?;
    let nests = client.list_nests()?;
    println!(
        "{}",
        next_nest_code(nests.iter().map(|n| n.code.as_str()), &b.abbrev, relocated)
    );
    Ok(())
}

fn cmd_dashboard(client: &ApiClient, cfg: &AppConfig) -> Result<()> {
    let nests = client.list_nests()?;
    let turtles = client.list_turtles()?;
    let active: Vec<_> = nests.iter().filter(|n| !n.is_archived).cloned().collect();
    let events = events_for_nests(client, &active)?;
    let s = DashboardStats::compute(&nests, &turtles, &events);
    println!("active nests   {}", s.active_nests);
    println!(
        "  incubating {}  hatching {}  hatched {}  relocated {}",
        s.incubating, s.hatching, s.hatched, s.relocated
    );
    for (beach, n) in s.beach_rows(&cfg.beaches) {
        println!("  {:<20} {n}", clean(&beach));
    }
    println!("eggs           {} total, {} remaining", s.total_eggs, s.current_eggs);
    println!(
        "hatching       {}",
        s.hatching_success
            .map(|p| format!("{p:.1}%"))
            .unwrap_or_else(|| "N/A".into())
    );
    println!("turtles        {}", s.turtles);
    for (species, n) in &s.turtles_per_species {
        println!("  {:<20} {n}", clean(species));
    }
    Ok(())
}

fn cmd_export(client: &ApiClient, kind: ExportKind, format: ExportFormat, out: Option<&Path>) -> Result<()> {
    use caretta_field::export::{render, write_export};
    let rendered = match kind {
        ExportKind::Nests => render(&client.list_nests()?, format)?,
        ExportKind::Turtles => render(&client.list_turtles()?, format)?,
        ExportKind::NestEvents => {
            let nests = client.list_nests()?;
            render(&events_for_nests(client, &nests)?, format)?
        }
    };
    write_export(&rendered, out)
}

fn cmd_users(client: &ApiClient) -> Result<()> {
    for u in client.list_users()? {
        println!(
            "{:<6} {:<24} {:<32} {}",
            u.id.map(|i| i.to_string()).unwrap_or_default(),
            clean(&u.name),
            clean(&u.email),
            or_missing(u.role.as_deref())
        );
    }
    Ok(())
}
