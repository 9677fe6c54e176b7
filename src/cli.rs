/// CLI argument parsing and command handling.
use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::debug;

use crate::error::RatecardError;
use crate::report::{self, GroupBy};
use crate::tracking::{self, NewTimeEntry};
use crate::types::{
    Client, ClientId, EntryFilter, Organisation, Project, ProjectId, RateCondition, RateRule,
    RateRuleId, Role, Scope, User, UserId,
};
use crate::week::{RangeKind, ReportRange, WeekWindow};
use crate::{color, db, rate};

#[derive(Parser)]
#[command(
    name = "ratecard",
    version,
    about = "Ratecard - time tracking with tiered weekly billing rates"
)]
pub struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "RATECARD_DB")]
    pub db: Option<String>,

    /// Email of the acting user
    #[arg(long, global = true, env = "RATECARD_USER")]
    pub user: Option<String>,

    /// Organisation slug; omit for the personal workspace
    #[arg(long, global = true)]
    pub org: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    Org {
        #[command(subcommand)]
        command: OrgCommand,
    },
    Client {
        #[command(subcommand)]
        command: ClientCommand,
    },
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },
    Rule {
        #[command(subcommand)]
        command: RuleCommand,
    },
    Entry {
        #[command(subcommand)]
        command: EntryCommand,
    },
    Timer {
        #[command(subcommand)]
        command: TimerCommand,
    },
    /// Show the hourly rate a new entry would get
    Rate {
        project: ProjectId,
        /// Entry start time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<String>,
    },
    Report {
        #[arg(long, value_enum, default_value_t = RangeKind::Week)]
        range: RangeKind,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, value_enum, default_value_t = GroupBy::Project)]
        group_by: GroupBy,
        #[arg(long)]
        project: Option<ProjectId>,
        #[arg(long)]
        client: Option<ClientId>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    Add { name: String, email: String },
}

#[derive(Subcommand, Debug)]
pub enum OrgCommand {
    Add {
        name: String,
        slug: String,
        #[arg(long, default_value = "GBP")]
        currency: String,
    },
    Join {
        slug: String,
        #[arg(long, value_enum, default_value_t = Role::Member)]
        role: Role,
    },
    List,
}

#[derive(Subcommand, Debug)]
pub enum ClientCommand {
    Add {
        name: String,
        /// #RRGGBB or `random`
        #[arg(long)]
        colour: Option<String>,
    },
    List,
    Archive { id: ClientId },
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    Add {
        name: String,
        #[arg(long)]
        client: ClientId,
        /// Default hourly rate
        #[arg(long, default_value_t = 0.0)]
        rate: f64,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        colour: Option<String>,
    },
    List {
        #[arg(long)]
        client: Option<ClientId>,
    },
    Archive { id: ProjectId },
}

#[derive(Subcommand, Debug)]
pub enum RuleCommand {
    Add {
        name: String,
        #[arg(long)]
        project: ProjectId,
        #[arg(long)]
        base_rate: f64,
        /// Weekly tier as HOURS:RATE, repeatable
        #[arg(long = "tier")]
        tiers: Vec<String>,
    },
    List {
        #[arg(long)]
        project: ProjectId,
    },
    Deactivate { id: RateRuleId },
}

#[derive(Subcommand, Debug)]
pub enum EntryCommand {
    Add {
        project: ProjectId,
        description: String,
        #[arg(short = 's', long = "start")]
        start: String,
        #[arg(short = 'e', long = "end")]
        end: Option<String>,
        /// Seconds, or with an `h`/`m` suffix
        #[arg(short = 'd', long = "duration")]
        duration: Option<String>,
        #[arg(short = 'c', long = "client")]
        client: Option<ClientId>,
    },
    List {
        #[arg(long)]
        project: Option<ProjectId>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

#[derive(Subcommand, Debug)]
pub enum TimerCommand {
    Start {
        project: ProjectId,
        description: String,
    },
    Stop,
    Discard,
    Status,
}

/// Execute a CLI command on behalf of the user named by `--user`.
pub fn run(cli: Cli, conn: &Connection) -> Result<()> {
    let Cli {
        user, org, command, ..
    } = cli;
    if let Command::User {
        command: UserCommand::Add { name, email },
    } = command
    {
        return handle_user_add(name, email, conn);
    }

    let user_id = current_user(user.as_deref(), conn)?;
    debug!(user_id, org = org.as_deref(), "resolved acting user");
    match command {
        Command::User { .. } => {}
        Command::Org { command } => match command {
            OrgCommand::Add {
                name,
                slug,
                currency,
            } => handle_org_add(user_id, name, slug, currency, conn)?,
            OrgCommand::Join { slug, role } => handle_org_join(user_id, &slug, role, conn)?,
            OrgCommand::List => handle_org_list(user_id, conn)?,
        },
        Command::Client { command } => {
            let scope = current_scope(org.as_deref(), user_id, conn)?;
            match command {
                ClientCommand::Add { name, colour } => {
                    handle_client_add(user_id, scope, name, colour, conn)?
                }
                ClientCommand::List => handle_client_list(user_id, scope, conn)?,
                ClientCommand::Archive { id } => {
                    if !db::archive_client(id, user_id, conn)? {
                        return Err(RatecardError::ClientNotFound(id).into());
                    }
                    println!("Archived client {id}.");
                }
            }
        }
        Command::Project { command } => {
            let scope = current_scope(org.as_deref(), user_id, conn)?;
            match command {
                ProjectCommand::Add {
                    name,
                    client,
                    rate,
                    category,
                    colour,
                } => handle_project_add(
                    user_id,
                    scope,
                    ProjectArgs {
                        name,
                        client,
                        rate,
                        category,
                        colour,
                    },
                    conn,
                )?,
                ProjectCommand::List { client } => {
                    handle_project_list(user_id, scope, client, conn)?
                }
                ProjectCommand::Archive { id } => {
                    if !db::archive_project(id, user_id, conn)? {
                        return Err(RatecardError::ProjectNotFound(id).into());
                    }
                    println!("Archived project {id}.");
                }
            }
        }
        Command::Rule { command } => match command {
            RuleCommand::Add {
                name,
                project,
                base_rate,
                tiers,
            } => {
                let scope = current_scope(org.as_deref(), user_id, conn)?;
                handle_rule_add(user_id, scope, name, project, base_rate, &tiers, conn)?
            }
            RuleCommand::List { project } => handle_rule_list(user_id, project, conn)?,
            RuleCommand::Deactivate { id } => {
                if !db::deactivate_rate_rule(id, user_id, conn)? {
                    println!("Rate rule {id} not found.");
                } else {
                    println!("Deactivated rate rule {id}.");
                }
            }
        },
        Command::Entry { command } => {
            let scope = current_scope(org.as_deref(), user_id, conn)?;
            match command {
                EntryCommand::Add {
                    project,
                    description,
                    start,
                    end,
                    duration,
                    client,
                } => {
                    let new = NewTimeEntry {
                        description,
                        start: parse_datetime(&start)?,
                        end: parse_optional_datetime(end)?,
                        duration: duration.as_deref().map(parse_duration).transpose()?,
                        project_id: project,
                        client_id: client,
                        scope,
                    };
                    let entry = tracking::record_entry(user_id, new, Local::now(), conn)?;
                    println!(
                        "Recorded entry {} ({}) at {:.2}/h.",
                        entry.id.unwrap_or_default(),
                        report::format_duration(entry.duration),
                        entry.applied_rate
                    );
                }
                EntryCommand::List {
                    project,
                    page,
                    limit,
                } => handle_entry_list(user_id, scope, project, page.max(1), limit.max(1), conn)?,
            }
        }
        Command::Timer { command } => handle_timer(user_id, org.as_deref(), command, conn)?,
        Command::Rate { project, at } => {
            let at = match at {
                Some(raw) => parse_datetime(&raw)?,
                None => Local::now(),
            };
            let window = WeekWindow::containing(at);
            let applied = rate::resolve_rate(conn, project, user_id, &window);
            println!(
                "Project {project}: {applied:.2}/h for week {} to {}",
                window.start.format("%Y-%m-%d"),
                window.end.format("%Y-%m-%d")
            );
        }
        Command::Report {
            range,
            from,
            to,
            group_by,
            project,
            client,
            json,
        } => {
            let scope = current_scope(org.as_deref(), user_id, conn)?;
            let range = ReportRange::new(range, from, to)?;
            let mut filter = EntryFilter::new(user_id, scope);
            filter.project_id = project;
            filter.client_id = client;
            filter.range = Some(range.bounds(Local::now())?);
            let report = report::load_report(&filter, group_by, range.label(), conn)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
    }
    Ok(())
}

fn current_user(email: Option<&str>, conn: &Connection) -> Result<UserId> {
    let email = email.ok_or(RatecardError::MissingField("user"))?;
    db::query_user_by_email(email, conn)?
        .and_then(|user| user.id)
        .ok_or_else(|| RatecardError::UserNotFound(email.to_string()).into())
}

/// Organisation scope requires membership.
fn current_scope(slug: Option<&str>, user_id: UserId, conn: &Connection) -> Result<Scope> {
    let Some(slug) = slug else {
        return Ok(Scope::Personal);
    };
    let organisation_id = db::query_organisation_by_slug(slug, conn)?
        .and_then(|org| org.id)
        .ok_or_else(|| RatecardError::OrganisationNotFound(slug.to_string()))?;
    if db::query_member_role(organisation_id, user_id, conn)?.is_none() {
        return Err(RatecardError::NotAMember(slug.to_string()).into());
    }
    Ok(Scope::Organisation(organisation_id))
}

fn handle_user_add(name: String, email: String, conn: &Connection) -> Result<()> {
    if db::query_user_by_email(&email, conn)?.is_some() {
        println!("User '{email}' already exists.");
        return Ok(());
    }
    let name = require_name(name, "user name")?;
    let id = db::create_user(User { id: None, name, email }, conn)?;
    println!("Created user {id}.");
    Ok(())
}

fn handle_org_add(
    owner_id: UserId,
    name: String,
    slug: String,
    currency: String,
    conn: &Connection,
) -> Result<()> {
    if db::query_organisation_by_slug(&slug, conn)?.is_some() {
        println!("Organisation '{slug}' already exists.");
        return Ok(());
    }
    let id = db::create_organisation(
        Organisation {
            id: None,
            name: require_name(name, "organisation name")?,
            slug: require_name(slug, "slug")?,
            owner_id,
            currency: currency.trim().to_uppercase(),
        },
        conn,
    )?;
    println!("Created organisation {id}.");
    Ok(())
}

fn handle_org_join(user_id: UserId, slug: &str, role: Role, conn: &Connection) -> Result<()> {
    let organisation_id = db::query_organisation_by_slug(slug, conn)?
        .and_then(|org| org.id)
        .ok_or_else(|| RatecardError::OrganisationNotFound(slug.to_string()))?;
    if let Some(existing) = db::query_member_role(organisation_id, user_id, conn)? {
        println!("Already a {} of '{slug}'.", existing.as_str());
        return Ok(());
    }
    db::add_member(organisation_id, user_id, role, conn)?;
    println!("Joined '{slug}' as {}.", role.as_str());
    Ok(())
}

fn handle_org_list(user_id: UserId, conn: &Connection) -> Result<()> {
    for (org, role) in db::query_organisations_for_user(user_id, conn)? {
        println!("{}\t{}\t{}\t{}", org.slug, org.name, org.currency, role.as_str());
    }
    Ok(())
}

fn handle_client_add(
    user_id: UserId,
    scope: Scope,
    name: String,
    colour: Option<String>,
    conn: &Connection,
) -> Result<()> {
    let id = db::create_client(
        Client {
            id: None,
            name: require_name(name, "client name")?,
            colour: color::resolve_colour(colour, color::DEFAULT_CLIENT_COLOUR)?,
            scope,
            user_id,
            archived: false,
        },
        conn,
    )?;
    println!("Created client {id}.");
    Ok(())
}

fn handle_client_list(user_id: UserId, scope: Scope, conn: &Connection) -> Result<()> {
    for client in db::query_clients(user_id, scope, conn)? {
        println!(
            "{}\t{}\t{}",
            client.id.unwrap_or_default(),
            client.name,
            client.colour
        );
    }
    Ok(())
}

struct ProjectArgs {
    name: String,
    client: ClientId,
    rate: f64,
    category: Option<String>,
    colour: Option<String>,
}

fn handle_project_add(
    user_id: UserId,
    scope: Scope,
    args: ProjectArgs,
    conn: &Connection,
) -> Result<()> {
    if db::query_client_by_id(args.client, conn)?.is_none() {
        return Err(RatecardError::ClientNotFound(args.client).into());
    }
    let id = db::create_project(
        Project {
            id: None,
            name: require_name(args.name, "project name")?,
            client_id: args.client,
            category: args.category,
            colour: color::resolve_colour(args.colour, color::DEFAULT_PROJECT_COLOUR)?,
            default_rate: require_rate(args.rate, "default rate")?,
            scope,
            user_id,
            archived: false,
        },
        conn,
    )?;
    println!("Created project {id}.");
    Ok(())
}

fn handle_project_list(
    user_id: UserId,
    scope: Scope,
    client: Option<ClientId>,
    conn: &Connection,
) -> Result<()> {
    for project in db::query_projects(user_id, scope, client, conn)? {
        println!(
            "{}\t{}\tclient {}\t{:.2}/h",
            project.id.unwrap_or_default(),
            project.name,
            project.client_id,
            project.default_rate
        );
    }
    Ok(())
}

fn handle_rule_add(
    user_id: UserId,
    scope: Scope,
    name: String,
    project_id: ProjectId,
    base_rate: f64,
    tiers: &[String],
    conn: &Connection,
) -> Result<()> {
    if db::query_project_by_id(project_id, conn)?.is_none() {
        return Err(RatecardError::ProjectNotFound(project_id).into());
    }
    let conditions = tiers
        .iter()
        .map(String::as_str)
        .map(parse_tier)
        .collect::<Result<Vec<_>, _>>()?;
    let id = db::create_rate_rule(
        RateRule {
            id: None,
            name: require_name(name, "rule name")?,
            project_id,
            base_rate: require_rate(base_rate, "base rate")?,
            conditions,
            is_active: true,
            user_id,
            organisation_id: scope.organisation_id(),
            created_at: Local::now(),
        },
        conn,
    )?;
    println!("Created rate rule {id}.");
    Ok(())
}

fn handle_rule_list(user_id: UserId, project_id: ProjectId, conn: &Connection) -> Result<()> {
    for rule in db::query_rate_rules(project_id, user_id, conn)? {
        let tiers: Vec<String> = rule
            .conditions
            .iter()
            .map(|c| format!("{}h:{:.2}", c.weekly_hours_threshold, c.new_rate))
            .collect();
        println!(
            "{}\t{}\tbase {:.2}\t[{}]\t{}",
            rule.id.unwrap_or_default(),
            rule.name,
            rule.base_rate,
            tiers.join(", "),
            if rule.is_active { "active" } else { "inactive" }
        );
    }
    Ok(())
}

fn handle_entry_list(
    user_id: UserId,
    scope: Scope,
    project: Option<ProjectId>,
    page: u32,
    limit: u32,
    conn: &Connection,
) -> Result<()> {
    let mut filter = EntryFilter::new(user_id, scope);
    filter.project_id = project;
    let total = db::count_time_entries(&filter, conn)?;
    for entry in db::query_time_entries(&filter, Some((page, limit)), conn)? {
        println!(
            "{}\t{}\t{}\t{:.2}/h\tproject {}\t{}",
            entry.id.unwrap_or_default(),
            entry.start_time.format("%Y-%m-%d %H:%M"),
            report::format_duration(entry.duration),
            entry.applied_rate,
            entry.project_id,
            entry.description
        );
    }
    let pages = total.div_ceil(u64::from(limit));
    println!("Page {page} of {pages} ({total} entries)");
    Ok(())
}

fn handle_timer(
    user_id: UserId,
    org: Option<&str>,
    command: TimerCommand,
    conn: &Connection,
) -> Result<()> {
    match command {
        TimerCommand::Start {
            project,
            description,
        } => {
            let scope = current_scope(org, user_id, conn)?;
            let timer =
                tracking::start_timer(user_id, description, project, scope, Local::now(), conn)?;
            println!("Started '{}' at {}.", timer.description, timer.started_at.format("%H:%M"));
        }
        TimerCommand::Stop => {
            let entry = tracking::stop_timer(user_id, Local::now(), conn)?;
            println!(
                "Stopped '{}' after {} at {:.2}/h.",
                entry.description,
                report::format_duration(entry.duration),
                entry.applied_rate
            );
        }
        TimerCommand::Discard => {
            tracking::discard_timer(user_id, conn)?;
            println!("Timer discarded.");
        }
        TimerCommand::Status => match db::query_timer(user_id, conn)? {
            Some(timer) => {
                let elapsed = (Local::now() - timer.started_at).num_seconds().max(0);
                println!(
                    "Running '{}' on project {} for {}.",
                    timer.description,
                    timer.project_id,
                    report::format_duration(elapsed)
                );
            }
            None => println!("No timer running."),
        },
    }
    Ok(())
}

fn print_report(report: &report::Report) {
    let summary = &report.summary;
    println!(
        "{} to {} ({})",
        report.date_range.start.format("%Y-%m-%d"),
        report.date_range.end.format("%Y-%m-%d"),
        report.date_range.range
    );
    println!(
        "Total {}  earnings {:.2}  avg rate {:.2}  entries {}",
        summary.formatted_total_time, summary.total_earnings, summary.avg_rate, summary.entry_count
    );
    for row in &report.breakdown {
        println!(
            "{:<24} {:>8} {:>10.2} {:>5.1}%",
            row.name, row.formatted_duration, row.earnings, row.percentage
        );
    }
}

fn require_name(value: String, field: &'static str) -> Result<String, RatecardError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RatecardError::BlankName(field));
    }
    Ok(trimmed.to_string())
}

fn require_rate(value: f64, field: &'static str) -> Result<f64, RatecardError> {
    if !value.is_finite() || value < 0.0 {
        return Err(RatecardError::NegativeRate { field, value });
    }
    Ok(value)
}

/// Parses a `HOURS:RATE` tier, e.g. `22.5:150`.
fn parse_tier(raw: &str) -> Result<RateCondition, RatecardError> {
    let (hours, rate) = raw
        .split_once(':')
        .ok_or_else(|| RatecardError::InvalidTier(raw.to_string()))?;
    let parse = |s: &str| {
        s.trim()
            .trim_end_matches('h')
            .parse::<f64>()
            .map_err(|_| RatecardError::InvalidTier(raw.to_string()))
    };
    Ok(RateCondition {
        weekly_hours_threshold: require_rate(parse(hours)?, "weekly hours threshold")?,
        new_rate: require_rate(parse(rate)?, "tier rate")?,
    })
}

/// Seconds, `90m`, or `1.5h`.
fn parse_duration(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    let (number, unit) = if let Some(hours) = raw.strip_suffix('h') {
        (hours, 3600.0)
    } else if let Some(minutes) = raw.strip_suffix('m') {
        (minutes, 60.0)
    } else {
        (raw.strip_suffix('s').unwrap_or(raw), 1.0)
    };
    let seconds = number
        .parse::<f64>()
        .map(|value| (value * unit).round())
        .map_err(|_| RatecardError::InvalidDuration(raw.to_string()))?;
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    if !seconds.is_finite() || seconds < i64::MIN as f64 || seconds >= i64::MAX as f64 {
        return Err(RatecardError::InvalidDuration(raw.to_string()).into());
    }
    Ok(seconds as i64)
}

fn parse_datetime(value: &str) -> Result<DateTime<Local>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Local))
}

fn parse_optional_datetime(value: Option<String>) -> Result<Option<DateTime<Local>>> {
    value.as_deref().map(parse_datetime).transpose()
}
