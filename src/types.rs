use chrono::{DateTime, Local};

pub type UserId = u32;
pub type OrganisationId = u32;
pub type ClientId = u32;
pub type ProjectId = u32;
pub type RateRuleId = u32;
pub type TimeEntryId = u32;

/// Workspace a record belongs to: the user's own, or a shared organisation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Personal,
    Organisation(OrganisationId),
}

impl Scope {
    pub fn is_personal(&self) -> bool {
        matches!(self, Scope::Personal)
    }

    pub fn organisation_id(&self) -> Option<OrganisationId> {
        match self {
            Scope::Personal => None,
            Scope::Organisation(id) => Some(*id),
        }
    }

    pub fn from_organisation(organisation_id: Option<OrganisationId>) -> Self {
        organisation_id.map_or(Scope::Personal, Scope::Organisation)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct User {
    pub id: Option<UserId>,
    pub name: String,
    pub email: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Role::Admin),
            "member" => Some(Role::Member),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Organisation {
    pub id: Option<OrganisationId>,
    pub name: String,
    pub slug: String,
    pub owner_id: UserId,
    pub currency: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Client {
    pub id: Option<ClientId>,
    pub name: String,
    pub colour: String,
    pub scope: Scope,
    pub user_id: UserId,
    pub archived: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Project {
    pub id: Option<ProjectId>,
    pub name: String,
    pub client_id: ClientId,
    pub category: Option<String>,
    pub colour: String,
    pub default_rate: f64,
    pub scope: Scope,
    pub user_id: UserId,
    pub archived: bool,
}

/// One tier of a rate rule: once weekly hours reach the threshold, `new_rate` applies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateCondition {
    pub weekly_hours_threshold: f64,
    pub new_rate: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RateRule {
    pub id: Option<RateRuleId>,
    pub name: String,
    pub project_id: ProjectId,
    pub base_rate: f64,
    pub conditions: Vec<RateCondition>,
    pub is_active: bool,
    pub user_id: UserId,
    pub organisation_id: Option<OrganisationId>,
    pub created_at: DateTime<Local>,
}

/// A recorded interval of work. `applied_rate` is frozen when the entry is created.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TimeEntry {
    pub id: Option<TimeEntryId>,
    pub description: String,
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
    pub duration: i64,
    pub project_id: ProjectId,
    pub client_id: ClientId,
    pub applied_rate: f64,
    pub scope: Scope,
    pub user_id: UserId,
    pub created_at: DateTime<Local>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Timer {
    pub user_id: UserId,
    pub description: String,
    pub project_id: ProjectId,
    pub client_id: ClientId,
    pub scope: Scope,
    pub started_at: DateTime<Local>,
}

/// Filter for listing time entries. `user_id` and `scope` are always applied.
#[derive(Clone, Debug)]
pub(crate) struct EntryFilter {
    pub user_id: UserId,
    pub scope: Scope,
    pub project_id: Option<ProjectId>,
    pub client_id: Option<ClientId>,
    pub range: Option<(DateTime<Local>, DateTime<Local>)>,
}

impl EntryFilter {
    pub fn new(user_id: UserId, scope: Scope) -> Self {
        Self {
            user_id,
            scope,
            project_id: None,
            client_id: None,
            range: None,
        }
    }
}
