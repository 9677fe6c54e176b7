/// Domain validation errors.
use thiserror::Error;

use crate::types::{ClientId, ProjectId};

#[derive(Debug, Error)]
pub enum RatecardError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("{0} must not be blank")]
    BlankName(&'static str),

    #[error("invalid colour '{0}', expected #RRGGBB")]
    InvalidColour(String),

    #[error("{field} must be non-negative, got {value}")]
    NegativeRate { field: &'static str, value: f64 },

    #[error("invalid tier '{0}', expected HOURS:RATE")]
    InvalidTier(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("end time is before start time")]
    EndBeforeStart,

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("organisation not found: {0}")]
    OrganisationNotFound(String),

    #[error("not a member of organisation: {0}")]
    NotAMember(String),

    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("client not found: {0}")]
    ClientNotFound(ClientId),

    #[error("a timer is already running: {0}")]
    TimerRunning(String),

    #[error("no timer is running")]
    NoRunningTimer,

    #[error("invalid date range: {0}")]
    InvalidDateRange(String),
}
