//! Maintenance-alert schedule for inventory boxes.
//!
//! Every box carries exactly one alert per milestone age (15, 30 and 60 days
//! since creation). The schedule is a pure function of the creation instant
//! and is computed once, when the box row is inserted; it is stored as a JSONB
//! object with three named slots so a milestone can never be added, removed or
//! duplicated.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MILESTONE_DAYS: [i64; 3] = [15, 30, 60];

/// Surface the reminder this many days before the milestone.
const NOTIFY_LEAD_DAYS: i64 = 2;
/// A snooze pushes the reminder this far past the time of the call.
const SNOOZE_DAYS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Pending,
    Completed,
    Remind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertAction {
    Completed,
    Remind,
}

impl AlertAction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "completed" => Some(AlertAction::Completed),
            "remind" => Some(AlertAction::Remind),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlertError {
    #[error("No maintenance alert for {0} days")]
    UnknownMilestone(i64),
    #[error("Alert for {0} days is already completed")]
    AlreadyCompleted(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceAlert {
    pub days: i64,
    pub status: AlertStatus,
    pub notify_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl MaintenanceAlert {
    fn at_milestone(created_at: DateTime<Utc>, days: i64) -> Self {
        MaintenanceAlert {
            days,
            status: AlertStatus::Pending,
            notify_date: created_at + Duration::days(days) - Duration::days(NOTIFY_LEAD_DAYS),
            completed_at: None,
        }
    }
}

/// Fixed three-slot schedule, one slot per milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceSchedule {
    pub day15: MaintenanceAlert,
    pub day30: MaintenanceAlert,
    pub day60: MaintenanceAlert,
}

impl MaintenanceSchedule {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        MaintenanceSchedule {
            day15: MaintenanceAlert::at_milestone(created_at, 15),
            day30: MaintenanceAlert::at_milestone(created_at, 30),
            day60: MaintenanceAlert::at_milestone(created_at, 60),
        }
    }

    fn slots(&self) -> [&MaintenanceAlert; 3] {
        [&self.day15, &self.day30, &self.day60]
    }

    fn slot_mut(&mut self, days: i64) -> Option<&mut MaintenanceAlert> {
        match days {
            15 => Some(&mut self.day15),
            30 => Some(&mut self.day30),
            60 => Some(&mut self.day60),
            _ => None,
        }
    }

    /// Apply a user action to one milestone.
    ///
    /// Completion is terminal: any further action on a completed milestone is
    /// rejected. A snooze is repeatable and only depends on `now` at call
    /// time, never on the previous notify date.
    pub fn apply(&mut self, days: i64, action: AlertAction, now: DateTime<Utc>) -> Result<(), AlertError> {
        let alert = self.slot_mut(days).ok_or(AlertError::UnknownMilestone(days))?;
        if alert.status == AlertStatus::Completed {
            return Err(AlertError::AlreadyCompleted(days));
        }
        match action {
            AlertAction::Completed => {
                alert.status = AlertStatus::Completed;
                alert.completed_at = Some(now);
            }
            AlertAction::Remind => {
                alert.status = AlertStatus::Remind;
                alert.notify_date = now + Duration::days(SNOOZE_DAYS);
            }
        }
        Ok(())
    }

    /// The alert to surface right now, if any: not completed, notify date
    /// reached, earliest milestone first when several qualify.
    pub fn due_alert(&self, now: DateTime<Utc>) -> Option<&MaintenanceAlert> {
        self.slots()
            .into_iter()
            .find(|a| a.status != AlertStatus::Completed && a.notify_date <= now)
    }
}
