use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Active,
    Expired,
    Completed,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Expired => "expired",
            RecordStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(RecordStatus::Active),
            "expired" => Some(RecordStatus::Expired),
            "completed" => Some(RecordStatus::Completed),
            _ => None,
        }
    }

    pub fn parse_or_active(value: &str) -> Self {
        Self::parse(value).unwrap_or(RecordStatus::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainingRecord {
    pub id: Uuid,
    pub staff_id: String,
    pub staff_name: String,
    pub staff_email: Option<String>,
    pub course_title: String,
    pub expiry_date: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
    pub status: RecordStatus,
    pub reminders_sent: i32,
    pub last_reminder_date: Option<DateTime<Utc>>,
    pub location: String,
    pub category: String,
    pub discussed_in_supervision: bool,
    pub concerns: String,
    pub action_points: String,
}

/// The slice of a stored staff profile the delivery workflows consume:
/// contact points and notification preferences.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub notify_email: bool,
    pub notify_sms: bool,
}

/// One candidate row from a bulk upload file. Every field is optional at
/// this stage; validation happens row by row in the reconciler.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadRow {
    #[serde(default)]
    pub staff_id: Option<String>,
    #[serde(default)]
    pub staff_name: Option<String>,
    #[serde(default)]
    pub staff_email: Option<String>,
    #[serde(default)]
    pub course_title: Option<String>,
    #[serde(default)]
    pub completion_date: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Shared defaulting data applied to staff profiles created by an upload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaffDefaults {
    #[serde(default)]
    pub contracted_hours: Option<f64>,
    #[serde(default)]
    pub annual_leave: Option<f64>,
    #[serde(default)]
    pub sickness: Option<f64>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub row: usize,
    pub column: String,
    pub value: String,
    pub issue: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingDetails {
    pub total_rows: usize,
    pub success_rate: String,
    pub processed_at: DateTime<Utc>,
    pub uploaded_by: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub success: bool,
    pub updated_records: usize,
    pub new_records: usize,
    pub skipped_rows: usize,
    pub errors: Vec<RowError>,
    pub processing_details: ProcessingDetails,
}

/// Field overwrites applied to an existing training record when an upload
/// row supersedes it. `None` preserves the stored value.
#[derive(Debug, Clone)]
pub struct RecordUpdate {
    pub record_id: Uuid,
    pub completion_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub staff_id: Option<String>,
    pub staff_email: Option<String>,
    pub status: Option<RecordStatus>,
    pub location: Option<String>,
    pub category: Option<String>,
}

/// Profile fields merged into `users` for staff touched by an upload.
/// Absent values never overwrite stored ones; creation-time defaults
/// (metrics, onboarding flags, notification preferences) come from the
/// table definition.
#[derive(Debug, Clone)]
pub struct ProfileUpsert {
    pub user_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub site: Option<String>,
    pub skills: Vec<String>,
    pub contracted_hours: Option<f64>,
    pub annual_leave: Option<f64>,
    pub sickness: Option<f64>,
}

#[derive(Debug, Clone)]
pub enum UploadMutation {
    Update(RecordUpdate),
    Create {
        profile: ProfileUpsert,
        record: TrainingRecord,
    },
}

/// The per-record mutation accumulated during a scan and committed in one
/// transaction at the end of the invocation.
#[derive(Debug, Clone)]
pub struct EscalationUpdate {
    pub record_id: Uuid,
    pub reminders_sent: i32,
    pub status: RecordStatus,
}

#[derive(Debug, Clone)]
pub struct ManagementTask {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub staff_id: Option<String>,
    pub course_title: Option<String>,
    pub priority: Priority,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct NotificationEntry {
    pub id: Uuid,
    pub recipient_id: String,
    pub title: String,
    pub message: String,
    pub priority: Priority,
}

/// Per-staff grouping of the courses that triggered a reminder in one scan.
#[derive(Debug, Clone, Serialize)]
pub struct StaffReminderGroup {
    pub staff_id: String,
    pub staff_name: String,
    pub courses: Vec<String>,
}
