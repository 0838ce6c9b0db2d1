use chrono::{Duration, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;
use crate::models::{
    EscalationUpdate, ManagementTask, NotificationEntry, Priority, RecordStatus,
    StaffReminderGroup, TrainingRecord,
};
use crate::notify::{plan_dispatch, Delivery};
use crate::report;

pub const SCAN_WINDOW_DAYS: i64 = 30;
pub const MAX_REMINDERS: i32 = 5;
const TASK_DUE_DAYS: i64 = 7;

/// One step of the reminder sequence. Which stage a record is eligible for
/// is driven entirely by its `reminders_sent` counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationStage {
    Initial,
    Followup14,
    Followup7,
    Expired,
    Final,
}

impl EscalationStage {
    /// Ladder order, for displays that walk the stages.
    pub const ALL: [EscalationStage; 5] = [
        EscalationStage::Initial,
        EscalationStage::Followup14,
        EscalationStage::Followup7,
        EscalationStage::Expired,
        EscalationStage::Final,
    ];

    pub fn for_reminder_count(count: i32) -> Option<Self> {
        match count {
            0 => Some(EscalationStage::Initial),
            1 => Some(EscalationStage::Followup14),
            2 => Some(EscalationStage::Followup7),
            3 => Some(EscalationStage::Expired),
            4 => Some(EscalationStage::Final),
            _ => None,
        }
    }

    /// Days before expiry at which this stage fires; the stage fires once
    /// `expiry_date <= today + threshold_days`.
    pub fn threshold_days(self) -> i64 {
        match self {
            EscalationStage::Initial => 30,
            EscalationStage::Followup14 => 14,
            EscalationStage::Followup7 => 7,
            EscalationStage::Expired | EscalationStage::Final => 0,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            EscalationStage::Initial => "initial",
            EscalationStage::Followup14 => "followup14",
            EscalationStage::Followup7 => "followup7",
            EscalationStage::Expired => "expired",
            EscalationStage::Final => "final",
        }
    }

    pub fn resulting_status(self) -> RecordStatus {
        match self {
            EscalationStage::Initial
            | EscalationStage::Followup14
            | EscalationStage::Followup7 => RecordStatus::Active,
            EscalationStage::Expired | EscalationStage::Final => RecordStatus::Expired,
        }
    }

    pub fn priority(self) -> Priority {
        match self {
            EscalationStage::Expired | EscalationStage::Final => Priority::High,
            _ => Priority::Medium,
        }
    }

    pub fn is_final(self) -> bool {
        matches!(self, EscalationStage::Final)
    }
}

#[derive(Debug, Clone)]
pub struct EscalationAction {
    pub record: TrainingRecord,
    pub stage: EscalationStage,
}

#[derive(Debug, Clone)]
pub struct StageContent {
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ScanSummary {
    pub scanned: usize,
    pub fired: usize,
    pub notifications_persisted: usize,
    pub tasks_created: usize,
}

/// Select the records due an escalation today. At most one action per record;
/// a record whose expiry does not satisfy its stage threshold waits for a
/// later cycle.
pub fn plan_escalations(records: &[TrainingRecord], today: NaiveDate) -> Vec<EscalationAction> {
    let mut actions = Vec::new();

    for record in records {
        if record.status == RecordStatus::Completed {
            continue;
        }
        let Some(stage) = EscalationStage::for_reminder_count(record.reminders_sent) else {
            continue;
        };
        let Some(expiry) = record.expiry_date else {
            continue;
        };

        if expiry <= today + Duration::days(stage.threshold_days()) {
            actions.push(EscalationAction {
                record: record.clone(),
                stage,
            });
        }
    }

    actions
}

/// The record mutation a fired stage commits: the counter steps by exactly
/// one and the status follows the stage table.
pub fn escalation_update_for(action: &EscalationAction) -> EscalationUpdate {
    EscalationUpdate {
        record_id: action.record.id,
        reminders_sent: action.record.reminders_sent + 1,
        status: action.stage.resulting_status(),
    }
}

pub fn stage_content(
    stage: EscalationStage,
    course_title: &str,
    expiry_date: NaiveDate,
) -> StageContent {
    let date = expiry_date.format("%d %B %Y");
    let (title, message) = match stage {
        EscalationStage::Initial => (
            "Training expiry reminder".to_string(),
            format!("{course_title} expires on {date}. Please book your renewal."),
        ),
        EscalationStage::Followup14 => (
            "Training expires in two weeks".to_string(),
            format!("{course_title} expires on {date}. Renewal is now due."),
        ),
        EscalationStage::Followup7 => (
            "Training expires this week".to_string(),
            format!("{course_title} expires on {date}. Please arrange renewal urgently."),
        ),
        EscalationStage::Expired => (
            "Training expired".to_string(),
            format!("{course_title} expired on {date}. You are no longer compliant for this course."),
        ),
        EscalationStage::Final => (
            "Final notice: training expired".to_string(),
            format!("{course_title} expired on {date}. This has been escalated to management."),
        ),
    };
    StageContent { title, message }
}

pub fn management_task_for(record: &TrainingRecord, today: NaiveDate) -> ManagementTask {
    let expiry = record
        .expiry_date
        .map(|d| d.format("%d %B %Y").to_string())
        .unwrap_or_else(|| "an unknown date".to_string());
    ManagementTask {
        id: Uuid::new_v4(),
        title: format!("Escalate expired training: {}", record.staff_name),
        description: format!(
            "{} for {} expired on {} and has completed the reminder sequence. \
             Review with the staff member and arrange renewal.",
            record.course_title, record.staff_name, expiry
        ),
        staff_id: Some(record.staff_id.clone()),
        course_title: Some(record.course_title.clone()),
        priority: Priority::High,
        due_date: today + Duration::days(TASK_DUE_DAYS),
    }
}

/// Group the courses that fired this cycle under one entry per staff member.
pub fn group_reminders_by_staff(actions: &[EscalationAction]) -> Vec<StaffReminderGroup> {
    let mut groups: std::collections::HashMap<String, StaffReminderGroup> =
        std::collections::HashMap::new();

    for action in actions {
        let entry = groups
            .entry(action.record.staff_id.clone())
            .or_insert_with(|| StaffReminderGroup {
                staff_id: action.record.staff_id.clone(),
                staff_name: action.record.staff_name.clone(),
                courses: Vec::new(),
            });
        entry.courses.push(action.record.course_title.clone());
    }

    let mut values: Vec<StaffReminderGroup> = groups.into_values().collect();
    values.sort_by(|a, b| a.staff_name.cmp(&b.staff_name));
    values
}

/// Daily scan entry point. Record mutations commit in one transaction after
/// the scan; email/SMS sends and the final-stage management task are
/// independent of that commit, and notification entries plus the run report
/// only persist once the commit succeeds.
pub async fn run_daily_scan(pool: &PgPool, delivery: &Delivery) -> anyhow::Result<ScanSummary> {
    use anyhow::Context;

    let today = Utc::now().date_naive();
    let window_end = today + Duration::days(SCAN_WINDOW_DAYS);
    let records = db::fetch_scannable_records(pool, window_end).await?;
    let actions = plan_escalations(&records, today);

    info!(
        scanned = records.len(),
        due = actions.len(),
        "escalation scan planned"
    );

    let mut updates = Vec::new();
    let mut notifications = Vec::new();
    let mut tasks_created = 0usize;

    for action in &actions {
        let record = &action.record;
        let Some(expiry) = record.expiry_date else {
            continue;
        };
        let content = stage_content(action.stage, &record.course_title, expiry);

        notifications.push(NotificationEntry {
            id: Uuid::new_v4(),
            recipient_id: record.staff_id.clone(),
            title: content.title.clone(),
            message: content.message.clone(),
            priority: action.stage.priority(),
        });

        let profile = match db::fetch_user_profile(pool, &record.staff_id).await {
            Ok(profile) => profile,
            Err(error) => {
                warn!(
                    staff = %record.staff_name,
                    error = %error,
                    "profile lookup failed; skipping deliveries for this record"
                );
                None
            }
        };

        let dispatch = plan_dispatch(profile.as_ref(), record);
        if let Some(to) = dispatch.email_to {
            if let Err(error) = delivery.send_stage_email(&to, action.stage, &content).await {
                warn!(staff = %record.staff_name, error = %error, "reminder email failed");
            }
        }
        if let Some(to) = dispatch.sms_to {
            if let Err(error) = delivery.send_sms(&to, &content).await {
                warn!(staff = %record.staff_name, error = %error, "reminder SMS failed");
            }
        }

        if action.stage.is_final() {
            let task = management_task_for(record, today);
            db::insert_management_task(pool, &task).await?;
            tasks_created += 1;
        }

        updates.push(escalation_update_for(action));
    }

    db::apply_escalations(pool, &updates, Utc::now())
        .await
        .context("failed to commit escalation batch")?;

    let mut notifications_persisted = 0usize;
    for entry in &notifications {
        match db::insert_notification(pool, entry).await {
            Ok(()) => notifications_persisted += 1,
            Err(error) => {
                warn!(recipient = %entry.recipient_id, error = %error, "notification insert failed");
            }
        }
    }

    let groups = group_reminders_by_staff(&actions);
    let payload = report::reminder_run_payload(today, records.len(), &actions, &groups);
    db::insert_report(
        pool,
        "reminder_run",
        &format!("Reminder run {today}"),
        &payload,
        "system",
    )
    .await?;

    Ok(ScanSummary {
        scanned: records.len(),
        fired: actions.len(),
        notifications_persisted,
        tasks_created,
    })
}
