use std::path::Path;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::dates;
use crate::db;
use crate::models::{
    NotificationEntry, Priority, ProcessingDetails, ProfileUpsert, RecordStatus, RecordUpdate,
    RowError, StaffDefaults, TrainingRecord, UploadMutation, UploadResult, UploadRow,
};
use crate::report;

const COLUMN_STAFF_NAME: &str = "Staff Name";
const COLUMN_COURSE_TITLE: &str = "Course Title";
const COLUMN_COMPLETION_DATE: &str = "Completion Date";
const COLUMN_EXPIRY_DATE: &str = "Expiry Date";
const COLUMN_STATUS: &str = "Status";
const ADMIN_RECIPIENT: &str = "admin";

// Data rows are numbered as they appear in the upload file: row 1 is the
// header, so the first data row reports as row 2.
const HEADER_OFFSET: usize = 2;

pub fn read_rows(path: &Path) -> anyhow::Result<Vec<UploadRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open upload file {}", path.display()))?;

    let mut rows = Vec::new();
    for result in reader.deserialize::<UploadRow>() {
        rows.push(result.context("failed to decode upload row")?);
    }
    Ok(rows)
}

/// Reconcile candidate rows against the store. Every row is handled
/// independently; only the final commit can fail the operation as a whole,
/// and even then the per-row tallies are returned as computed.
pub async fn process_bulk_upload(
    pool: &PgPool,
    rows: &[UploadRow],
    uploaded_by: &str,
    defaults: &StaffDefaults,
) -> UploadResult {
    let mut errors = Vec::new();
    let mut mutations = Vec::new();
    let (mut updated, mut new, mut skipped) = (0usize, 0usize, 0usize);

    for (index, row) in rows.iter().enumerate() {
        let row_number = index + HEADER_OFFSET;

        let valid = match validate_row(row, row_number) {
            Ok(valid) => valid,
            Err(row_error) => {
                skipped += 1;
                errors.push(row_error);
                continue;
            }
        };

        let existing =
            match db::find_training_record(pool, &valid.staff_name, &valid.course_title).await {
                Ok(existing) => existing,
                Err(lookup_error) => {
                    warn!(row = row_number, error = %lookup_error, "row lookup failed");
                    skipped += 1;
                    errors.push(processing_error(row_number));
                    continue;
                }
            };

        match plan_merge(valid, row_number, existing.as_ref(), defaults) {
            RowPlan::Skip(row_error) => {
                skipped += 1;
                errors.push(row_error);
            }
            RowPlan::Update(update) => {
                updated += 1;
                mutations.push(UploadMutation::Update(update));
            }
            RowPlan::Create { profile, record } => {
                new += 1;
                mutations.push(UploadMutation::Create { profile, record });
            }
        }
    }

    let success = match db::apply_upload_mutations(pool, &mutations).await {
        Ok(()) => true,
        Err(commit_error) => {
            error!(error = %commit_error, "upload commit failed; store state unchanged");
            false
        }
    };

    let result = build_result(success, updated, new, skipped, errors, rows.len(), uploaded_by);

    info!(
        updated = result.updated_records,
        new = result.new_records,
        skipped = result.skipped_rows,
        success = result.success,
        "bulk upload processed"
    );

    if success {
        persist_upload_outcome(pool, &result, uploaded_by).await;
    }

    result
}

#[derive(Debug, Clone)]
struct ValidRow {
    staff_id: Option<String>,
    staff_name: String,
    staff_email: Option<String>,
    course_title: String,
    completion_date: Option<NaiveDate>,
    expiry_date: Option<NaiveDate>,
    status: Option<RecordStatus>,
    location: Option<String>,
    category: Option<String>,
}

#[derive(Debug)]
enum RowPlan {
    Skip(RowError),
    Update(RecordUpdate),
    Create {
        profile: ProfileUpsert,
        record: TrainingRecord,
    },
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

fn validate_row(row: &UploadRow, row_number: usize) -> Result<ValidRow, RowError> {
    let Some(staff_name) = clean(&row.staff_name) else {
        return Err(missing_field(row_number, COLUMN_STAFF_NAME));
    };
    let Some(course_title) = clean(&row.course_title) else {
        return Err(missing_field(row_number, COLUMN_COURSE_TITLE));
    };
    let completion_date =
        parse_optional_date(&row.completion_date, row_number, COLUMN_COMPLETION_DATE)?;
    let expiry_date = parse_optional_date(&row.expiry_date, row_number, COLUMN_EXPIRY_DATE)?;

    // A status typo must not slip through as `active` and overwrite the
    // stored value on the update path.
    let status = match clean(&row.status) {
        Some(value) => match RecordStatus::parse(&value.to_lowercase()) {
            Some(status) => Some(status),
            None => {
                return Err(RowError {
                    row: row_number,
                    column: COLUMN_STATUS.to_string(),
                    value,
                    issue: "Unrecognised status".to_string(),
                    suggestion: "Use active, expired or completed".to_string(),
                })
            }
        },
        None => None,
    };

    Ok(ValidRow {
        staff_id: clean(&row.staff_id),
        staff_name,
        staff_email: clean(&row.staff_email),
        course_title,
        completion_date,
        expiry_date,
        status,
        location: clean(&row.location),
        category: clean(&row.category),
    })
}

fn plan_merge(
    valid: ValidRow,
    row_number: usize,
    existing: Option<&TrainingRecord>,
    defaults: &StaffDefaults,
) -> RowPlan {
    match existing {
        Some(record) => plan_update(valid, row_number, record),
        None => plan_create(valid, defaults),
    }
}

fn plan_update(valid: ValidRow, row_number: usize, existing: &TrainingRecord) -> RowPlan {
    let Some(incoming) = valid.completion_date else {
        return RowPlan::Skip(not_newer(row_number, "", existing));
    };

    let supersedes = match existing.completion_date {
        None => true,
        Some(stored) => incoming > stored,
    };
    if !supersedes {
        return RowPlan::Skip(not_newer(row_number, &incoming.to_string(), existing));
    }

    RowPlan::Update(RecordUpdate {
        record_id: existing.id,
        completion_date: incoming,
        expiry_date: valid.expiry_date,
        staff_id: valid.staff_id,
        staff_email: valid.staff_email,
        status: valid.status,
        location: valid.location,
        category: valid.category,
    })
}

fn plan_create(valid: ValidRow, defaults: &StaffDefaults) -> RowPlan {
    let staff_id = valid
        .staff_id
        .clone()
        .unwrap_or_else(|| synthesize_staff_id(&valid.staff_name));

    let profile = ProfileUpsert {
        user_id: staff_id.clone(),
        name: valid.staff_name.clone(),
        email: valid.staff_email.clone().or_else(|| defaults.email.clone()),
        phone_number: defaults.phone_number.clone(),
        site: defaults.site.clone(),
        skills: defaults.skills.clone(),
        contracted_hours: defaults.contracted_hours,
        annual_leave: defaults.annual_leave,
        sickness: defaults.sickness,
    };

    let record = TrainingRecord {
        id: Uuid::new_v4(),
        staff_id,
        staff_name: valid.staff_name,
        staff_email: valid.staff_email,
        course_title: valid.course_title,
        expiry_date: valid.expiry_date,
        completion_date: valid.completion_date,
        status: valid.status.unwrap_or(RecordStatus::Active),
        reminders_sent: 0,
        last_reminder_date: None,
        location: valid.location.unwrap_or_default(),
        category: valid.category.unwrap_or_default(),
        discussed_in_supervision: false,
        concerns: String::new(),
        action_points: String::new(),
    };

    RowPlan::Create { profile, record }
}

/// Deterministic fallback id for staff uploaded without one: lowercased name
/// with everything outside ASCII letters and digits stripped. Two distinct
/// people normalizing to the same id collide; last writer wins.
pub fn synthesize_staff_id(staff_name: &str) -> String {
    let normalized: String = staff_name
        .to_lowercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    format!("user_{normalized}")
}

pub fn success_rate(updated: usize, new: usize, total: usize) -> String {
    if total == 0 {
        return "0.00".to_string();
    }
    let rate = (updated + new) as f64 / total as f64 * 100.0;
    format!("{rate:.2}")
}

fn build_result(
    success: bool,
    updated: usize,
    new: usize,
    skipped: usize,
    errors: Vec<RowError>,
    total: usize,
    uploaded_by: &str,
) -> UploadResult {
    UploadResult {
        success,
        updated_records: updated,
        new_records: new,
        skipped_rows: skipped,
        errors,
        processing_details: ProcessingDetails {
            total_rows: total,
            success_rate: success_rate(updated, new, total),
            processed_at: Utc::now(),
            uploaded_by: uploaded_by.to_string(),
        },
    }
}

fn missing_field(row_number: usize, column: &str) -> RowError {
    RowError {
        row: row_number,
        column: column.to_string(),
        value: String::new(),
        issue: format!("{column} is required"),
        suggestion: format!("Fill in {column} and upload the row again"),
    }
}

fn not_newer(row_number: usize, value: &str, existing: &TrainingRecord) -> RowError {
    RowError {
        row: row_number,
        column: COLUMN_COMPLETION_DATE.to_string(),
        value: value.to_string(),
        issue: "Completion date is not newer than the existing record; no update needed"
            .to_string(),
        suggestion: format!(
            "The stored record for {} / {} is already up to date",
            existing.staff_name, existing.course_title
        ),
    }
}

fn processing_error(row_number: usize) -> RowError {
    RowError {
        row: row_number,
        column: "General".to_string(),
        value: String::new(),
        issue: "Unexpected error while processing this row".to_string(),
        suggestion: "Check the row data and try again".to_string(),
    }
}

fn parse_optional_date(
    raw: &Option<String>,
    row_number: usize,
    column: &str,
) -> Result<Option<NaiveDate>, RowError> {
    let Some(value) = clean(raw) else {
        return Ok(None);
    };
    match dates::parse_date(&value) {
        Some(date) => Ok(Some(date)),
        None => Err(RowError {
            row: row_number,
            column: column.to_string(),
            value,
            issue: "Unrecognised date format".to_string(),
            suggestion: "Use YYYY-MM-DD or DD/MM/YYYY".to_string(),
        }),
    }
}

async fn persist_upload_outcome(pool: &PgPool, result: &UploadResult, uploaded_by: &str) {
    if !result.errors.is_empty() {
        let payload = report::upload_errors_payload(result);
        if let Err(persist_error) = db::insert_report(
            pool,
            "upload_errors",
            "Bulk upload row errors",
            &payload,
            uploaded_by,
        )
        .await
        {
            warn!(error = %persist_error, "failed to persist upload error report");
        }
    }

    let payload = report::upload_summary_payload(result);
    if let Err(persist_error) = db::insert_report(
        pool,
        "upload_summary",
        "Bulk upload summary",
        &payload,
        uploaded_by,
    )
    .await
    {
        warn!(error = %persist_error, "failed to persist upload summary report");
    }

    let entry = admin_summary_notification(result);
    if let Err(persist_error) = db::insert_notification(pool, &entry).await {
        warn!(error = %persist_error, "failed to persist upload notification");
    }
}

fn admin_summary_notification(result: &UploadResult) -> NotificationEntry {
    let priority = if result.errors.is_empty() {
        Priority::Medium
    } else {
        Priority::High
    };
    NotificationEntry {
        id: Uuid::new_v4(),
        recipient_id: ADMIN_RECIPIENT.to_string(),
        title: "Bulk training upload processed".to_string(),
        message: format!(
            "{} new, {} updated, {} skipped of {} rows ({}% success). Uploaded by {}.",
            result.new_records,
            result.updated_records,
            result.skipped_rows,
            result.processing_details.total_rows,
            result.processing_details.success_rate,
            result.processing_details.uploaded_by
        ),
        priority,
    }
}
