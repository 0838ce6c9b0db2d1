use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::escalation::MAX_REMINDERS;
use crate::models::{
    EscalationUpdate, ManagementTask, NotificationEntry, RecordStatus, TrainingRecord,
    UploadMutation, UserProfile,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let today = Utc::now().date_naive();

    let profiles = vec![
        (
            "user_gracewhitfield",
            "Grace Whitfield",
            "grace.whitfield@willowhouse.example.com",
            "+447700900101",
            "Willow House",
            true,
            true,
        ),
        (
            "user_tomaszkowalski",
            "Tomasz Kowalski",
            "tomasz.kowalski@oaklodge.example.com",
            "+447700900102",
            "Oak Lodge",
            true,
            false,
        ),
        (
            "user_priyapatel",
            "Priya Patel",
            "priya.patel@willowhouse.example.com",
            "+447700900103",
            "Willow House",
            true,
            true,
        ),
    ];

    for (user_id, name, email, phone_number, site, notify_email, notify_sms) in profiles {
        sqlx::query(
            r#"
            INSERT INTO carehome_compliance.users
            (user_id, name, email, phone_number, site, notify_email, notify_sms)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE
            SET name = EXCLUDED.name,
                email = EXCLUDED.email,
                phone_number = EXCLUDED.phone_number,
                site = EXCLUDED.site,
                notify_email = EXCLUDED.notify_email,
                notify_sms = EXCLUDED.notify_sms,
                updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(email)
        .bind(phone_number)
        .bind(site)
        .bind(notify_email)
        .bind(notify_sms)
        .execute(pool)
        .await?;
    }

    // Expiry offsets are relative to the seed date so every escalation stage
    // stays reachable no matter when the demo data is loaded.
    let records = vec![
        (
            "7d9a1c52-6f1e-4c87-9b7e-0a8c1a2b3c4d",
            "user_gracewhitfield",
            "Grace Whitfield",
            "Fire Safety",
            120i64,
            None,
            "active",
            0,
            "Willow House",
            "Mandatory",
        ),
        (
            "4f6b2e91-3a5d-4f0c-8e2a-1b2c3d4e5f6a",
            "user_gracewhitfield",
            "Grace Whitfield",
            "Manual Handling",
            21,
            None,
            "active",
            0,
            "Willow House",
            "Mandatory",
        ),
        (
            "9c0d8e7f-5a4b-4c3d-9e8f-2a3b4c5d6e7f",
            "user_tomaszkowalski",
            "Tomasz Kowalski",
            "Safeguarding Adults",
            5,
            None,
            "active",
            2,
            "Oak Lodge",
            "Mandatory",
        ),
        (
            "1a2b3c4d-5e6f-4a89-b0c1-d2e3f4a5b6c7",
            "user_priyapatel",
            "Priya Patel",
            "First Aid",
            -10,
            None,
            "expired",
            4,
            "Willow House",
            "Clinical",
        ),
        (
            "6e5d4c3b-2a19-4e87-a6b5-c4d3e2f1a0b9",
            "user_tomaszkowalski",
            "Tomasz Kowalski",
            "Food Hygiene",
            335,
            Some(-30i64),
            "completed",
            0,
            "Oak Lodge",
            "Mandatory",
        ),
    ];

    for (
        id,
        staff_id,
        staff_name,
        course_title,
        expiry_days,
        completion_days,
        status,
        reminders_sent,
        location,
        category,
    ) in records
    {
        let expiry_date = today + Duration::days(expiry_days);
        let completion_date = completion_days.map(|days| today + Duration::days(days));

        sqlx::query(
            r#"
            INSERT INTO carehome_compliance.training_records
            (id, staff_id, staff_name, course_title, expiry_date, completion_date,
             status, reminders_sent, location, category)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE
            SET expiry_date = EXCLUDED.expiry_date,
                completion_date = EXCLUDED.completion_date,
                status = EXCLUDED.status,
                reminders_sent = EXCLUDED.reminders_sent,
                last_reminder_date = NULL,
                updated_at = now()
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(staff_id)
        .bind(staff_name)
        .bind(course_title)
        .bind(expiry_date)
        .bind(completion_date)
        .bind(status)
        .bind(reminders_sent)
        .bind(location)
        .bind(category)
        .execute(pool)
        .await?;
    }

    Ok(())
}

fn record_from_row(row: &PgRow) -> TrainingRecord {
    let status: String = row.get("status");
    TrainingRecord {
        id: row.get("id"),
        staff_id: row.get("staff_id"),
        staff_name: row.get("staff_name"),
        staff_email: row.get("staff_email"),
        course_title: row.get("course_title"),
        expiry_date: row.get("expiry_date"),
        completion_date: row.get("completion_date"),
        status: RecordStatus::parse_or_active(&status),
        reminders_sent: row.get("reminders_sent"),
        last_reminder_date: row.get("last_reminder_date"),
        location: row.get("location"),
        category: row.get("category"),
        discussed_in_supervision: row.get("discussed_in_supervision"),
        concerns: row.get("concerns"),
        action_points: row.get("action_points"),
    }
}

pub async fn fetch_scannable_records(
    pool: &PgPool,
    window_end: NaiveDate,
) -> anyhow::Result<Vec<TrainingRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, staff_id, staff_name, staff_email, course_title, expiry_date,
               completion_date, status, reminders_sent, last_reminder_date,
               location, category, discussed_in_supervision, concerns, action_points
        FROM carehome_compliance.training_records
        WHERE status <> 'completed'
          AND reminders_sent < $2
          AND expiry_date IS NOT NULL
          AND expiry_date <= $1
        ORDER BY expiry_date, staff_name
        "#,
    )
    .bind(window_end)
    .bind(MAX_REMINDERS)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(record_from_row).collect())
}

pub async fn fetch_expiring_records(
    pool: &PgPool,
    window_end: NaiveDate,
    limit: i64,
) -> anyhow::Result<Vec<TrainingRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, staff_id, staff_name, staff_email, course_title, expiry_date,
               completion_date, status, reminders_sent, last_reminder_date,
               location, category, discussed_in_supervision, concerns, action_points
        FROM carehome_compliance.training_records
        WHERE status <> 'completed'
          AND expiry_date IS NOT NULL
          AND expiry_date <= $1
        ORDER BY expiry_date, staff_name
        LIMIT $2
        "#,
    )
    .bind(window_end)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(record_from_row).collect())
}

pub async fn fetch_all_records(pool: &PgPool) -> anyhow::Result<Vec<TrainingRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, staff_id, staff_name, staff_email, course_title, expiry_date,
               completion_date, status, reminders_sent, last_reminder_date,
               location, category, discussed_in_supervision, concerns, action_points
        FROM carehome_compliance.training_records
        ORDER BY staff_name, course_title
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(record_from_row).collect())
}

pub async fn find_training_record(
    pool: &PgPool,
    staff_name: &str,
    course_title: &str,
) -> anyhow::Result<Option<TrainingRecord>> {
    let row = sqlx::query(
        r#"
        SELECT id, staff_id, staff_name, staff_email, course_title, expiry_date,
               completion_date, status, reminders_sent, last_reminder_date,
               location, category, discussed_in_supervision, concerns, action_points
        FROM carehome_compliance.training_records
        WHERE staff_name = $1 AND course_title = $2
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(staff_name)
    .bind(course_title)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(record_from_row))
}

pub async fn fetch_user_profile(
    pool: &PgPool,
    user_id: &str,
) -> anyhow::Result<Option<UserProfile>> {
    let row = sqlx::query(
        r#"
        SELECT email, phone_number, notify_email, notify_sms
        FROM carehome_compliance.users
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| UserProfile {
        email: row.get("email"),
        phone_number: row.get("phone_number"),
        notify_email: row.get("notify_email"),
        notify_sms: row.get("notify_sms"),
    }))
}

pub async fn apply_escalations(
    pool: &PgPool,
    updates: &[EscalationUpdate],
    stamped_at: DateTime<Utc>,
) -> anyhow::Result<()> {
    if updates.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    for update in updates {
        sqlx::query(
            r#"
            UPDATE carehome_compliance.training_records
            SET reminders_sent = $2,
                status = $3,
                last_reminder_date = $4,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(update.record_id)
        .bind(update.reminders_sent)
        .bind(update.status.as_str())
        .bind(stamped_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await.context("failed to commit transaction")?;
    Ok(())
}

/// All upload writes land in one transaction: either the whole batch applies
/// or the store is left untouched.
pub async fn apply_upload_mutations(
    pool: &PgPool,
    mutations: &[UploadMutation],
) -> anyhow::Result<()> {
    if mutations.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    for mutation in mutations {
        match mutation {
            UploadMutation::Update(update) => {
                sqlx::query(
                    r#"
                    UPDATE carehome_compliance.training_records
                    SET completion_date = $2,
                        expiry_date = COALESCE($3, expiry_date),
                        staff_id = COALESCE($4, staff_id),
                        staff_email = COALESCE($5, staff_email),
                        status = COALESCE($6, status),
                        location = COALESCE($7, location),
                        category = COALESCE($8, category),
                        updated_at = now()
                    WHERE id = $1
                    "#,
                )
                .bind(update.record_id)
                .bind(update.completion_date)
                .bind(update.expiry_date)
                .bind(update.staff_id.as_deref())
                .bind(update.staff_email.as_deref())
                .bind(update.status.map(|status| status.as_str()))
                .bind(update.location.as_deref())
                .bind(update.category.as_deref())
                .execute(&mut *tx)
                .await?;
            }
            UploadMutation::Create { profile, record } => {
                // Profile defaults (notification prefs, performance metrics,
                // onboarding flags) come from the table definition and are
                // never touched when the profile already exists.
                sqlx::query(
                    r#"
                    INSERT INTO carehome_compliance.users
                    (user_id, name, email, phone_number, site, skills,
                     contracted_hours, annual_leave, sickness)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    ON CONFLICT (user_id) DO UPDATE
                    SET name = EXCLUDED.name,
                        email = COALESCE(EXCLUDED.email, users.email),
                        phone_number = COALESCE(EXCLUDED.phone_number, users.phone_number),
                        site = COALESCE(EXCLUDED.site, users.site),
                        skills = CASE WHEN cardinality(EXCLUDED.skills) > 0
                                      THEN EXCLUDED.skills ELSE users.skills END,
                        contracted_hours = COALESCE(EXCLUDED.contracted_hours, users.contracted_hours),
                        annual_leave = COALESCE(EXCLUDED.annual_leave, users.annual_leave),
                        sickness = COALESCE(EXCLUDED.sickness, users.sickness),
                        updated_at = now()
                    "#,
                )
                .bind(&profile.user_id)
                .bind(&profile.name)
                .bind(profile.email.as_deref())
                .bind(profile.phone_number.as_deref())
                .bind(profile.site.as_deref())
                .bind(&profile.skills)
                .bind(profile.contracted_hours)
                .bind(profile.annual_leave)
                .bind(profile.sickness)
                .execute(&mut *tx)
                .await?;

                sqlx::query(
                    r#"
                    INSERT INTO carehome_compliance.training_records
                    (id, staff_id, staff_name, staff_email, course_title, expiry_date,
                     completion_date, status, reminders_sent, location, category)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    "#,
                )
                .bind(record.id)
                .bind(&record.staff_id)
                .bind(&record.staff_name)
                .bind(record.staff_email.as_deref())
                .bind(&record.course_title)
                .bind(record.expiry_date)
                .bind(record.completion_date)
                .bind(record.status.as_str())
                .bind(record.reminders_sent)
                .bind(&record.location)
                .bind(&record.category)
                .execute(&mut *tx)
                .await?;
            }
        }
    }

    tx.commit().await.context("failed to commit transaction")?;
    Ok(())
}

pub async fn insert_management_task(pool: &PgPool, task: &ManagementTask) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO carehome_compliance.management_tasks
        (id, title, description, staff_id, course_title, priority, due_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(task.id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.staff_id.as_deref())
    .bind(task.course_title.as_deref())
    .bind(task.priority.as_str())
    .bind(task.due_date)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn insert_notification(pool: &PgPool, entry: &NotificationEntry) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO carehome_compliance.notifications
        (id, recipient_id, title, message, priority)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(entry.id)
    .bind(&entry.recipient_id)
    .bind(&entry.title)
    .bind(&entry.message)
    .bind(entry.priority.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn insert_report(
    pool: &PgPool,
    report_type: &str,
    title: &str,
    body: &str,
    created_by: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO carehome_compliance.reports
        (id, report_type, title, body, created_by)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(report_type)
    .bind(title)
    .bind(body)
    .bind(created_by)
    .execute(pool)
    .await?;

    Ok(())
}
