use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::NaiveDate;
use serde_json::json;

use crate::escalation::{self, EscalationAction, EscalationStage};
use crate::models::{RecordStatus, StaffReminderGroup, TrainingRecord, UploadResult};

pub fn reminder_run_payload(
    run_date: NaiveDate,
    records_scanned: usize,
    actions: &[EscalationAction],
    groups: &[StaffReminderGroup],
) -> String {
    let mut by_stage: BTreeMap<&'static str, usize> = BTreeMap::new();
    for action in actions {
        *by_stage.entry(action.stage.key()).or_insert(0) += 1;
    }

    json!({
        "run_date": run_date.to_string(),
        "records_scanned": records_scanned,
        "reminders_fired": actions.len(),
        "by_stage": by_stage,
        "staff": groups,
    })
    .to_string()
}

pub fn upload_errors_payload(result: &UploadResult) -> String {
    json!({
        "total_rows": result.processing_details.total_rows,
        "skipped_rows": result.skipped_rows,
        "errors": result.errors,
    })
    .to_string()
}

pub fn upload_summary_payload(result: &UploadResult) -> String {
    json!(result).to_string()
}

pub fn build_compliance_report(
    records: &[TrainingRecord],
    today: NaiveDate,
    site: Option<&str>,
) -> String {
    let scoped: Vec<TrainingRecord> = match site {
        Some(site) => records
            .iter()
            .filter(|record| record.location == site)
            .cloned()
            .collect(),
        None => records.to_vec(),
    };

    let actions = escalation::plan_escalations(&scoped, today);
    let groups = escalation::group_reminders_by_staff(&actions);

    let mut output = String::new();
    let site_label = site.unwrap_or("all sites");

    let _ = writeln!(output, "# Training Compliance Report");
    let _ = writeln!(output, "Generated {} for {}", today, site_label);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Overview");

    if scoped.is_empty() {
        let _ = writeln!(output, "No training records on file.");
    } else {
        let mut active = 0usize;
        let mut expired = 0usize;
        let mut completed = 0usize;
        for record in &scoped {
            match record.status {
                RecordStatus::Active => active += 1,
                RecordStatus::Expired => expired += 1,
                RecordStatus::Completed => completed += 1,
            }
        }
        let _ = writeln!(output, "- active: {}", active);
        let _ = writeln!(output, "- expired: {}", expired);
        let _ = writeln!(output, "- completed: {}", completed);
        let _ = writeln!(output, "Total records: {}", scoped.len());
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Action Required");

    if actions.is_empty() {
        let _ = writeln!(output, "No reminders due today.");
    } else {
        for stage in EscalationStage::ALL {
            let due: Vec<&EscalationAction> = actions
                .iter()
                .filter(|action| action.stage == stage)
                .collect();
            if due.is_empty() {
                continue;
            }
            let _ = writeln!(output);
            let _ = writeln!(output, "### {}", stage.key());
            for action in due {
                let expiry = action
                    .record
                    .expiry_date
                    .map(|date| date.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                let _ = writeln!(
                    output,
                    "- {} / {}: expiry {}",
                    action.record.staff_name, action.record.course_title, expiry
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Staff With Multiple Courses Due");

    let mut any_repeat = false;
    for group in groups.iter().filter(|group| group.courses.len() > 1) {
        any_repeat = true;
        let _ = writeln!(
            output,
            "- {}: {} courses need attention ({})",
            group.staff_name,
            group.courses.len(),
            group.courses.join(", ")
        );
    }
    if !any_repeat {
        let _ = writeln!(output, "No staff member has more than one course due.");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Supervision Follow-ups");

    let mut any_concern = false;
    for record in &scoped {
        if record.concerns.is_empty() && record.action_points.is_empty() {
            continue;
        }
        any_concern = true;
        let mut line = format!("- {} / {}", record.staff_name, record.course_title);
        if !record.concerns.is_empty() {
            let _ = write!(line, ": {}", record.concerns);
        }
        if !record.action_points.is_empty() {
            let _ = write!(line, " (actions: {})", record.action_points);
        }
        if !record.discussed_in_supervision {
            line.push_str(" [not yet discussed in supervision]");
        }
        let _ = writeln!(output, "{}", line);
    }
    if !any_concern {
        let _ = writeln!(output, "No open concerns recorded.");
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use crate::models::{ProcessingDetails, RowError};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(
        staff_name: &str,
        course_title: &str,
        status: RecordStatus,
        expiry: NaiveDate,
        reminders_sent: i32,
        location: &str,
    ) -> TrainingRecord {
        TrainingRecord {
            id: Uuid::new_v4(),
            staff_id: format!("user_{}", staff_name.to_lowercase().replace(' ', "")),
            staff_name: staff_name.to_string(),
            staff_email: None,
            course_title: course_title.to_string(),
            expiry_date: Some(expiry),
            completion_date: None,
            status,
            reminders_sent,
            last_reminder_date: None,
            location: location.to_string(),
            category: "Mandatory".to_string(),
            discussed_in_supervision: false,
            concerns: String::new(),
            action_points: String::new(),
        }
    }

    fn upload_result() -> UploadResult {
        UploadResult {
            success: true,
            updated_records: 1,
            new_records: 0,
            skipped_rows: 1,
            errors: vec![RowError {
                row: 3,
                column: "Course Title".to_string(),
                value: String::new(),
                issue: "Course Title is required".to_string(),
                suggestion: "Fill in Course Title and upload the row again".to_string(),
            }],
            processing_details: ProcessingDetails {
                total_rows: 2,
                success_rate: "50.00".to_string(),
                processed_at: Utc::now(),
                uploaded_by: "Admin".to_string(),
            },
        }
    }

    #[test]
    fn reminder_payload_counts_reminders_by_stage() {
        let today = date(2026, 3, 1);
        let records = vec![
            record(
                "Grace Whitfield",
                "Manual Handling",
                RecordStatus::Active,
                today + Duration::days(21),
                0,
                "Willow House",
            ),
            record(
                "Priya Patel",
                "First Aid",
                RecordStatus::Expired,
                today - Duration::days(10),
                4,
                "Willow House",
            ),
        ];
        let actions = escalation::plan_escalations(&records, today);
        let groups = escalation::group_reminders_by_staff(&actions);

        let payload = reminder_run_payload(today, records.len(), &actions, &groups);
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(value["run_date"], "2026-03-01");
        assert_eq!(value["records_scanned"], 2);
        assert_eq!(value["reminders_fired"], 2);
        assert_eq!(value["by_stage"]["initial"], 1);
        assert_eq!(value["by_stage"]["final"], 1);
        assert_eq!(value["staff"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn upload_payloads_carry_tallies_and_row_errors() {
        let result = upload_result();

        let errors: serde_json::Value =
            serde_json::from_str(&upload_errors_payload(&result)).unwrap();
        assert_eq!(errors["total_rows"], 2);
        assert_eq!(errors["errors"][0]["row"], 3);
        assert_eq!(errors["errors"][0]["column"], "Course Title");

        let summary: serde_json::Value =
            serde_json::from_str(&upload_summary_payload(&result)).unwrap();
        assert_eq!(summary["success"], true);
        assert_eq!(summary["processing_details"]["success_rate"], "50.00");
    }

    #[test]
    fn compliance_report_counts_statuses_and_lists_due_courses() {
        let today = date(2026, 3, 1);
        let records = vec![
            record(
                "Grace Whitfield",
                "Manual Handling",
                RecordStatus::Active,
                today + Duration::days(21),
                0,
                "Willow House",
            ),
            record(
                "Priya Patel",
                "First Aid",
                RecordStatus::Expired,
                today - Duration::days(10),
                4,
                "Willow House",
            ),
            record(
                "Tomasz Kowalski",
                "Food Hygiene",
                RecordStatus::Completed,
                today + Duration::days(300),
                0,
                "Oak Lodge",
            ),
        ];

        let output = build_compliance_report(&records, today, None);

        assert!(output.contains("Generated 2026-03-01 for all sites"));
        assert!(output.contains("- active: 1"));
        assert!(output.contains("- expired: 1"));
        assert!(output.contains("- completed: 1"));
        assert!(output.contains("Total records: 3"));
        assert!(output.contains("### initial"));
        assert!(output.contains("- Grace Whitfield / Manual Handling: expiry 2026-03-22"));
        assert!(output.contains("### final"));
    }

    #[test]
    fn action_section_groups_courses_by_stage() {
        let today = date(2026, 3, 1);
        let records = vec![
            record(
                "Priya Patel",
                "First Aid",
                RecordStatus::Expired,
                today - Duration::days(10),
                4,
                "Willow House",
            ),
            record(
                "Grace Whitfield",
                "Manual Handling",
                RecordStatus::Active,
                today + Duration::days(21),
                0,
                "Willow House",
            ),
            record(
                "Grace Whitfield",
                "Fire Safety",
                RecordStatus::Active,
                today + Duration::days(25),
                0,
                "Willow House",
            ),
        ];

        let output = build_compliance_report(&records, today, None);

        let initial_at = output.find("### initial").unwrap();
        let final_at = output.find("### final").unwrap();
        assert!(initial_at < final_at);

        let initial_section = &output[initial_at..final_at];
        assert!(initial_section.contains("Manual Handling"));
        assert!(initial_section.contains("Fire Safety"));
        assert!(!initial_section.contains("First Aid"));
        assert!(output[final_at..].contains("First Aid"));
    }

    #[test]
    fn open_concerns_surface_in_the_report() {
        let today = date(2026, 3, 1);
        let mut flagged = record(
            "Priya Patel",
            "Medication Management",
            RecordStatus::Active,
            today + Duration::days(60),
            0,
            "Willow House",
        );
        flagged.concerns = "Two missed competency sign-offs".to_string();
        flagged.action_points = "Book assessor session".to_string();
        let clear = record(
            "Grace Whitfield",
            "Fire Safety",
            RecordStatus::Active,
            today + Duration::days(120),
            0,
            "Willow House",
        );

        let output = build_compliance_report(&[flagged, clear], today, None);

        assert!(output.contains("## Supervision Follow-ups"));
        assert!(output.contains(
            "- Priya Patel / Medication Management: Two missed competency sign-offs \
             (actions: Book assessor session) [not yet discussed in supervision]"
        ));
        assert!(!output.contains("Grace Whitfield"));
    }

    #[test]
    fn compliance_report_scopes_to_one_site() {
        let today = date(2026, 3, 1);
        let records = vec![
            record(
                "Grace Whitfield",
                "Manual Handling",
                RecordStatus::Active,
                today + Duration::days(21),
                0,
                "Willow House",
            ),
            record(
                "Tomasz Kowalski",
                "Safeguarding Adults",
                RecordStatus::Active,
                today + Duration::days(5),
                2,
                "Oak Lodge",
            ),
        ];

        let output = build_compliance_report(&records, today, Some("Oak Lodge"));

        assert!(output.contains("for Oak Lodge"));
        assert!(output.contains("Tomasz Kowalski"));
        assert!(!output.contains("Grace Whitfield"));
        assert!(output.contains("Total records: 1"));
    }

    #[test]
    fn staff_with_several_due_courses_are_called_out() {
        let today = date(2026, 3, 1);
        let records = vec![
            record(
                "Grace Whitfield",
                "Manual Handling",
                RecordStatus::Active,
                today + Duration::days(21),
                0,
                "Willow House",
            ),
            record(
                "Grace Whitfield",
                "Fire Safety",
                RecordStatus::Active,
                today + Duration::days(10),
                1,
                "Willow House",
            ),
        ];

        let output = build_compliance_report(&records, today, None);

        assert!(output.contains("- Grace Whitfield: 2 courses need attention"));
        assert!(output.contains("Fire Safety"));
    }

    #[test]
    fn empty_report_keeps_placeholder_lines() {
        let output = build_compliance_report(&[], date(2026, 3, 1), None);

        assert!(output.contains("No training records on file."));
        assert!(output.contains("No reminders due today."));
        assert!(output.contains("No staff member has more than one course due."));
        assert!(output.contains("No open concerns recorded."));
    }
}
