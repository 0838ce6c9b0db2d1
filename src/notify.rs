use anyhow::Context;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::config::{DeliveryConfig, SmsConfig, StageTemplates};
use crate::escalation::{EscalationStage, StageContent};
use crate::models::{TrainingRecord, UserProfile};

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("invalid email address: {0}")]
    InvalidAddress(String),
    #[error("email build failed: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("email send failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("sms send failed: {0}")]
    Sms(#[from] reqwest::Error),
    #[error("sms provider rejected the message (status {0})")]
    SmsRejected(u16),
}

struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

struct SmsChannel {
    client: reqwest::Client,
    config: SmsConfig,
}

/// Email and SMS providers behind one handle. Channels left unconfigured are
/// no-ops; send failures are reported to the caller, which logs and moves on.
pub struct Delivery {
    mailer: Option<Mailer>,
    sms: Option<SmsChannel>,
    templates: StageTemplates,
}

impl Delivery {
    pub fn from_config(config: DeliveryConfig) -> anyhow::Result<Self> {
        let mailer = match config.smtp {
            Some(smtp) => {
                let from: Mailbox = smtp
                    .from
                    .parse()
                    .with_context(|| format!("SMTP_FROM is not a valid address: {}", smtp.from))?;
                let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
                    .context("failed to build SMTP transport")?
                    .port(smtp.port);
                if let (Some(user), Some(password)) = (smtp.user, smtp.password) {
                    builder = builder.credentials(Credentials::new(user, password));
                }
                info!(host = %smtp.host, port = smtp.port, "email channel enabled");
                Some(Mailer {
                    transport: builder.build(),
                    from,
                })
            }
            None => None,
        };

        let sms = config.sms.map(|sms_config| {
            info!(provider = %sms_config.api_url, "sms channel enabled");
            SmsChannel {
                client: reqwest::Client::new(),
                config: sms_config,
            }
        });

        Ok(Self {
            mailer,
            sms,
            templates: config.templates,
        })
    }

    pub async fn send_stage_email(
        &self,
        to: &str,
        stage: EscalationStage,
        content: &StageContent,
    ) -> Result<(), DeliveryError> {
        let Some(mailer) = &self.mailer else {
            debug!("email channel disabled; skipping send");
            return Ok(());
        };

        let template_id = self.templates.id_for(stage);
        let to_addr: Mailbox = to
            .parse()
            .map_err(|_| DeliveryError::InvalidAddress(to.to_string()))?;
        let email = Message::builder()
            .from(mailer.from.clone())
            .to(to_addr)
            .subject(&content.title)
            .header(ContentType::TEXT_PLAIN)
            .body(email_body(template_id, content))?;

        mailer.transport.send(email).await?;
        info!(template = %template_id, stage = stage.key(), "reminder email sent");
        Ok(())
    }

    pub async fn send_sms(&self, to: &str, content: &StageContent) -> Result<(), DeliveryError> {
        let Some(sms) = &self.sms else {
            debug!("sms channel disabled; skipping send");
            return Ok(());
        };

        let payload = serde_json::json!({
            "from": sms.config.from,
            "to": to,
            "body": sms_body(content),
        });
        let mut request = sms.client.post(&sms.config.api_url).json(&payload);
        if let Some(token) = &sms.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(DeliveryError::SmsRejected(response.status().as_u16()));
        }
        info!("reminder SMS sent");
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchPlan {
    pub email_to: Option<String>,
    pub sms_to: Option<String>,
}

/// Preference gating for one record. No stored profile means no deliveries;
/// the in-app notification entry is built by the caller either way.
pub fn plan_dispatch(profile: Option<&UserProfile>, record: &TrainingRecord) -> DispatchPlan {
    let Some(profile) = profile else {
        return DispatchPlan::default();
    };

    let email_to = if profile.notify_email {
        profile
            .email
            .clone()
            .or_else(|| record.staff_email.clone())
    } else {
        None
    };
    let sms_to = if profile.notify_sms {
        profile.phone_number.clone()
    } else {
        None
    };

    DispatchPlan { email_to, sms_to }
}

fn email_body(template_id: &str, content: &StageContent) -> String {
    match template_id {
        "short" => content.message.clone(),
        _ => format!(
            "{}\n\n{}\n\nThis is an automated reminder from the care home training system.",
            content.title, content.message
        ),
    }
}

fn sms_body(content: &StageContent) -> String {
    format!("{}: {}", content.title, content.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordStatus;
    use uuid::Uuid;

    fn sample_record() -> TrainingRecord {
        TrainingRecord {
            id: Uuid::new_v4(),
            staff_id: "user_averylee".to_string(),
            staff_name: "Avery Lee".to_string(),
            staff_email: Some("avery.record@example.com".to_string()),
            course_title: "Fire Safety".to_string(),
            expiry_date: None,
            completion_date: None,
            status: RecordStatus::Active,
            reminders_sent: 0,
            last_reminder_date: None,
            location: String::new(),
            category: String::new(),
            discussed_in_supervision: false,
            concerns: String::new(),
            action_points: String::new(),
        }
    }

    fn sample_profile() -> UserProfile {
        UserProfile {
            email: Some("avery.profile@example.com".to_string()),
            phone_number: Some("+447700900123".to_string()),
            notify_email: true,
            notify_sms: true,
        }
    }

    #[test]
    fn no_profile_means_no_deliveries() {
        let plan = plan_dispatch(None, &sample_record());
        assert_eq!(plan, DispatchPlan::default());
    }

    #[test]
    fn enabled_preferences_use_profile_contacts() {
        let plan = plan_dispatch(Some(&sample_profile()), &sample_record());
        assert_eq!(plan.email_to.as_deref(), Some("avery.profile@example.com"));
        assert_eq!(plan.sms_to.as_deref(), Some("+447700900123"));
    }

    #[test]
    fn disabled_preferences_suppress_their_channel() {
        let mut profile = sample_profile();
        profile.notify_email = false;
        let plan = plan_dispatch(Some(&profile), &sample_record());
        assert!(plan.email_to.is_none());
        assert_eq!(plan.sms_to.as_deref(), Some("+447700900123"));

        let mut profile = sample_profile();
        profile.notify_sms = false;
        let plan = plan_dispatch(Some(&profile), &sample_record());
        assert!(plan.sms_to.is_none());
    }

    #[test]
    fn profile_without_email_falls_back_to_the_record_address() {
        let mut profile = sample_profile();
        profile.email = None;
        let plan = plan_dispatch(Some(&profile), &sample_record());
        assert_eq!(plan.email_to.as_deref(), Some("avery.record@example.com"));
    }

    #[test]
    fn sms_needs_a_phone_number_on_file() {
        let mut profile = sample_profile();
        profile.phone_number = None;
        let plan = plan_dispatch(Some(&profile), &sample_record());
        assert!(plan.sms_to.is_none());
    }

    #[test]
    fn email_body_variant_follows_the_template_id() {
        let content = StageContent {
            title: "Training expired".to_string(),
            message: "Fire Safety expired on 01 March 2026.".to_string(),
        };
        assert_eq!(email_body("short", &content), content.message);
        let full = email_body("expired", &content);
        assert!(full.contains(&content.title));
        assert!(full.contains(&content.message));
    }

    #[tokio::test]
    async fn unconfigured_channels_are_noops() {
        let delivery = Delivery {
            mailer: None,
            sms: None,
            templates: StageTemplates::default(),
        };
        let content = StageContent {
            title: "Training expiry reminder".to_string(),
            message: "Fire Safety expires soon.".to_string(),
        };
        assert!(delivery
            .send_stage_email("avery@example.com", EscalationStage::Initial, &content)
            .await
            .is_ok());
        assert!(delivery.send_sms("+447700900123", &content).await.is_ok());
    }
}
