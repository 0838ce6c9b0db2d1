use crate::escalation::EscalationStage;

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub api_url: String,
    pub api_token: Option<String>,
    pub from: String,
}

/// Per-stage template identifiers, environment-supplied and otherwise
/// defaulting to the stage key itself.
#[derive(Debug, Clone)]
pub struct StageTemplates {
    initial: String,
    followup14: String,
    followup7: String,
    expired: String,
    final_notice: String,
}

impl Default for StageTemplates {
    fn default() -> Self {
        Self {
            initial: EscalationStage::Initial.key().to_string(),
            followup14: EscalationStage::Followup14.key().to_string(),
            followup7: EscalationStage::Followup7.key().to_string(),
            expired: EscalationStage::Expired.key().to_string(),
            final_notice: EscalationStage::Final.key().to_string(),
        }
    }
}

impl StageTemplates {
    fn from_env() -> Self {
        let with_default = |name: &str, stage: EscalationStage| {
            env_opt(name).unwrap_or_else(|| stage.key().to_string())
        };
        Self {
            initial: with_default("REMINDER_TEMPLATE_INITIAL", EscalationStage::Initial),
            followup14: with_default("REMINDER_TEMPLATE_FOLLOWUP14", EscalationStage::Followup14),
            followup7: with_default("REMINDER_TEMPLATE_FOLLOWUP7", EscalationStage::Followup7),
            expired: with_default("REMINDER_TEMPLATE_EXPIRED", EscalationStage::Expired),
            final_notice: with_default("REMINDER_TEMPLATE_FINAL", EscalationStage::Final),
        }
    }

    pub fn id_for(&self, stage: EscalationStage) -> &str {
        match stage {
            EscalationStage::Initial => &self.initial,
            EscalationStage::Followup14 => &self.followup14,
            EscalationStage::Followup7 => &self.followup7,
            EscalationStage::Expired => &self.expired,
            EscalationStage::Final => &self.final_notice,
        }
    }
}

/// Delivery-provider configuration. A channel missing its required settings
/// stays disabled; the workflows treat a disabled channel as a logged no-op.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub smtp: Option<SmtpConfig>,
    pub sms: Option<SmsConfig>,
    pub templates: StageTemplates,
}

impl DeliveryConfig {
    pub fn from_env() -> Self {
        let smtp = match (env_opt("SMTP_HOST"), env_opt("SMTP_FROM")) {
            (Some(host), Some(from)) => Some(SmtpConfig {
                host,
                port: env_opt("SMTP_PORT")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(587),
                user: env_opt("SMTP_USER"),
                password: env_opt("SMTP_PASSWORD"),
                from,
            }),
            _ => None,
        };

        let sms = env_opt("SMS_API_URL").map(|api_url| SmsConfig {
            api_url,
            api_token: env_opt("SMS_API_TOKEN"),
            from: env_opt("SMS_FROM").unwrap_or_else(|| "CareHome".to_string()),
        });

        Self {
            smtp,
            sms,
            templates: StageTemplates::from_env(),
        }
    }
}
