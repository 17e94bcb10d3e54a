//! Alarm classification and Telegram message layout

use crate::config::MessageConfig;
use crate::models::{AlarmState, Finding};

const RULE: &str = "➖➖➖➖➖➖➖➖➖➖";

/// How many characters of a query error make it into the message
const ERROR_EXCERPT_CHARS: usize = 50;

/// Escape text for Telegram's legacy Markdown so that log-derived values
/// cannot open or break an entity.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Header and footer for an alarm state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub icon: &'static str,
    pub status: String,
    pub footer: &'static str,
}

/// Map an alarm state onto its display tuple
pub fn classify(state: &AlarmState) -> Classification {
    match state {
        AlarmState::Alarm => Classification {
            icon: "🚨",
            status: "🔴 **CRITICAL ALERT**".to_string(),
            footer: "Investigate the server immediately.",
        },
        AlarmState::Ok => Classification {
            icon: "✅",
            status: "🟢 **RECOVERY (SAFE)**".to_string(),
            footer: "The threat has subsided.",
        },
        AlarmState::Other(raw) => Classification {
            icon: "⚠️",
            status: format!("🟡 **{}**", escape_markdown(raw)),
            footer: "Unknown alarm status.",
        },
    }
}

/// Content of the findings section
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindingsSection {
    Findings(Vec<Finding>),
    /// Query completed with no matching lines
    Empty,
    /// Query failed; carries the error text
    Failed(String),
    /// Log query was not run for this state
    Pending,
    /// Section left out of the message
    Omitted,
}

/// Builds the Markdown notification text
pub struct MessageComposer {
    config: MessageConfig,
    result_limit: usize,
}

impl MessageComposer {
    pub fn new(config: MessageConfig, result_limit: usize) -> Self {
        MessageComposer { config, result_limit }
    }

    pub fn compose(&self, classification: &Classification, section: &FindingsSection) -> String {
        let mut message = format!(
            "{icon} {status} {icon}\n{rule}\n🖥️ **Host:** {host}\n📉 **Threshold:** {threshold}\n{rule}\n\n",
            icon = classification.icon,
            status = classification.status,
            rule = RULE,
            host = self.config.host_label,
            threshold = self.config.threshold_label,
        );

        if let Some(body) = self.render_section(section) {
            message.push_str(&format!(
                "🕵️ **Top {} Attackers (Realtime):**\n{}\n\n",
                self.result_limit, body
            ));
        }

        message.push_str(&format!("📜 **Note:**\n_{}_", classification.footer));
        message
    }

    fn render_section(&self, section: &FindingsSection) -> Option<String> {
        match section {
            FindingsSection::Findings(findings) if !findings.is_empty() => Some(
                findings
                    .iter()
                    .map(|f| self.render_finding(f))
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            ),
            FindingsSection::Findings(_) | FindingsSection::Empty => {
                Some("📭 Log empty (no data in CloudWatch yet)".to_string())
            }
            FindingsSection::Failed(error) => {
                let excerpt: String = error.chars().take(ERROR_EXCERPT_CHARS).collect();
                Some(format!("⚠️ Error fetching logs: {}", escape_markdown(&excerpt)))
            }
            FindingsSection::Pending => Some("⏳ _Fetching log data..._".to_string()),
            FindingsSection::Omitted => None,
        }
    }

    /// One finding, e.g.
    ///
    /// ```text
    /// 1. 👤 **bob**
    ///     └ 🌐 [1.2.3.4](https://whatismyipaddress.com/ip/1.2.3.4) — Jakarta, ID (Biznet)
    ///     └ 🕒 `10:00:00 WIB`
    /// ```
    pub fn render_finding(&self, finding: &Finding) -> String {
        format!(
            "{}. 👤 **{}**\n    └ 🌐 [{ip}]({}{ip}) — {}\n    └ 🕒 `{} {}`",
            finding.index,
            escape_markdown(&finding.user),
            self.config.ip_link_base,
            escape_markdown(&finding.location),
            finding.timestamp_local,
            self.config.timezone_label,
            ip = finding.ip,
        )
    }
}
