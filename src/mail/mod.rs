pub mod ledger;

pub use ledger::{BdLedger, LedgerRecord, WorkLedger};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::session::SessionController;
use crate::types::address::session_id_for;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Map onto the ledger's 0-3 numeric scale.
    pub fn to_ledger(self) -> u8 {
        match self {
            Priority::Urgent => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Notification,
    Request,
    Reply,
    Escalation,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Notification => "notification",
            MessageType::Request => "request",
            MessageType::Reply => "reply",
            MessageType::Escalation => "escalation",
        }
    }
}

/// An inter-agent message. Once delivered, the ledger owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub from: String,
    pub to: String,
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub msg_type: MessageType,
}

impl Message {
    pub fn new(from: impl Into<String>, to: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            body: String::new(),
            priority: Priority::default(),
            thread_id: None,
            reply_to: None,
            msg_type: MessageType::default(),
        }
    }
}

/// Delivers messages through the work ledger, with best-effort live
/// notification to the recipient's session.
pub struct Router {
    ledger: Arc<dyn WorkLedger>,
    controller: Arc<dyn SessionController>,
}

impl Router {
    pub fn new(ledger: Arc<dyn WorkLedger>, controller: Arc<dyn SessionController>) -> Self {
        Self { ledger, controller }
    }

    /// Persist the message in the ledger. Persistence failure is a hard
    /// error; the follow-up live notification is best-effort and swallowed.
    pub fn send(&self, msg: &Message) -> Result<()> {
        let record = build_record(msg);
        self.ledger
            .create_record(&record)
            .with_context(|| format!("sending message to {}", msg.to))?;

        if let Err(e) = self.notify_recipient(msg) {
            log::warn!("live notification to {} failed: {e}", msg.to);
        }
        Ok(())
    }

    /// Number of messages waiting for an address, for mailbox event gates.
    pub fn pending_for(&self, address: &str) -> Result<usize> {
        self.ledger.pending_for(address)
    }

    fn notify_recipient(&self, msg: &Message) -> Result<()> {
        let Some(session_id) = session_id_for(&msg.to) else {
            return Ok(()); // No live-session form for this address
        };
        if !self.controller.has_session(&session_id)? {
            return Ok(()); // Delivery already succeeded via the ledger
        }
        self.controller.send_keys(
            &session_id,
            &format!("# [mail] from {}: {}", msg.from, msg.subject),
        )
    }
}

/// Encode a message as a ledger record. Sender identity, thread id,
/// reply-to, and message type ride in labels.
pub fn build_record(msg: &Message) -> LedgerRecord {
    let identity = address_to_identity(&msg.from);

    let mut labels = vec![format!("from:{identity}")];
    if let Some(thread) = &msg.thread_id {
        labels.push(format!("thread:{thread}"));
    }
    if let Some(reply_to) = &msg.reply_to {
        labels.push(format!("reply-to:{reply_to}"));
    }
    if msg.msg_type != MessageType::Notification {
        labels.push(format!("msg-type:{}", msg.msg_type.as_str()));
    }

    LedgerRecord {
        record_type: "message".to_string(),
        title: msg.subject.clone(),
        assignee: msg.to.clone(),
        description: msg.body.clone(),
        priority: msg.priority.to_ledger(),
        labels,
        created_by: identity,
    }
}

/// Canonical identity form of an address: trailing slash dropped.
fn address_to_identity(address: &str) -> String {
    address.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::path::Path;
    use std::sync::Mutex;

    struct RecordingLedger {
        records: Mutex<Vec<LedgerRecord>>,
        fail: bool,
    }

    impl RecordingLedger {
        fn new(fail: bool) -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    impl WorkLedger for RecordingLedger {
        fn create_record(&self, record: &LedgerRecord) -> Result<()> {
            if self.fail {
                bail!("ledger unavailable");
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        fn pending_for(&self, assignee: &str) -> Result<usize> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.assignee == assignee)
                .count())
        }
    }

    struct BannerController {
        live: Vec<String>,
        banners: Mutex<Vec<(String, String)>>,
        fail_banner: bool,
    }

    impl BannerController {
        fn new(live: &[&str]) -> Self {
            Self {
                live: live.iter().map(|s| s.to_string()).collect(),
                banners: Mutex::new(Vec::new()),
                fail_banner: false,
            }
        }
    }

    impl SessionController for BannerController {
        fn has_session(&self, id: &str) -> Result<bool> {
            Ok(self.live.contains(&id.to_string()))
        }
        fn create_session(&self, _: &str, _: &Path, _: &str) -> Result<()> {
            Ok(())
        }
        fn kill_session(&self, _: &str) -> Result<()> {
            Ok(())
        }
        fn send_keys(&self, id: &str, text: &str) -> Result<()> {
            if self.fail_banner {
                bail!("send-keys failed");
            }
            self.banners
                .lock()
                .unwrap()
                .push((id.to_string(), text.to_string()));
            Ok(())
        }
        fn interrupt(&self, _: &str) -> Result<()> {
            Ok(())
        }
        fn set_env(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        fn worker_alive(&self, id: &str) -> Result<bool> {
            self.has_session(id)
        }
    }

    #[test]
    fn test_record_encoding() {
        let mut msg = Message::new("deacon", "gastown/toast", "patrol findings");
        msg.body = "two zombies recovered".to_string();
        msg.priority = Priority::High;
        msg.thread_id = Some("th-7".to_string());
        msg.msg_type = MessageType::Request;

        let record = build_record(&msg);
        assert_eq!(record.record_type, "message");
        assert_eq!(record.title, "patrol findings");
        assert_eq!(record.assignee, "gastown/toast");
        assert_eq!(record.priority, 1);
        assert!(record.labels.contains(&"from:deacon".to_string()));
        assert!(record.labels.contains(&"thread:th-7".to_string()));
        assert!(record.labels.contains(&"msg-type:request".to_string()));
    }

    #[test]
    fn test_notification_type_omitted_from_labels() {
        let record = build_record(&Message::new("mayor/", "deacon", "hello"));
        assert!(record.labels.iter().all(|l| !l.starts_with("msg-type:")));
        assert!(record.labels.contains(&"from:mayor".to_string()));
    }

    #[test]
    fn test_send_persists_and_notifies_live_session() {
        let ledger = Arc::new(RecordingLedger::new(false));
        let controller = Arc::new(BannerController::new(&["gt-gastown-toast"]));
        let router = Router::new(ledger.clone(), controller.clone());

        router
            .send(&Message::new("deacon", "gastown/toast", "wake up"))
            .unwrap();

        assert_eq!(ledger.records.lock().unwrap().len(), 1);
        let banners = controller.banners.lock().unwrap();
        assert_eq!(banners.len(), 1);
        assert_eq!(banners[0].0, "gt-gastown-toast");
        assert!(banners[0].1.contains("wake up"));
    }

    #[test]
    fn test_send_skips_notification_when_no_live_session() {
        let ledger = Arc::new(RecordingLedger::new(false));
        let controller = Arc::new(BannerController::new(&[]));
        let router = Router::new(ledger.clone(), controller.clone());

        router
            .send(&Message::new("deacon", "gastown/toast", "wake up"))
            .unwrap();
        assert_eq!(ledger.records.lock().unwrap().len(), 1);
        assert!(controller.banners.lock().unwrap().is_empty());
    }

    #[test]
    fn test_notification_failure_is_swallowed() {
        let ledger = Arc::new(RecordingLedger::new(false));
        let mut controller = BannerController::new(&["gt-mayor"]);
        controller.fail_banner = true;
        let router = Router::new(ledger.clone(), Arc::new(controller));

        router.send(&Message::new("deacon", "mayor", "report")).unwrap();
        assert_eq!(ledger.records.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_ledger_failure_is_hard_error() {
        let ledger = Arc::new(RecordingLedger::new(true));
        let controller = Arc::new(BannerController::new(&["gt-mayor"]));
        let router = Router::new(ledger, controller.clone());

        let err = router.send(&Message::new("deacon", "mayor", "report"));
        assert!(err.is_err());
        assert!(controller.banners.lock().unwrap().is_empty());
    }
}
