use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::info;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub trait Mailer {
    fn send(&self, mail: &Mail) -> Result<()>;
}

/// Drops each message as an `.eml` file in an outbox directory.
pub struct FileMailer {
    dir: PathBuf,
}

impl FileMailer {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl Mailer for FileMailer {
    fn send(&self, mail: &Mail) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let safe_to: String = mail
            .to
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
            .collect();
        let path = self.dir.join(format!("{}-{}.eml", stamp, safe_to));
        let content = format!("To: {}\nSubject: {}\n\n{}\n", mail.to, mail.subject, mail.body);
        fs::write(&path, content)?;
        info!(to = %mail.to, path = %path.display(), "mail written to outbox");
        Ok(())
    }
}

/// Keeps sent mail in memory; clones share the same outbox.
#[derive(Debug, Clone, Default)]
pub struct MemoryMailer {
    sent: Rc<RefCell<Vec<Mail>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Mail> {
        self.sent.borrow().clone()
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, mail: &Mail) -> Result<()> {
        self.sent.borrow_mut().push(mail.clone());
        Ok(())
    }
}
