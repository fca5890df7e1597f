//! Hands the original message back to the MTA for final delivery.
//!
//! Postfix `FILTER_README` rules apply: the recipient list is already
//! expanded, so `sendmail` is called with explicit recipients and never with
//! `-t`, and the bytes are passed on exactly as they were received.

use lettre::address::{Address, Envelope};
use lettre::{SmtpTransport, Transport};
use log::{debug, info, warn};
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::ReinjectError;

pub const DEFAULT_SENDMAIL: &str = "/usr/sbin/sendmail";

pub trait Reinjector {
    fn reinject(&self, sender: &str, recipients: &[String], raw: &[u8])
        -> Result<(), ReinjectError>;
}

/// Picks the re-injection method from the environment: `REINJECT_SMTP`
/// (`host:port`) selects SMTP, otherwise `SENDMAIL_PATH` or the default
/// sendmail binary is used.
pub fn from_env() -> Box<dyn Reinjector> {
    if let Ok(target) = env::var("REINJECT_SMTP") {
        if let Some((host, port)) = target.rsplit_once(':') {
            if let Ok(port) = port.parse() {
                info!("[reinject] using SMTP re-injection via {}:{}", host, port);
                return Box::new(SmtpReinjector::new(host, port));
            }
        }
        warn!(
            "[reinject] REINJECT_SMTP={:?} is not host:port, falling back to sendmail",
            target
        );
    }
    let program = env::var("SENDMAIL_PATH").unwrap_or_else(|_| {
        debug!("[reinject] SENDMAIL_PATH not set, defaulting to {}", DEFAULT_SENDMAIL);
        DEFAULT_SENDMAIL.to_string()
    });
    Box::new(Sendmail::new(program))
}

// ── sendmail ──

pub struct Sendmail {
    program: String,
}

impl Sendmail {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(sender: &str, recipients: &[String]) -> Vec<String> {
        let mut args = vec![
            "-G".to_string(),
            "-i".to_string(),
            "-f".to_string(),
            sender.to_string(),
            "--".to_string(),
        ];
        args.extend(recipients.iter().cloned());
        args
    }
}

impl Reinjector for Sendmail {
    fn reinject(
        &self,
        sender: &str,
        recipients: &[String],
        raw: &[u8],
    ) -> Result<(), ReinjectError> {
        if recipients.is_empty() {
            warn!("[reinject] no envelope recipients, nothing to re-inject");
            return Ok(());
        }
        info!(
            "[reinject] re-injecting {} bytes via {} to {}",
            raw.len(),
            self.program,
            recipients.join(", ")
        );
        let mut child = Command::new(&self.program)
            .args(Self::args(sender, recipients))
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|source| ReinjectError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(source) = stdin.write_all(raw) {
                // Close the pipe so the child can finish, then reap it.
                drop(stdin);
                let status = match child.wait() {
                    Ok(status) => status.to_string(),
                    Err(e) => format!("status unknown: {}", e),
                };
                return Err(ReinjectError::Write {
                    program: self.program.clone(),
                    status,
                    source,
                });
            }
        }

        let status = child.wait().map_err(|source| ReinjectError::Wait {
            program: self.program.clone(),
            source,
        })?;
        if !status.success() {
            return Err(ReinjectError::Status {
                program: self.program.clone(),
                status: status.to_string(),
            });
        }
        debug!("[reinject] {} finished: {}", self.program, status);
        Ok(())
    }
}

// ── SMTP ──

/// Plain SMTP to a loopback listener that skips the content filter, for
/// example Postfix `127.0.0.1:10025`.
pub struct SmtpReinjector {
    host: String,
    port: u16,
}

impl SmtpReinjector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn envelope(sender: &str, recipients: &[String]) -> Result<Envelope, ReinjectError> {
        // Empty sender is the null reverse path used by bounces.
        let from = if sender.is_empty() || sender == "<>" {
            None
        } else {
            Some(
                sender
                    .parse::<Address>()
                    .map_err(|e| ReinjectError::Envelope(format!("sender {:?}: {}", sender, e)))?,
            )
        };
        let to = recipients
            .iter()
            .map(|r| {
                r.parse::<Address>()
                    .map_err(|e| ReinjectError::Envelope(format!("recipient {:?}: {}", r, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Envelope::new(from, to).map_err(|e| ReinjectError::Envelope(e.to_string()))
    }
}

impl Reinjector for SmtpReinjector {
    fn reinject(
        &self,
        sender: &str,
        recipients: &[String],
        raw: &[u8],
    ) -> Result<(), ReinjectError> {
        if recipients.is_empty() {
            warn!("[reinject] no envelope recipients, nothing to re-inject");
            return Ok(());
        }
        info!(
            "[reinject] re-injecting {} bytes via smtp://{}:{} to {}",
            raw.len(),
            self.host,
            self.port,
            recipients.join(", ")
        );
        let envelope = Self::envelope(sender, recipients)?;
        // No TLS: the listener is on the loopback interface.
        let mailer = SmtpTransport::builder_dangerous(&self.host)
            .port(self.port)
            .build();
        mailer.send_raw(&envelope, raw)?;
        debug!("[reinject] SMTP re-injection completed for sender={}", sender);
        Ok(())
    }
}
