mod classify;
mod config;
mod error;
mod logging;
mod message;
mod pipeline;
mod reinject;
mod render;
mod reply;
mod rules;
mod transport;

use anyhow::Context;
use log::{debug, error, info, warn};
use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;

use crate::config::{ReplyRule, Settings};
use crate::error::ConfigError;
use crate::logging::LogContext;
use crate::message::InboundMessage;
use crate::pipeline::Pipeline;
use crate::reinject::Reinjector;
use crate::reply::{Generator, Mode};
use crate::transport::SmtpRelay;

const EX_USAGE: i32 = 64;
const EX_TEMPFAIL: i32 = 75;

const SAMPLE_HTML: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>Out of office</title>
  </head>
  <body>
    <p>Hello,</p>
    <p>Thank you for your message "{ORIGINAL_SUBJECT}".</p>
    <p>{ORIGINAL_DESTINATION} is currently away and will answer as soon as possible.</p>
  </body>
</html>
"#;

fn main() {
    logging::init();

    let args: Vec<String> = env::args().collect();
    let first = args.get(1).map(|s| s.as_str());

    let result = match first {
        None | Some("-h") | Some("--help") => {
            print_usage();
            Ok(())
        }
        Some("-j") => write_default_settings(),
        Some("-s") => show_settings(),
        Some("-w") => write_sample_html(),
        Some("-t") => write_test_message(),
        Some(flag) if flag.starts_with('-') && flag.len() > 1 => {
            error!("[main] unknown option: {}", flag);
            print_usage();
            process::exit(EX_USAGE);
        }
        Some(_) => {
            let sender = args[1].clone();
            let recipients = args[2..].to_vec();
            process::exit(run_filter(sender, recipients));
        }
    };

    if let Err(e) = result {
        error!("[main] {:#}", e);
        process::exit(1);
    }
}

fn print_usage() {
    println!("autoreply - Postfix content filter sending automatic replies");
    println!();
    println!("Usage:");
    println!("  autoreply <sender> [recipient...] < message   Run as content filter");
    println!("  autoreply -j    Write a default settings file (existing one kept as .bak)");
    println!("  autoreply -s    Show the current settings");
    println!("  autoreply -w    Write a sample HTML body to ~/autoreply.html");
    println!("  autoreply -t    Write a sample reply message to ~/test.txt");
    println!();
    println!("Placeholders in subject and body:");
    println!("  {{ORIGINAL_SUBJECT}}      Subject of the received message");
    println!("  {{ORIGINAL_DESTINATION}}  Address that triggered the reply");
    println!();
    println!("Environment variables:");
    println!("  AUTOREPLY_CONFIG  Settings file (default: ~/autoreply.json)");
    println!("  AUTOREPLY_LOG     Activity log when logging is on (default: ~/autoreply.log)");
    println!("  SENDMAIL_PATH     Re-injection binary (default: /usr/sbin/sendmail)");
    println!("  REINJECT_SMTP     Re-inject over SMTP instead, as host:port");
    println!("  RUST_LOG          Log filter for stderr output (default: info)");
}

// ── Content filter ──

/// Runs the filter and returns the process exit code.
fn run_filter(sender: String, recipients: Vec<String>) -> i32 {
    info!(
        "[filter] starting content filter sender={}, recipients={}",
        sender,
        recipients.join(", ")
    );

    let mut raw = Vec::new();
    if let Err(e) = io::stdin().read_to_end(&mut raw) {
        error!("[filter] failed to read message from stdin: {}", e);
        return EX_TEMPFAIL;
    }
    debug!("[filter] read message from stdin ({} bytes)", raw.len());
    let inbound = InboundMessage::new(sender, recipients, raw);
    let reinjector = reinject::from_env();

    let settings = match load_or_reinject(config::settings_path(), &inbound, reinjector.as_ref()) {
        Ok(settings) => settings,
        Err(code) => return code,
    };

    let log = LogContext::from_settings(settings.logging);
    let transport = SmtpRelay::new(settings.smtp.clone());
    let pipeline = Pipeline::new(&settings.rules, reinjector.as_ref(), &transport, &log);

    match pipeline.run(&inbound) {
        Ok(report) => {
            info!(
                "[filter] {:?}: verdict={}, matched={}, sent={}, failed={}",
                report.stage,
                report.verdict.reason,
                report.matched,
                report.sent.len(),
                report.failures.len()
            );
            for failure in &report.failures {
                debug!("[filter] failure: {}", failure);
            }
            if report.transport_failed() {
                log.failure("[filter] one or more replies could not be delivered");
                1
            } else {
                0
            }
        }
        Err(e) => {
            log.failure(&format!("[filter] {}", e));
            EX_TEMPFAIL
        }
    }
}

/// Loads the settings for this run. On failure the message is still handed
/// back to the MTA unchanged and the exit code to use is returned.
fn load_or_reinject(
    path: Result<PathBuf, ConfigError>,
    inbound: &InboundMessage,
    reinjector: &dyn Reinjector,
) -> Result<Settings, i32> {
    let e = match path.and_then(|path| config::load(&path)) {
        Ok(settings) => return Ok(settings),
        Err(e) => e,
    };
    error!("[filter] {}", e);
    if let Err(e) = reinjector.reinject(&inbound.sender, &inbound.recipients, &inbound.raw) {
        error!("[filter] re-injection failed: {}", e);
        return Err(EX_TEMPFAIL);
    }
    warn!("[filter] message re-injected, no reply sent");
    Err(1)
}

// ── Utility modes ──

fn write_default_settings() -> anyhow::Result<()> {
    let path = config::settings_path()?;
    config::write_default(&path)?;
    println!("Default settings written to {}", path.display());
    Ok(())
}

fn show_settings() -> anyhow::Result<()> {
    let path = config::settings_path()?;
    let file = config::read_file(&path)?;
    // Show validation problems too, but still print what is there.
    if let Err(e) = config::Settings::try_from(file.clone()) {
        warn!("[main] {}", e);
    }
    let json = serde_json::to_string_pretty(&file.redacted())
        .context("failed to serialize settings")?;
    println!("{}", path.display());
    println!("{}", json);
    Ok(())
}

fn write_sample_html() -> anyhow::Result<()> {
    let path = config::home_file("autoreply.html")?;
    fs::write(&path, SAMPLE_HTML)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Sample HTML body written to {}", path.display());
    println!("Reference it from a rule with \"html\": true and \"body\": \"{}\"", path.display());
    Ok(())
}

fn write_test_message() -> anyhow::Result<()> {
    let path = config::home_file("test.txt")?;
    let bytes = sample_message()?;
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Test message written to {}", path.display());
    println!("Try it with: autoreply bar@foo foo@bar < {}", path.display());
    Ok(())
}

/// A reply produced by the generator in test mode, usable as input for a
/// manual run of the filter.
fn sample_message() -> anyhow::Result<Vec<u8>> {
    let rule = ReplyRule {
        addresses: vec!["bar@foo".to_string()],
        from: None,
        reply_to: "bar@foo".to_string(),
        subject: "This is a test email".to_string(),
        body: "This would be the autoreply body.".to_string(),
        html: false,
        attachment: None,
    };
    let inbound = InboundMessage::new("foo@bar".to_string(), vec!["bar@foo".to_string()], Vec::new());
    let log = LogContext::disabled();
    let reply = Generator::new(&log, Mode::Test).generate(&rule, "bar@foo", &inbound)?;
    Ok(reply.to_message()?.formatted())
}
