//! One pass of the content filter over one inbound message.
//!
//! The message is always handed back to the MTA first. Only then is it
//! classified and, if it came from a person, answered once per matching
//! rule address. A failing reply never affects the others.

use std::fmt;

use crate::classify::{self, Reason, Verdict};
use crate::config::ReplyRule;
use crate::error::{DispatchError, PipelineError, ReplyError};
use crate::logging::LogContext;
use crate::message::InboundMessage;
use crate::reinject::Reinjector;
use crate::reply::{Generator, Mode};
use crate::rules;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Reinjected,
    Classified,
    Generating,
    Dispatched,
    Done,
}

#[derive(Debug)]
pub enum Failure {
    Generate { address: String, error: ReplyError },
    Dispatch { address: String, error: DispatchError },
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Generate { address, error } => write!(f, "generate for {}: {}", address, error),
            Failure::Dispatch { address, error } => write!(f, "dispatch for {}: {}", address, error),
        }
    }
}

impl Failure {
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Failure::Dispatch {
                error: DispatchError::Smtp(_) | DispatchError::Tls { .. },
                ..
            }
        )
    }
}

/// Outcome of a completed run.
#[derive(Debug)]
pub struct Report {
    pub stage: Stage,
    pub verdict: Verdict,
    pub matched: usize,
    /// Message-IDs of the replies handed to the transport successfully.
    pub sent: Vec<String>,
    pub failures: Vec<Failure>,
}

impl Report {
    pub fn transport_failed(&self) -> bool {
        self.failures.iter().any(Failure::is_transport)
    }
}

pub struct Pipeline<'a> {
    rules: &'a [ReplyRule],
    reinjector: &'a dyn Reinjector,
    transport: &'a dyn Transport,
    log: &'a LogContext,
    stage: Stage,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        rules: &'a [ReplyRule],
        reinjector: &'a dyn Reinjector,
        transport: &'a dyn Transport,
        log: &'a LogContext,
    ) -> Self {
        Self {
            rules,
            reinjector,
            transport,
            log,
            stage: Stage::Start,
        }
    }

    fn advance(&mut self, next: Stage) {
        self.log
            .detail(&format!("[pipeline] {:?} -> {:?}", self.stage, next));
        self.stage = next;
    }

    pub fn run(mut self, inbound: &InboundMessage) -> Result<Report, PipelineError> {
        self.log.event(&format!(
            "[pipeline] message from {:?} to {}",
            inbound.sender,
            inbound.recipients.join(", ")
        ));

        self.reinjector
            .reinject(&inbound.sender, &inbound.recipients, &inbound.raw)
            .map_err(|e| {
                self.log.failure(&format!("[pipeline] re-injection failed: {}", e));
                PipelineError::Reinject(e)
            })?;
        self.advance(Stage::Reinjected);

        let verdict = classify::classify(&inbound.headers);
        self.advance(Stage::Classified);

        let mut report = Report {
            stage: self.stage,
            verdict,
            matched: 0,
            sent: Vec::new(),
            failures: Vec::new(),
        };

        if verdict.automated {
            self.log.event(&format!(
                "[pipeline] automated message ({}), not replying",
                verdict.reason
            ));
            self.advance(Stage::Done);
            report.stage = self.stage;
            return Ok(report);
        }
        if inbound.sender.is_empty() || inbound.sender == "<>" {
            self.log
                .event("[pipeline] null envelope sender, not replying");
            self.advance(Stage::Done);
            report.stage = self.stage;
            return Ok(report);
        }
        debug_assert_eq!(verdict.reason, Reason::None);

        self.advance(Stage::Generating);
        let matches = rules::match_rules(&inbound.sender, &inbound.recipients, self.rules);
        report.matched = matches.len();
        self.log.detail(&format!(
            "[pipeline] {} matching rule address(es)",
            matches.len()
        ));

        let generator = Generator::new(self.log, Mode::Live);
        for m in matches {
            self.log.event(&format!(
                "[pipeline] autoreply triggered by {} for sender {}",
                m.address, inbound.sender
            ));
            let reply = match generator.generate(m.rule, m.address, inbound) {
                Ok(reply) => reply,
                Err(error) => {
                    self.log.failure(&format!(
                        "[pipeline] could not generate reply for {}: {}",
                        m.address, error
                    ));
                    report.failures.push(Failure::Generate {
                        address: m.address.to_string(),
                        error,
                    });
                    continue;
                }
            };
            match self.transport.send(&reply) {
                Ok(()) => {
                    self.log.event(&format!(
                        "[pipeline] reply {} sent to {}",
                        reply.message_id, reply.to
                    ));
                    report.sent.push(reply.message_id);
                }
                Err(error) => {
                    self.log.failure(&format!(
                        "[pipeline] could not send reply for {}: {}",
                        m.address, error
                    ));
                    report.failures.push(Failure::Dispatch {
                        address: m.address.to_string(),
                        error,
                    });
                }
            }
        }

        self.advance(Stage::Dispatched);
        self.advance(Stage::Done);
        report.stage = self.stage;
        Ok(report)
    }
}
