//! Autonomous QSO state machine
//!
//! One machine per decoder-app instance drives a fixed FT8-style exchange:
//!
//! ```text
//! us:   CQ W1ABC FN20
//! them: W1ABC DL1XYZ JO62      (any directed answer advances us)
//! us:   DL1XYZ W1ABC -05       (their SNR as we measured it)
//! them: W1ABC DL1XYZ R-07
//! us:   DL1XYZ W1ABC RR73
//! them: W1ABC DL1XYZ 73        -> complete
//! ```
//!
//! The transition logic is synchronous and timer-free ([`QsoMachine`]);
//! [`run_qso`] drives it from a decode channel and a single re-armed
//! timeout, so transitions execute on one task and cannot interleave.

use std::time::Duration;

use slice_protocol::wsjtx::{DecodeFrame, DecoderCommand};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::QsoFailReason;
use crate::sink::CommandSink;

/// Machine configuration
#[derive(Debug, Clone)]
pub struct QsoConfig {
    /// Our callsign
    pub my_call: String,
    /// Our grid locator
    pub my_grid: String,
    /// Station to work
    pub target_call: String,
    /// Per-state timeout
    pub state_timeout: Duration,
    /// Transmission attempts per exchange step
    pub max_retries: u32,
}

impl QsoConfig {
    /// Config with the standard timeout (15 s) and retry budget (3)
    pub fn new(my_call: &str, my_grid: &str, target_call: &str) -> Self {
        Self {
            my_call: my_call.to_string(),
            my_grid: my_grid.to_string(),
            target_call: target_call.to_string(),
            state_timeout: Duration::from_secs(15),
            max_retries: 3,
        }
    }
}

/// Machine state
///
/// The send states are pass-through: entering one transmits and falls
/// directly into the matching wait state, so `state()` only ever rests on
/// Idle, a waiting state, or a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QsoState {
    /// Created, not started
    Idle,
    /// Transmitting CQ
    Calling,
    /// CQ sent, listening for an answer
    WaitingReply,
    /// Transmitting their report
    SendingReport,
    /// Report sent, listening for theirs
    WaitingReport,
    /// Transmitting RR73
    SendingConfirm,
    /// RR73 sent, listening for the final 73
    WaitingFinal,
    /// Terminal: exchange done
    Complete,
    /// Terminal: gave up
    Failed,
}

impl QsoState {
    /// True for Complete and Failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// What to transmit for one transition
#[derive(Debug, Clone, PartialEq)]
pub enum TransmitIntent {
    /// Put this text in the free-text field and key it
    FreeText(String),
    /// Answer this decode through the decoder's own sequencer
    Reply(DecodeFrame),
}

/// Side effects requested by one transition
#[derive(Debug, Clone, PartialEq)]
pub enum QsoAction {
    /// Send one transmission
    Transmit(TransmitIntent),
    /// (Re-)arm the state timeout
    ArmTimeout,
    /// Emit qso-complete; machine is terminal
    Complete,
    /// Emit qso-failed; machine is terminal
    Fail(QsoFailReason),
}

/// The synchronous transition core
#[derive(Debug)]
pub struct QsoMachine {
    cfg: QsoConfig,
    state: QsoState,
    attempts: u32,
    /// Decode that advanced us out of WaitingReply, kept for Reply commands
    answer: Option<DecodeFrame>,
    /// Their SNR as we measured it, the report we send
    their_snr: i32,
}

impl QsoMachine {
    /// New machine in Idle
    pub fn new(cfg: QsoConfig) -> Self {
        Self {
            cfg,
            state: QsoState::Idle,
            attempts: 0,
            answer: None,
            their_snr: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> QsoState {
        self.state
    }

    /// Attempts spent in the current exchange step
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Target callsign
    pub fn target_call(&self) -> &str {
        &self.cfg.target_call
    }

    /// Kick off the exchange; valid only from Idle
    pub fn start(&mut self) -> Vec<QsoAction> {
        debug_assert_eq!(self.state, QsoState::Idle);
        self.enter_calling()
    }

    /// Feed one decode from the bound instance
    pub fn on_decode(&mut self, decode: &DecodeFrame) -> Vec<QsoAction> {
        let tokens: Vec<&str> = decode.message.split_whitespace().collect();
        if !self.is_directed_to_us(&tokens) {
            return Vec::new();
        }

        match self.state {
            QsoState::Calling | QsoState::WaitingReply => {
                // Any directed message advances us; it carries their answer
                self.their_snr = decode.snr;
                self.answer = Some(decode.clone());
                self.enter_sending_report()
            }
            QsoState::SendingReport | QsoState::WaitingReport => {
                if trailing_report(&tokens).is_some() {
                    self.enter_sending_confirm()
                } else {
                    Vec::new()
                }
            }
            QsoState::SendingConfirm | QsoState::WaitingFinal => {
                if has_final_ack(&tokens) {
                    self.state = QsoState::Complete;
                    vec![QsoAction::Complete]
                } else if trailing_report(&tokens).is_some() {
                    // Their R-report again: the RR73 was lost, resend it
                    self.resend_confirm()
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }

    /// The state timeout fired
    pub fn on_timeout(&mut self) -> Vec<QsoAction> {
        match self.state {
            QsoState::WaitingReply => {
                if self.attempts >= self.cfg.max_retries {
                    self.fail()
                } else {
                    self.enter_calling()
                }
            }
            QsoState::WaitingReport => {
                if self.attempts >= self.cfg.max_retries {
                    self.fail()
                } else {
                    self.enter_sending_report()
                }
            }
            QsoState::WaitingFinal => {
                if self.attempts >= self.cfg.max_retries {
                    // RR73 went out repeatedly; the exchange is complete by
                    // convention even when the final 73 never arrives.
                    info!(target = %self.cfg.target_call, "final 73 missing, completing anyway");
                    self.state = QsoState::Complete;
                    vec![QsoAction::Complete]
                } else {
                    self.resend_confirm()
                }
            }
            _ => Vec::new(),
        }
    }

    /// The operator halted TX; terminal failure
    pub fn on_halt(&mut self) -> Vec<QsoAction> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        self.state = QsoState::Failed;
        vec![QsoAction::Fail(QsoFailReason::Halted)]
    }

    fn enter_calling(&mut self) -> Vec<QsoAction> {
        self.attempts += 1;
        self.state = QsoState::WaitingReply;
        let text = format!("CQ {} {}", self.cfg.my_call, self.cfg.my_grid);
        vec![
            QsoAction::Transmit(TransmitIntent::FreeText(text)),
            QsoAction::ArmTimeout,
        ]
    }

    fn enter_sending_report(&mut self) -> Vec<QsoAction> {
        if self.state == QsoState::WaitingReport {
            self.attempts += 1;
        } else {
            self.attempts = 1;
        }
        self.state = QsoState::WaitingReport;

        // Replying through the decoder's sequencer is preferred: the Reply
        // command arms its auto-TX, keeping our timing aligned with the
        // band. Fall back to free text when there is nothing to reply to.
        let intent = match &self.answer {
            Some(decode) => TransmitIntent::Reply(decode.clone()),
            None => TransmitIntent::FreeText(self.report_text()),
        };
        vec![QsoAction::Transmit(intent), QsoAction::ArmTimeout]
    }

    fn enter_sending_confirm(&mut self) -> Vec<QsoAction> {
        self.attempts = 1;
        self.state = QsoState::WaitingFinal;
        vec![
            QsoAction::Transmit(TransmitIntent::FreeText(self.confirm_text())),
            QsoAction::ArmTimeout,
        ]
    }

    fn resend_confirm(&mut self) -> Vec<QsoAction> {
        self.attempts += 1;
        self.state = QsoState::WaitingFinal;
        vec![
            QsoAction::Transmit(TransmitIntent::FreeText(self.confirm_text())),
            QsoAction::ArmTimeout,
        ]
    }

    fn fail(&mut self) -> Vec<QsoAction> {
        self.state = QsoState::Failed;
        let reason = if self.cfg.max_retries == 0 {
            QsoFailReason::Timeout
        } else {
            QsoFailReason::MaxRetries
        };
        vec![QsoAction::Fail(reason)]
    }

    fn report_text(&self) -> String {
        format!(
            "{} {} {}",
            self.cfg.target_call,
            self.cfg.my_call,
            format_report(self.their_snr)
        )
    }

    fn confirm_text(&self) -> String {
        format!("{} {} RR73", self.cfg.target_call, self.cfg.my_call)
    }

    fn is_directed_to_us(&self, tokens: &[&str]) -> bool {
        if tokens.len() < 2 {
            return false;
        }
        same_call(tokens[0], &self.cfg.my_call) && same_call(tokens[1], &self.cfg.target_call)
    }
}

/// Signed report text: `-05`, `+03`
pub fn format_report(snr: i32) -> String {
    let snr = snr.clamp(-99, 99);
    format!("{}{:02}", if snr < 0 { '-' } else { '+' }, snr.abs())
}

/// Case-insensitive callsign comparison ignoring portable suffixes
///
/// `W1ABC/P`, `w1abc/mm`, and `DL/W1ABC` all compare equal to `W1ABC`; the
/// longest slash-separated segment is taken as the base call.
pub fn same_call(a: &str, b: &str) -> bool {
    base_call(a).eq_ignore_ascii_case(&base_call(b))
}

fn base_call(call: &str) -> String {
    call.split('/')
        .max_by_key(|segment| segment.len())
        .unwrap_or(call)
        .to_ascii_uppercase()
}

/// Find a report (`[+-]NN`, optionally `R`-prefixed) in the trailing tokens
fn trailing_report(tokens: &[&str]) -> Option<i32> {
    tokens.iter().skip(2).find_map(|token| parse_report(token))
}

fn parse_report(token: &str) -> Option<i32> {
    let token = token.strip_prefix(['R', 'r']).unwrap_or(token);
    let rest = token.strip_prefix(['+', '-'])?;
    if rest.is_empty() || rest.len() > 2 || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse::<i32>().ok()
}

fn has_final_ack(tokens: &[&str]) -> bool {
    tokens
        .iter()
        .skip(2)
        .any(|t| t.eq_ignore_ascii_case("73") || t.eq_ignore_ascii_case("RR73"))
}

/// Terminal result of one QSO run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QsoOutcome {
    /// Exchange completed
    Complete,
    /// Exchange abandoned
    Failed(QsoFailReason),
}

/// Drive one QSO to its terminal state
///
/// Decodes arrive on `decodes` in arrival order; `halt` aborts the exchange.
/// Exactly one [`QsoOutcome`] is returned per call. Transmit intents go out
/// through the command sink as either a Reply command (preferred, arms the
/// decoder's sequencer) or a FreeText with `send = 1`; only one intent is in
/// flight per transition.
pub async fn run_qso(
    instance_id: String,
    cfg: QsoConfig,
    mut decodes: mpsc::Receiver<DecodeFrame>,
    mut halt: watch::Receiver<bool>,
    sink: CommandSink,
) -> QsoOutcome {
    let timeout = cfg.state_timeout;
    let mut machine = QsoMachine::new(cfg);
    let mut deadline = tokio::time::Instant::now() + timeout;

    let mut pending = machine.start();
    loop {
        for action in pending.drain(..) {
            match action {
                QsoAction::Transmit(intent) => {
                    let command = match intent {
                        TransmitIntent::Reply(decode) => {
                            DecoderCommand::reply_to(&instance_id, &decode)
                        }
                        TransmitIntent::FreeText(text) => {
                            info!(instance = %instance_id, %text, "transmit intent");
                            DecoderCommand::FreeText {
                                id: instance_id.clone(),
                                text,
                                send: true,
                            }
                        }
                    };
                    if let Err(e) = sink.send(&instance_id, &command).await {
                        // The retry loop covers a lost transmission.
                        warn!(instance = %instance_id, "transmit intent failed: {}", e);
                    }
                }
                QsoAction::ArmTimeout => {
                    deadline = tokio::time::Instant::now() + timeout;
                }
                QsoAction::Complete => {
                    info!(instance = %instance_id, target = %machine.target_call(), "QSO complete");
                    return QsoOutcome::Complete;
                }
                QsoAction::Fail(reason) => {
                    info!(instance = %instance_id, target = %machine.target_call(), %reason, "QSO failed");
                    return QsoOutcome::Failed(reason);
                }
            }
        }

        tokio::select! {
            decode = decodes.recv() => {
                match decode {
                    Some(decode) => {
                        debug!(instance = %instance_id, message = %decode.message, "QSO decode");
                        pending = machine.on_decode(&decode);
                    }
                    None => {
                        pending = machine.on_halt();
                    }
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                pending = machine.on_timeout();
            }
            changed = halt.changed() => {
                // A dropped halt sender means the QSO is orphaned; treat it
                // as a halt rather than spinning on a closed channel.
                if changed.is_err() || *halt.borrow() {
                    pending = machine.on_halt();
                }
            }
        }
    }
}
