// Copyright 2026 Prospector Contributors
// SPDX-License-Identifier: Apache-2.0

//! Run events, broadcast to whoever is listening (the CLI printer, tests).

use serde::{Deserialize, Serialize};

/// Everything a run reports while it executes. Serialized as JSON with a
/// `type` tag for machine consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    /// A run began.
    RunStarted {
        run_id: String,
        list_url: String,
        max_pages: u32,
    },
    /// The login form was submitted.
    LoginSubmitted { login_url: String },
    /// A challenge interstitial is blocking the session.
    ChallengeDetected { url: String },
    /// The challenge cleared.
    ChallengeResolved,
    /// One page's records were extracted and persisted.
    PageCaptured {
        page: u32,
        records: usize,
        total: usize,
    },
    /// A page yielded no usable response.
    PageDegraded { page: u32, reason: String },
    /// An unlock attempt disclosed contact fields.
    UnlockSucceeded {
        person_id: String,
        email_found: bool,
        phone_found: bool,
    },
    /// An unlock attempt recovered nothing.
    UnlockFailed { person_id: String },
    /// The run finished.
    RunComplete {
        run_id: String,
        pages: u32,
        records: usize,
        degraded: bool,
    },
}

pub type EventSender = tokio::sync::broadcast::Sender<RunEvent>;
pub type EventReceiver = tokio::sync::broadcast::Receiver<RunEvent>;

/// Create the run event channel.
///
/// 256 buffered events cover a full run at the default ceilings (one page
/// event per page, one unlock event per record); a lagging reader loses
/// oldest first.
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Send an event, ignoring the error when nobody is subscribed.
pub fn emit(sender: &EventSender, event: RunEvent) {
    let _ = sender.send(event);
}
