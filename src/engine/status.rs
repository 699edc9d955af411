//! Booking status state machine.
//!
//! | from              | transition              | to                |
//! |-------------------|-------------------------|-------------------|
//! | draft             | propose                 | tentative         |
//! | tentative         | send for confirmation   | pending_confirm   |
//! | pending_confirm   | customer accepts        | confirmed         |
//! | pending_confirm   | customer declines       | tentative         |
//! | confirmed         | complete                | complete          |
//! | any               | cycle                   | see [`BookingStatus::cycle`] |
//! | any               | direct set (cascade)    | target            |

use serde::{Deserialize, Serialize};

use crate::model::{BookingStatus, ConfirmationResponse};

/// Order the manual cycle walks through.
const CYCLE_ORDER: [BookingStatus; 3] = [
    BookingStatus::Draft,
    BookingStatus::PendingConfirm,
    BookingStatus::Confirmed,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    Cycle,
    Propose,
    SendForConfirmation,
    Respond(ConfirmationResponse),
    Complete,
    Set(BookingStatus),
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Cycle => "cycle",
            Transition::Propose => "propose",
            Transition::SendForConfirmation => "send for confirmation",
            Transition::Respond(ConfirmationResponse::Accept) => "accept",
            Transition::Respond(ConfirmationResponse::Decline) => "decline",
            Transition::Complete => "complete",
            Transition::Set(_) => "direct set",
        }
    }
}

impl BookingStatus {
    /// Next status in the draft → pending_confirm → confirmed → draft loop.
    ///
    /// `tentative` is not on the loop and re-enters it at `draft`.
    /// `complete` is terminal and stays put. Never fails.
    pub fn cycle(self) -> BookingStatus {
        match CYCLE_ORDER.iter().position(|s| *s == self) {
            Some(i) => CYCLE_ORDER[(i + 1) % CYCLE_ORDER.len()],
            None if self == BookingStatus::Complete => BookingStatus::Complete,
            None => CYCLE_ORDER[0],
        }
    }

    /// Status after `transition`, or `None` if this status is not eligible.
    pub fn apply(self, transition: Transition) -> Option<BookingStatus> {
        use BookingStatus::*;
        match (self, transition) {
            (_, Transition::Cycle) => Some(self.cycle()),
            (_, Transition::Set(target)) => Some(target),
            (Draft, Transition::Propose) => Some(Tentative),
            (Tentative, Transition::SendForConfirmation) => Some(PendingConfirm),
            (PendingConfirm, Transition::Respond(ConfirmationResponse::Accept)) => Some(Confirmed),
            (PendingConfirm, Transition::Respond(ConfirmationResponse::Decline)) => Some(Tentative),
            (Confirmed, Transition::Complete) => Some(Complete),
            _ => None,
        }
    }
}
