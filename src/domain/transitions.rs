//! Static transition tables of the payment status machine.
//!
//! Three tables, all keyed by canonical status:
//! - `valid_transitions(from)`: the only legal moves.
//! - `ignorable_transitions(from)`: requested moves that are accepted as
//!   no-ops (duplicate or stale provider notifications).
//! - `unsafe_invalid_transitions_to(to)`: invalid moves into `to` that would
//!   imply a change in custody of funds and therefore must never be swallowed.

use super::status::PaymentStatus;
use super::status::PaymentStatus::*;

pub fn valid_transitions(from: PaymentStatus) -> &'static [PaymentStatus] {
    match from {
        Creating => &[
            PendingAuthorize,
            Authorized,
            PendingCapture,
            Successful,
            Rejected,
            Error,
            PendingClientAction,
            Cancelled,
        ],
        PendingAuthorize => &[
            Authorized,
            PendingCapture,
            Successful,
            Rejected,
            Error,
            PendingCancel,
            Cancelled,
        ],
        Authorized => &[PendingCapture, Successful, PendingCancel, Cancelled],
        PendingCapture => &[Successful, PendingCancel, Cancelled, Rejected],
        Successful => &[
            PartialRefund,
            Refunded,
            PendingCancel,
            Cancelled,
            InMediation,
            ChargedBack,
        ],
        PartialRefund => &[Refunded, InMediation, ChargedBack, PendingCancel, Cancelled],
        InMediation => &[Successful, ChargedBack, Refunded],
        PendingCancel => &[Cancelled, Refunded],
        PendingClientAction => &[
            PendingExecute,
            PendingAuthorize,
            Authorized,
            Successful,
            Rejected,
            Error,
            Cancelled,
            PendingCancel,
        ],
        PendingExecute => &[
            Successful,
            PendingAuthorize,
            Authorized,
            PendingCapture,
            Rejected,
            Error,
            Cancelled,
        ],
        Cancelled | Rejected | Error | ChargedBack | Refunded => &[],
    }
}

pub fn ignorable_transitions(from: PaymentStatus) -> &'static [PaymentStatus] {
    match from {
        Creating => &[Creating],
        PendingAuthorize => &[PendingAuthorize],
        Authorized => &[Authorized, PendingAuthorize],
        PendingCapture => &[PendingCapture, PendingAuthorize, Authorized],
        Successful => &[Successful, PendingAuthorize, Authorized, PendingCapture],
        PartialRefund => &[
            PartialRefund,
            Successful,
            PendingAuthorize,
            Authorized,
            PendingCapture,
        ],
        InMediation => &[InMediation],
        PendingCancel => &[
            PendingCancel,
            PendingAuthorize,
            Authorized,
            PendingCapture,
            Successful,
        ],
        Cancelled => &[
            Cancelled,
            PendingCancel,
            PendingAuthorize,
            Authorized,
            PendingCapture,
            Rejected,
        ],
        Rejected => &[Rejected, PendingAuthorize, Error],
        Error => &[Error],
        ChargedBack => &[ChargedBack, InMediation, Successful],
        Refunded => &[Refunded, PendingCancel, Cancelled, Successful, PartialRefund],
        PendingClientAction => &[PendingClientAction],
        PendingExecute => &[PendingExecute, PendingClientAction],
    }
}

/// Source statuses from which an (invalid) move into `to` is dangerous.
pub fn unsafe_invalid_transitions_to(to: PaymentStatus) -> &'static [PaymentStatus] {
    match to {
        Authorized => &[Rejected, Refunded, ChargedBack, Error],
        Successful => &[Rejected, Cancelled, Error],
        PendingCapture => &[Rejected, Error],
        Cancelled => &[InMediation],
        ChargedBack => &[Authorized, PendingAuthorize, PendingCapture, PendingCancel],
        Refunded => &[Authorized, PendingAuthorize, PendingCapture],
        PendingExecute => &[Rejected, Cancelled, Error, Refunded, ChargedBack],
        _ => &[],
    }
}

pub fn can_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
    valid_transitions(from).contains(&to)
}

pub fn should_ignore_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
    ignorable_transitions(from).contains(&to)
}

pub fn is_unsafe_invalid_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
    unsafe_invalid_transitions_to(to).contains(&from)
}
