use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{Order, OrderStatus};

/// A vendor/admin action on an order's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderAction {
    Accept,
    Reject,
    StartPreparing,
    MarkReady,
    Dispatch,
    MarkDelivered,
    Cancel,
    /// Cash / pay-at-hotel only. Collecting payment is also delivery.
    CollectPayment,
}

impl OrderAction {
    pub const ALL: [OrderAction; 8] = [
        OrderAction::Accept,
        OrderAction::Reject,
        OrderAction::StartPreparing,
        OrderAction::MarkReady,
        OrderAction::Dispatch,
        OrderAction::MarkDelivered,
        OrderAction::Cancel,
        OrderAction::CollectPayment,
    ];
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderAction::Accept => "accept",
            OrderAction::Reject => "reject",
            OrderAction::StartPreparing => "start-preparing",
            OrderAction::MarkReady => "mark-ready",
            OrderAction::Dispatch => "dispatch",
            OrderAction::MarkDelivered => "mark-delivered",
            OrderAction::Cancel => "cancel",
            OrderAction::CollectPayment => "collect-payment",
        };
        f.write_str(s)
    }
}

/// Status an action moves the order into, or `None` if the action is not
/// allowed from the order's current state.
pub fn next_status(order: &Order, action: OrderAction) -> Option<OrderStatus> {
    use OrderStatus::*;

    let in_person = order.payment.method.is_collected_in_person();
    match (order.status, action) {
        (Pending, OrderAction::Accept) => Some(Confirmed),
        (Pending, OrderAction::Reject) => Some(Cancelled),
        (Confirmed, OrderAction::StartPreparing) => Some(Preparing),
        (Preparing, OrderAction::MarkReady) => Some(Ready),
        (Ready, OrderAction::Dispatch) => Some(OutForDelivery),
        // unpaid cash orders settle through collect-payment
        (Confirmed | Preparing | Ready | OutForDelivery, OrderAction::MarkDelivered)
            if !in_person || order.cash_collected =>
        {
            Some(Delivered)
        }
        (status, OrderAction::Cancel) if !status.is_terminal() => Some(Cancelled),
        (status, OrderAction::CollectPayment)
            if in_person && !status.is_terminal() && !order.cash_collected =>
        {
            Some(Delivered)
        }
        _ => None,
    }
}
