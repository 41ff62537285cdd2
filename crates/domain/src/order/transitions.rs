//! Order state machine: allowed edges and who may drive them.
//!
//! ```text
//! pending ──┬──► paid ──┬──► in_progress ──► ready ──► delivered
//!           │           └──► refunded
//!           └──► cancelled
//!
//! pending | paid | in_progress | ready ──► failed
//! ```
//!
//! Every attempt is checked against the actor's permissions first and the
//! graph second. Terminal statuses have no outgoing edges.

use common::{OrderStatus, PaymentMethod, StaffRole, UserId};

use super::OrderError;

/// Who is asking for a status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// The guest who placed the order.
    Owner(UserId),
    /// Restaurant staff acting under a role.
    Staff(StaffRole),
    /// Payment gateway callback (webhook) or payment service failure.
    PaymentGateway,
    /// Unrecoverable processing error raised by the platform itself.
    System,
    /// A status change already authorized elsewhere, received through the fan-out.
    Replica,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::Owner(_) => "owner",
            Actor::Staff(StaffRole::Chef) => "chef",
            Actor::Staff(StaffRole::Waiter) => "waiter",
            Actor::PaymentGateway => "payment_gateway",
            Actor::System => "system",
            Actor::Replica => "replica",
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a permitted transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The status moved along an edge of the graph.
    Applied { from: OrderStatus, to: OrderStatus },
    /// A replica re-applied the status the order already has.
    Unchanged,
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }
}

/// Returns the statuses reachable from `from` in one step.
pub fn allowed_targets(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match from {
        Pending => &[Paid, Cancelled, Failed],
        Paid => &[InProgress, Refunded, Failed],
        InProgress => &[Ready, Failed],
        Ready => &[Delivered, Failed],
        Delivered | Cancelled | Failed | Refunded => &[],
    }
}

/// Returns true if `from → to` is an edge of the graph.
pub fn is_allowed_edge(from: OrderStatus, to: OrderStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// Returns true if `to` can be reached from `from` in one or more steps.
///
/// A mirror that missed intermediate changes uses this to catch up without
/// ever moving backwards.
pub fn is_reachable(from: OrderStatus, to: OrderStatus) -> bool {
    allowed_targets(from)
        .iter()
        .any(|&next| next == to || is_reachable(next, to))
}

/// Statuses a staff role may write. Checked before every staff transition.
pub fn role_permissions(role: StaffRole) -> &'static [OrderStatus] {
    match role {
        StaffRole::Chef => &[
            OrderStatus::InProgress,
            OrderStatus::Ready,
            OrderStatus::Failed,
            OrderStatus::Refunded,
        ],
        StaffRole::Waiter => &[OrderStatus::Delivered, OrderStatus::Paid],
    }
}

/// The facts about an order that authorization depends on.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    pub status: OrderStatus,
    pub owner: &'a UserId,
    pub payment_method: PaymentMethod,
}

/// Checks whether `actor` may move an order to `to`, regardless of the graph.
pub fn authorize(
    actor: &Actor,
    ctx: &TransitionContext<'_>,
    to: OrderStatus,
) -> Result<(), OrderError> {
    let denied = |reason: &'static str| OrderError::PermissionDenied {
        actor: actor.as_str(),
        to,
        reason,
    };

    match actor {
        Actor::Owner(user_id) => {
            if user_id != ctx.owner {
                return Err(denied("order belongs to another user"));
            }
            if !matches!(to, OrderStatus::Cancelled | OrderStatus::Refunded) {
                return Err(denied("owners may only cancel or refund"));
            }
        }
        Actor::Staff(role) => authorize_staff(*role, ctx.payment_method, to)?,
        Actor::PaymentGateway => {
            if !matches!(
                to,
                OrderStatus::Paid | OrderStatus::Cancelled | OrderStatus::Failed
            ) {
                return Err(denied("gateway may only settle or fail an order"));
            }
        }
        Actor::System => {
            if to != OrderStatus::Failed {
                return Err(denied("system may only fail an order"));
            }
        }
        Actor::Replica => {}
    }
    Ok(())
}

/// Checks the static role map for a staff member. Staff may act on any
/// guest's order.
fn authorize_staff(
    role: StaffRole,
    payment_method: PaymentMethod,
    to: OrderStatus,
) -> Result<(), OrderError> {
    let denied = |reason: &'static str| OrderError::PermissionDenied {
        actor: Actor::Staff(role).as_str(),
        to,
        reason,
    };

    if !role_permissions(role).contains(&to) {
        return Err(denied("status not permitted for role"));
    }
    if role == StaffRole::Waiter && to == OrderStatus::Paid && payment_method != PaymentMethod::Cash
    {
        return Err(denied("waiters confirm payment for cash orders only"));
    }
    Ok(())
}

/// Checks the graph for a status change already authorized for `actor`.
pub fn check_edge(
    actor: &Actor,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<TransitionOutcome, OrderError> {
    if from == to && *actor == Actor::Replica {
        return Ok(TransitionOutcome::Unchanged);
    }
    if !is_allowed_edge(from, to) {
        return Err(OrderError::InvalidTransition { from, to });
    }
    Ok(TransitionOutcome::Applied { from, to })
}

/// Validates a transition: permission first, then the graph.
pub fn validate(
    actor: &Actor,
    ctx: &TransitionContext<'_>,
    to: OrderStatus,
) -> Result<TransitionOutcome, OrderError> {
    authorize(actor, ctx, to)?;
    check_edge(actor, ctx.status, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(status: OrderStatus, owner: &'a UserId) -> TransitionContext<'a> {
        TransitionContext {
            status,
            owner,
            payment_method: PaymentMethod::Online,
        }
    }

    #[test]
    fn terminal_statuses_have_no_edges() {
        for status in OrderStatus::ALL {
            assert_eq!(status.is_terminal(), allowed_targets(status).is_empty());
        }
    }

    #[test]
    fn no_edge_leads_back_to_pending() {
        for status in OrderStatus::ALL {
            assert!(!is_allowed_edge(status, OrderStatus::Pending));
        }
    }

    #[test]
    fn every_non_terminal_status_can_fail() {
        for status in OrderStatus::ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert!(is_allowed_edge(status, OrderStatus::Failed));
        }
    }

    #[test]
    fn reachability_follows_the_graph_forward_only() {
        use OrderStatus::*;
        assert!(is_reachable(Pending, Delivered));
        assert!(is_reachable(Paid, Ready));
        assert!(is_reachable(Ready, Failed));
        assert!(!is_reachable(InProgress, Refunded));
        assert!(!is_reachable(Ready, Paid));
        assert!(!is_reachable(Paid, Paid));
        for status in OrderStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            assert!(OrderStatus::ALL.into_iter().all(|to| !is_reachable(status, to)));
        }
    }

    #[test]
    fn waiter_cannot_start_cooking() {
        let owner = UserId::from("guest");
        let err = validate(
            &Actor::Staff(StaffRole::Waiter),
            &ctx(OrderStatus::Paid, &owner),
            OrderStatus::InProgress,
        )
        .unwrap_err();
        assert!(matches!(err, OrderError::PermissionDenied { .. }));
    }

    #[test]
    fn chef_cannot_deliver() {
        let owner = UserId::from("guest");
        let err = validate(
            &Actor::Staff(StaffRole::Chef),
            &ctx(OrderStatus::Ready, &owner),
            OrderStatus::Delivered,
        )
        .unwrap_err();
        assert!(matches!(err, OrderError::PermissionDenied { .. }));
    }

    #[test]
    fn chef_marks_ready_from_in_progress() {
        let owner = UserId::from("guest");
        let outcome = validate(
            &Actor::Staff(StaffRole::Chef),
            &ctx(OrderStatus::InProgress, &owner),
            OrderStatus::Ready,
        )
        .unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::Applied {
                from: OrderStatus::InProgress,
                to: OrderStatus::Ready
            }
        );
    }

    #[test]
    fn permission_is_checked_before_graph() {
        // Waiter setting in_progress on a delivered order: both checks fail,
        // permission is reported.
        let owner = UserId::from("guest");
        let err = validate(
            &Actor::Staff(StaffRole::Waiter),
            &ctx(OrderStatus::Delivered, &owner),
            OrderStatus::InProgress,
        )
        .unwrap_err();
        assert!(matches!(err, OrderError::PermissionDenied { .. }));
    }

    #[test]
    fn chef_cannot_skip_cooking() {
        let owner = UserId::from("guest");
        let err = validate(
            &Actor::Staff(StaffRole::Chef),
            &ctx(OrderStatus::Paid, &owner),
            OrderStatus::Ready,
        )
        .unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Paid,
                to: OrderStatus::Ready
            }
        );
    }

    #[test]
    fn waiter_confirms_cash_payment_only() {
        let owner = UserId::from("guest");
        let mut cash = ctx(OrderStatus::Pending, &owner);
        cash.payment_method = PaymentMethod::Cash;
        assert!(validate(&Actor::Staff(StaffRole::Waiter), &cash, OrderStatus::Paid).is_ok());

        let err = validate(
            &Actor::Staff(StaffRole::Waiter),
            &ctx(OrderStatus::Pending, &owner),
            OrderStatus::Paid,
        )
        .unwrap_err();
        assert!(matches!(err, OrderError::PermissionDenied { .. }));
    }

    #[test]
    fn owner_cancels_own_pending_order() {
        let owner = UserId::from("guest");
        let actor = Actor::Owner(owner.clone());
        assert!(
            validate(&actor, &ctx(OrderStatus::Pending, &owner), OrderStatus::Cancelled)
                .unwrap()
                .is_applied()
        );
    }

    #[test]
    fn owner_cannot_cancel_paid_order() {
        let owner = UserId::from("guest");
        let err = validate(
            &Actor::Owner(owner.clone()),
            &ctx(OrderStatus::Paid, &owner),
            OrderStatus::Cancelled,
        )
        .unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));
    }

    #[test]
    fn other_user_cannot_cancel() {
        let owner = UserId::from("guest");
        let err = validate(
            &Actor::Owner(UserId::from("intruder")),
            &ctx(OrderStatus::Pending, &owner),
            OrderStatus::Cancelled,
        )
        .unwrap_err();
        assert!(matches!(err, OrderError::PermissionDenied { .. }));
    }

    #[test]
    fn second_refund_is_invalid_transition() {
        let owner = UserId::from("guest");
        let err = validate(
            &Actor::Owner(owner.clone()),
            &ctx(OrderStatus::Refunded, &owner),
            OrderStatus::Refunded,
        )
        .unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Refunded,
                to: OrderStatus::Refunded
            }
        );
    }

    #[test]
    fn replica_reapplying_status_is_unchanged() {
        let owner = UserId::from("guest");
        let outcome =
            validate(&Actor::Replica, &ctx(OrderStatus::Paid, &owner), OrderStatus::Paid).unwrap();
        assert_eq!(outcome, TransitionOutcome::Unchanged);
    }

    #[test]
    fn replica_cannot_revive_terminal_order() {
        let owner = UserId::from("guest");
        let err = validate(
            &Actor::Replica,
            &ctx(OrderStatus::Cancelled, &owner),
            OrderStatus::Paid,
        )
        .unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));
    }

    #[test]
    fn gateway_may_only_settle_or_fail() {
        let owner = UserId::from("guest");
        let pending = ctx(OrderStatus::Pending, &owner);
        assert!(validate(&Actor::PaymentGateway, &pending, OrderStatus::Paid).is_ok());
        assert!(validate(&Actor::PaymentGateway, &pending, OrderStatus::Failed).is_ok());
        assert!(matches!(
            validate(&Actor::PaymentGateway, &pending, OrderStatus::Refunded),
            Err(OrderError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn system_fails_any_non_terminal_order() {
        let owner = UserId::from("guest");
        for status in OrderStatus::ALL {
            let result = validate(&Actor::System, &ctx(status, &owner), OrderStatus::Failed);
            assert_eq!(result.is_ok(), !status.is_terminal(), "from {status}");
        }
    }
}
