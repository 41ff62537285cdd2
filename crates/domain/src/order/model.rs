use chrono::{DateTime, Utc};
use common::{OrderId, OrderStatus, PaymentMethod, TableNumber, UserId};
use serde::{Deserialize, Serialize};

use super::{
    LineItem, Menu, Money, OrderError, OrderItem,
    transitions::{self, Actor, TransitionContext, TransitionOutcome},
};

/// Input for placing a new order.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub table_number: TableNumber,
    pub user_id: UserId,
    pub email: Option<String>,
    pub payment_method: PaymentMethod,
    pub items: Vec<LineItem>,
}

/// An order placed from a table.
///
/// Items and prices are fixed at placement; only the status changes
/// afterwards, and only through [`Order::transition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    table_number: TableNumber,
    user_id: UserId,
    email: Option<String>,
    status: OrderStatus,
    payment_method: PaymentMethod,
    items: Vec<OrderItem>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Prices the requested lines against the menu and creates a pending order.
    pub fn place(id: OrderId, cmd: PlaceOrder, menu: &Menu) -> Result<Self, OrderError> {
        if cmd.items.is_empty() {
            return Err(OrderError::NoItems);
        }

        let items = cmd
            .items
            .iter()
            .map(|line| {
                if line.quantity == 0 {
                    return Err(OrderError::InvalidQuantity {
                        menu_item_id: line.menu_item_id,
                        quantity: line.quantity,
                    });
                }
                let menu_item = menu
                    .get(line.menu_item_id)
                    .ok_or(OrderError::UnknownMenuItem(line.menu_item_id))?;
                Ok(OrderItem {
                    menu_item_id: menu_item.id,
                    name: menu_item.name.clone(),
                    quantity: line.quantity,
                    unit_price: menu_item.price,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if checked_total(&items).is_none() {
            return Err(OrderError::AmountOverflow);
        }

        let now = Utc::now();
        Ok(Self {
            id,
            table_number: cmd.table_number,
            user_id: cmd.user_id,
            email: cmd.email,
            status: OrderStatus::Pending,
            payment_method: cmd.payment_method,
            items,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuilds an order from stored fields.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: OrderId,
        table_number: TableNumber,
        user_id: UserId,
        email: Option<String>,
        status: OrderStatus,
        payment_method: PaymentMethod,
        items: Vec<OrderItem>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            table_number,
            user_id,
            email,
            status,
            payment_method,
            items,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn table_number(&self) -> &TableNumber {
        &self.table_number
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Sum of `unit_price * quantity` over all items.
    ///
    /// Placement rejects orders whose total does not fit, so this only
    /// saturates for rows written by something else.
    pub fn total(&self) -> Money {
        checked_total(&self.items).unwrap_or(Money::from_minor(i64::MAX))
    }

    /// Validates a status change without applying it.
    pub fn check_transition(
        &self,
        actor: &Actor,
        to: OrderStatus,
    ) -> Result<TransitionOutcome, OrderError> {
        let ctx = TransitionContext {
            status: self.status,
            owner: &self.user_id,
            payment_method: self.payment_method,
        };
        transitions::validate(actor, &ctx, to)
    }

    /// Validates and applies a status change in memory.
    ///
    /// Persisting the change is the caller's job and must be conditional on
    /// the status this order was loaded with.
    pub fn transition(
        &mut self,
        actor: &Actor,
        to: OrderStatus,
    ) -> Result<TransitionOutcome, OrderError> {
        let outcome = self.check_transition(actor, to)?;
        if outcome.is_applied() {
            self.status = to;
            self.updated_at = Utc::now();
        }
        Ok(outcome)
    }
}

fn checked_total(items: &[OrderItem]) -> Option<Money> {
    Money::checked_sum(items.iter().map(OrderItem::total_price))
}
