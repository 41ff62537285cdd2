//! Builds the payment request for a placed order.

use domain::Order;

use crate::{
    messages::{Buyer, CreatePaymentRequest, Product},
    settings::PaymentSettings,
};

/// Buyer details the order itself does not carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuyerDetails {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub customer_ip: Option<String>,
}

/// Prices the order lines in minor units and fills defaults from settings.
pub fn build_payment_request(
    order: &Order,
    buyer: &BuyerDetails,
    settings: &PaymentSettings,
) -> CreatePaymentRequest {
    let products = order
        .items()
        .iter()
        .map(|item| Product {
            name: item.name.clone(),
            unit_price: item.unit_price.to_minor_string(),
            quantity: item.quantity.to_string(),
        })
        .collect();

    CreatePaymentRequest {
        order_id: order.id(),
        notify_url: settings.notify_url.clone(),
        customer_ip: buyer
            .customer_ip
            .clone()
            .unwrap_or_else(|| settings.default_customer_ip.clone()),
        description: format!("Order #{} for table {}", order.id(), order.table_number()),
        currency_code: settings.currency_code.clone(),
        total_amount: order.total().to_minor_string(),
        buyer: Buyer {
            email: order.email().unwrap_or_default().to_string(),
            phone: buyer
                .phone
                .clone()
                .unwrap_or_else(|| settings.default_phone.clone()),
            first_name: buyer.first_name.clone().unwrap_or_default(),
            last_name: buyer.last_name.clone().unwrap_or_default(),
            language: settings.default_language.clone(),
        },
        products,
        table_number: order.table_number().clone(),
        user_id: order.user_id().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderId, PaymentMethod, TableNumber, UserId};
    use domain::{LineItem, Menu, MenuItem, Money, PlaceOrder, order_id_from_description};

    fn order() -> Order {
        Order::place(
            OrderId::new(),
            PlaceOrder {
                table_number: TableNumber::from("5"),
                user_id: UserId::from("guest-1"),
                email: Some("guest@example.com".to_string()),
                payment_method: PaymentMethod::Online,
                items: vec![LineItem::new(1, 2), LineItem::new(2, 3)],
            },
            &Menu::new([
                MenuItem::new(1, "Golonka", Money::from_minor(4250)),
                MenuItem::new(2, "Piwo", Money::from_minor(1199)),
            ]),
        )
        .unwrap()
    }

    #[test]
    fn test_amounts_are_minor_unit_strings() {
        let order = order();
        let request = build_payment_request(&order, &BuyerDetails::default(), &PaymentSettings::default());

        assert_eq!(request.total_amount, (2 * 4250 + 3 * 1199).to_string());
        assert_eq!(request.products[0].unit_price, "4250");
        assert_eq!(request.products[1].quantity, "3");
        assert_eq!(request.validate(), Ok(2 * 4250 + 3 * 1199));
    }

    #[test]
    fn test_description_embeds_order_id() {
        let order = order();
        let request = build_payment_request(&order, &BuyerDetails::default(), &PaymentSettings::default());

        assert_eq!(
            request.description,
            format!("Order #{} for table 5", order.id())
        );
        assert_eq!(order_id_from_description(&request.description), Some(order.id()));
    }

    #[test]
    fn test_buyer_defaults_and_overrides() {
        let order = order();
        let settings = PaymentSettings::default();
        let buyer = BuyerDetails {
            first_name: Some("Anna".into()),
            customer_ip: Some("10.0.0.8".into()),
            ..BuyerDetails::default()
        };

        let request = build_payment_request(&order, &buyer, &settings);

        assert_eq!(request.buyer.email, "guest@example.com");
        assert_eq!(request.buyer.first_name, "Anna");
        assert_eq!(request.buyer.phone, settings.default_phone);
        assert_eq!(request.buyer.language, "pl");
        assert_eq!(request.customer_ip, "10.0.0.8");
        assert_eq!(request.currency_code, "PLN");
    }
}
