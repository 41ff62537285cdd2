//! Caller identity forwarded by the upstream API gateway.
//!
//! Tokens are verified before requests reach this server; the gateway passes
//! the verified claims on as headers.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::{StaffRole, TableNumber, UserId};
use saga::BuyerDetails;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const TABLE_NUMBER_HEADER: &str = "x-table-number";
pub const FIRST_NAME_HEADER: &str = "x-user-first-name";
pub const LAST_NAME_HEADER: &str = "x-user-last-name";
pub const PHONE_HEADER: &str = "x-user-phone";

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub email: Option<String>,
    /// Raw role claim; guests carry none or a non-staff role.
    pub role: Option<String>,
    /// Table from the guest's session; staff tokens have none.
    pub table_number: Option<TableNumber>,
    pub buyer: BuyerDetails,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl Identity {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let user_id = header(headers, USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;

        // The first hop of x-forwarded-for is the guest's address.
        let customer_ip = header(headers, "x-forwarded-for")
            .and_then(|chain| chain.split(',').next().map(|ip| ip.trim().to_string()));

        Ok(Self {
            user_id: UserId::new(user_id),
            email: header(headers, USER_EMAIL_HEADER),
            role: header(headers, USER_ROLE_HEADER),
            table_number: header(headers, TABLE_NUMBER_HEADER).map(TableNumber::new),
            buyer: BuyerDetails {
                first_name: header(headers, FIRST_NAME_HEADER),
                last_name: header(headers, LAST_NAME_HEADER),
                phone: header(headers, PHONE_HEADER),
                customer_ip,
            },
        })
    }

    /// The caller's staff role, if they have one.
    pub fn staff_role(&self) -> Option<StaffRole> {
        self.role.as_deref().and_then(|role| role.parse().ok())
    }

    pub fn require_staff(&self) -> Result<StaffRole, ApiError> {
        self.staff_role()
            .ok_or_else(|| ApiError::Forbidden("staff role required".to_string()))
    }

    pub fn require_table(&self) -> Result<TableNumber, ApiError> {
        self.table_number
            .clone()
            .ok_or_else(|| ApiError::BadRequest(format!("missing {TABLE_NUMBER_HEADER} header")))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Identity::from_headers(&parts.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_guest_identity() {
        let identity = Identity::from_headers(&headers(&[
            ("x-user-id", "guest-1"),
            ("x-user-email", "guest@example.com"),
            ("x-table-number", "12"),
            ("x-forwarded-for", "10.0.0.7, 172.16.0.1"),
        ]))
        .unwrap();

        assert_eq!(identity.user_id, UserId::from("guest-1"));
        assert_eq!(identity.require_table().unwrap(), TableNumber::from("12"));
        assert_eq!(identity.buyer.customer_ip.as_deref(), Some("10.0.0.7"));
        assert!(identity.require_staff().is_err());
    }

    #[test]
    fn test_staff_role_is_parsed() {
        let identity =
            Identity::from_headers(&headers(&[("x-user-id", "staff-9"), ("x-user-role", "chef")]))
                .unwrap();
        assert_eq!(identity.staff_role(), Some(StaffRole::Chef));
        assert!(matches!(identity.require_table(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_missing_user_is_unauthorized() {
        let err = Identity::from_headers(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }
}
