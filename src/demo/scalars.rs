//! Custom scalars used by the demo schema.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{RegistryError, ScalarError};
use crate::resolver::sync_resolver;
use crate::schema_registry::SchemaRegistry;
use crate::types::{CustomScalar, FieldDescriptor, ScalarType, TypeDescriptor};
use crate::value::Resolved;

use super::employee::Employee;
use super::store::Store;

fn expect_str<'v>(value: &'v Value, scalar: &str) -> Result<&'v str, ScalarError> {
    value
        .as_str()
        .ok_or_else(|| ScalarError(format!("expected a string for {scalar}, got {value}")))
}

/// A currency-qualified amount, written as `"123.45 USD"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Money {
    pub cents: i64,
    pub currency: String,
}

impl Money {
    pub fn usd(amount: f64) -> Self {
        Money {
            cents: (amount * 100.0).round() as i64,
            currency: "USD".to_string(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{sign}{}.{:02} {}", abs / 100, abs % 100, self.currency)
    }
}

impl CustomScalar for Money {
    const NAME: &'static str = "Money";
    const DESCRIPTION: Option<&'static str> = Some("Amount with currency, e.g. \"123.45 USD\"");

    fn serialize(&self) -> Result<Value, ScalarError> {
        Ok(Value::String(self.to_string()))
    }

    fn parse_value(value: &Value) -> Result<Self, ScalarError> {
        let text = expect_str(value, Self::NAME)?;
        let invalid = || ScalarError(format!("invalid Money value `{text}`"));
        let (amount, currency) = text.trim().split_once(' ').ok_or_else(invalid)?;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(invalid());
        }
        let (negative, amount) = match amount.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, amount),
        };
        let (whole, fraction) = amount.split_once('.').unwrap_or((amount, "0"));
        if whole.is_empty()
            || fraction.is_empty()
            || fraction.len() > 2
            || !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let fraction: i64 = format!("{fraction:0<2}").parse().map_err(|_| invalid())?;
        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(fraction))
            .ok_or_else(invalid)?;
        Ok(Money {
            cents: if negative { -cents } else { cents },
            currency: currency.to_string(),
        })
    }
}

impl Serialize for Money {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// `#RGB` or `#RRGGBB`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HexColor(pub String);

impl CustomScalar for HexColor {
    const NAME: &'static str = "HexColor";
    const DESCRIPTION: Option<&'static str> = Some("Hexadecimal color, e.g. #FF0000");

    fn serialize(&self) -> Result<Value, ScalarError> {
        Ok(Value::String(self.0.clone()))
    }

    fn parse_value(value: &Value) -> Result<Self, ScalarError> {
        let text = expect_str(value, Self::NAME)?;
        let valid = matches!(text.len(), 4 | 7)
            && text.starts_with('#')
            && text[1..].chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(ScalarError(format!("invalid hex color format: {text}")));
        }
        Ok(HexColor(text.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmailAddress(pub String);

impl CustomScalar for EmailAddress {
    const NAME: &'static str = "EmailAddress";
    const DESCRIPTION: Option<&'static str> = Some("Valid email address");

    fn serialize(&self) -> Result<Value, ScalarError> {
        Ok(Value::String(self.0.clone()))
    }

    fn parse_value(value: &Value) -> Result<Self, ScalarError> {
        let text = expect_str(value, Self::NAME)?;
        let valid = match text.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
            }
            None => false,
        };
        if !valid {
            return Err(ScalarError(format!("invalid email address: {text}")));
        }
        Ok(EmailAddress(text.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmployeeId(pub String);

impl CustomScalar for EmployeeId {
    const NAME: &'static str = "EmployeeID";
    const DESCRIPTION: Option<&'static str> = Some("Unique identifier for employees");

    fn serialize(&self) -> Result<Value, ScalarError> {
        Ok(Value::String(self.0.clone()))
    }

    fn parse_value(value: &Value) -> Result<Self, ScalarError> {
        match expect_str(value, Self::NAME)? {
            "" => Err(ScalarError::new("EmployeeID cannot be empty")),
            text => Ok(EmployeeId(text.to_string())),
        }
    }
}

/// RFC 3339 timestamp in UTC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Timestamp(Utc::now())
    }
}

impl CustomScalar for Timestamp {
    const NAME: &'static str = "DateTime";
    const DESCRIPTION: Option<&'static str> = Some("RFC 3339 date and time");

    fn serialize(&self) -> Result<Value, ScalarError> {
        Ok(Value::String(
            self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        ))
    }

    fn parse_value(value: &Value) -> Result<Self, ScalarError> {
        let text = expect_str(value, Self::NAME)?;
        DateTime::parse_from_rfc3339(text)
            .map(|parsed| Timestamp(parsed.with_timezone(&Utc)))
            .map_err(|e| ScalarError(format!("invalid DateTime `{text}`: {e}")))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

#[derive(Clone, Debug, Serialize)]
struct ColoredProduct {
    id: String,
    name: String,
    price: Money,
    color: HexColor,
}

pub(super) fn register(
    registry: &mut SchemaRegistry,
    employees: Arc<Store<Employee>>,
) -> Result<(), RegistryError> {
    registry.register_scalar(ScalarType::of::<Money>())?;
    registry.register_scalar(ScalarType::of::<HexColor>())?;
    registry.register_scalar(ScalarType::of::<EmailAddress>())?;
    registry.register_scalar(ScalarType::of::<EmployeeId>())?;
    registry.register_scalar(ScalarType::of::<Timestamp>())?;

    registry.register_type(
        TypeDescriptor::object("ColoredProduct")
            .field(FieldDescriptor::new("id", "ID!"))
            .field(FieldDescriptor::new("name", "String!"))
            .field(FieldDescriptor::new("price", "Money!"))
            .field(FieldDescriptor::new("color", "HexColor!")),
    )?;

    registry.register_query(
        FieldDescriptor::new("employeeById", "Employee").param("id", "EmployeeID!"),
        sync_resolver(move |ctx| {
            let id: EmployeeId = ctx.scalar_arg("id")?;
            let id: i64 = id
                .0
                .parse()
                .map_err(|e| format!("invalid employee ID format: {e}"))?;
            let employee = employees
                .get(id)
                .ok_or_else(|| format!("employee with id {id} not found"))?;
            Resolved::object(employee)
        }),
    )?;
    registry.register_query(
        FieldDescriptor::new("currentDateTime", "DateTime!"),
        sync_resolver(|_| Resolved::scalar(&Timestamp::now())),
    )?;
    registry.register_query(
        FieldDescriptor::new("serverStartTime", "DateTime!"),
        sync_resolver(|_| {
            let start = Utc
                .with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
                .single()
                .ok_or("invalid server start time")?;
            Resolved::scalar(&Timestamp(start))
        }),
    )?;
    registry.register_query(
        FieldDescriptor::new("validateEmail", "Boolean!").param("email", "EmailAddress!"),
        sync_resolver(|ctx| {
            let email: EmailAddress = ctx.scalar_arg("email")?;
            Ok(Resolved::from(!email.0.is_empty()))
        }),
    )?;
    registry.register_mutation(
        FieldDescriptor::new("createColoredProduct", "ColoredProduct!")
            .param("name", "String!")
            .param("price", "Money!")
            .param("color", "HexColor!"),
        sync_resolver(|ctx| {
            let product = ColoredProduct {
                id: format!("prod_{}", Utc::now().timestamp()),
                name: ctx.arg("name")?,
                price: ctx.scalar_arg("price")?,
                color: ctx.scalar_arg("color")?,
            };
            Resolved::object(product)
        }),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn money_round_trips() {
        let money = Money::parse_value(&json!("123.45 USD")).unwrap();
        assert_eq!(
            money,
            Money {
                cents: 12345,
                currency: "USD".into()
            }
        );
        assert_eq!(CustomScalar::serialize(&money).unwrap(), json!("123.45 USD"));
        assert_eq!(
            Money::parse_value(&json!("-0.5 EUR")).unwrap().to_string(),
            "-0.50 EUR"
        );
    }

    #[test]
    fn money_rejects_malformed_amounts() {
        for bad in ["123.45", "12.345 USD", "abc USD", "1.00 usd", ".5 USD"] {
            assert!(Money::parse_value(&json!(bad)).is_err(), "{bad} should fail");
        }
        assert!(Money::parse_value(&json!(12345)).is_err());
    }

    #[test]
    fn validates_colors_and_emails() {
        assert!(HexColor::parse_value(&json!("#FF0000")).is_ok());
        assert!(HexColor::parse_value(&json!("#f00")).is_ok());
        assert!(HexColor::parse_value(&json!("FF0000")).is_err());
        assert!(HexColor::parse_value(&json!("#GG0000")).is_err());

        assert!(EmailAddress::parse_value(&json!("jane@example.com")).is_ok());
        assert!(EmailAddress::parse_value(&json!("jane@example")).is_err());
        assert!(EmailAddress::parse_value(&json!("@example.com")).is_err());
        assert!(EmailAddress::parse_value(&json!("a@b@c.com")).is_err());
    }

    #[test]
    fn date_times_normalize_to_utc() {
        let parsed = Timestamp::parse_value(&json!("2024-01-01T14:00:00+02:00")).unwrap();
        assert_eq!(
            CustomScalar::serialize(&parsed).unwrap(),
            json!("2024-01-01T12:00:00Z")
        );
    }
}
