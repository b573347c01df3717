use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::query::{Pagination, Sort};
use super::{non_blank, nullable, ValidationError};

/// Visit dates are pinned to 19:00 UTC, which is noon on the US Pacific
/// coast, so the calendar day survives any client-side timezone shift.
pub const VISIT_DATE_UTC_HOUR: u32 = 19;

/// Upper bound of a `NUMERIC(10, 2)` column.
const MAX_PRICE: i64 = 100_000_000;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub id: i32,
    pub client_id: i32,
    pub date: DateTime<Utc>,
    pub service: Option<String>,
    pub formula: Option<String>,
    pub price: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Prices arrive either as `"42.50"` or as a bare JSON number.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PriceInput {
    Text(String),
    Number(serde_json::Number),
}

impl PriceInput {
    fn into_text(self) -> String {
        match self {
            PriceInput::Text(text) => text,
            PriceInput::Number(number) => number.to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVisitRequest {
    pub client_id: i32,
    pub date: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub price: Option<PriceInput>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewVisit {
    pub client_id: i32,
    pub date: DateTime<Utc>,
    pub service: Option<String>,
    pub formula: Option<String>,
    pub price: Option<BigDecimal>,
    pub notes: Option<String>,
}

impl TryFrom<NewVisitRequest> for NewVisit {
    type Error = ValidationError;

    fn try_from(request: NewVisitRequest) -> Result<Self, Self::Error> {
        Ok(NewVisit {
            client_id: request.client_id,
            date: normalize_visit_date(&request.date)?,
            service: non_blank(request.service),
            formula: non_blank(request.formula),
            price: parse_price(request.price)?,
            notes: non_blank(request.notes),
        })
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitUpdateRequest {
    #[serde(default)]
    pub client_id: Option<i32>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub service: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub formula: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub price: Option<Option<PriceInput>>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisitUpdate {
    pub client_id: Option<i32>,
    pub date: Option<DateTime<Utc>>,
    pub service: Option<Option<String>>,
    pub formula: Option<Option<String>>,
    pub price: Option<Option<BigDecimal>>,
    pub notes: Option<Option<String>>,
}

impl TryFrom<VisitUpdateRequest> for VisitUpdate {
    type Error = ValidationError;

    fn try_from(request: VisitUpdateRequest) -> Result<Self, Self::Error> {
        Ok(VisitUpdate {
            client_id: request.client_id,
            date: request
                .date
                .as_deref()
                .map(normalize_visit_date)
                .transpose()?,
            service: request.service.map(non_blank),
            formula: request.formula.map(non_blank),
            price: request.price.map(parse_price).transpose()?,
            notes: request.notes.map(non_blank),
        })
    }
}

impl VisitUpdate {
    pub fn is_empty(&self) -> bool {
        *self == VisitUpdate::default()
    }

    pub fn apply_to(self, visit: &mut Visit) {
        if let Some(client_id) = self.client_id {
            visit.client_id = client_id;
        }
        if let Some(date) = self.date {
            visit.date = date;
        }
        if let Some(service) = self.service {
            visit.service = service;
        }
        if let Some(formula) = self.formula {
            visit.formula = formula;
        }
        if let Some(price) = self.price {
            visit.price = price.as_ref().map(format_price);
        }
        if let Some(notes) = self.notes {
            visit.notes = notes;
        }
    }
}

/// Keeps the calendar day of `raw` (anything before a `T` is the date) and
/// pins the time to [`VISIT_DATE_UTC_HOUR`].
pub fn normalize_visit_date(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    let day = raw.split('T').next().unwrap_or_default().trim();

    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(VISIT_DATE_UTC_HOUR, 0, 0))
        .map(|datetime| datetime.and_utc())
        .ok_or_else(|| ValidationError(format!("Invalid date: {}", raw)))
}

fn parse_price(input: Option<PriceInput>) -> Result<Option<BigDecimal>, ValidationError> {
    let Some(text) = non_blank(input.map(PriceInput::into_text)) else {
        return Ok(None);
    };

    let price = BigDecimal::from_str(&text)
        .map_err(|_| ValidationError(format!("Invalid price: {}", text)))?
        .with_scale_round(2, RoundingMode::HalfUp);

    if price < BigDecimal::from(0) || price >= BigDecimal::from(MAX_PRICE) {
        return Err(ValidationError(format!("Price out of range: {}", text)));
    }

    Ok(Some(price))
}

/// Currency text with exactly two fractional digits.
pub fn format_price(price: &BigDecimal) -> String {
    price.with_scale_round(2, RoundingMode::HalfUp).to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisitSortField {
    Id,
    ClientId,
    Date,
    Service,
    Formula,
    Price,
    Notes,
    CreatedAt,
}

impl VisitSortField {
    pub fn parse(name: &str) -> Option<Self> {
        let field = match name {
            "id" => VisitSortField::Id,
            "clientId" => VisitSortField::ClientId,
            "date" => VisitSortField::Date,
            "service" => VisitSortField::Service,
            "formula" => VisitSortField::Formula,
            "price" => VisitSortField::Price,
            "notes" => VisitSortField::Notes,
            "createdAt" => VisitSortField::CreatedAt,
            _ => return None,
        };

        Some(field)
    }

    pub fn column(&self) -> &'static str {
        match self {
            VisitSortField::Id => "id",
            VisitSortField::ClientId => "client_id",
            VisitSortField::Date => "date",
            VisitSortField::Service => "service",
            VisitSortField::Formula => "formula",
            VisitSortField::Price => "price",
            VisitSortField::Notes => "notes",
            VisitSortField::CreatedAt => "created_at",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(
            self,
            VisitSortField::Service | VisitSortField::Formula | VisitSortField::Notes
        )
    }
}

#[derive(Clone, Debug, Default)]
pub struct VisitListParams {
    pub client_id: Option<i32>,
    pub search: Option<String>,
    pub sort: Option<Sort<VisitSortField>>,
    pub pagination: Option<Pagination>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_only_is_pinned_to_pacific_noon() {
        let date = normalize_visit_date("2024-01-10").unwrap();
        assert_eq!(date.to_rfc3339(), "2024-01-10T19:00:00+00:00");
    }

    #[test]
    fn time_portion_is_discarded() {
        let date = normalize_visit_date("2024-01-10T23:45:00.000Z").unwrap();
        assert_eq!(date.to_rfc3339(), "2024-01-10T19:00:00+00:00");
    }

    #[test]
    fn garbage_date_is_rejected() {
        assert!(normalize_visit_date("next tuesday").is_err());
        assert!(normalize_visit_date("2024-02-30").is_err());
    }

    #[test]
    fn price_is_rounded_to_cents() {
        let price = parse_price(Some(PriceInput::Text("42.5".to_string()))).unwrap();
        assert_eq!(price.as_ref().map(format_price).as_deref(), Some("42.50"));

        let price = parse_price(Some(PriceInput::Text("19.999".to_string()))).unwrap();
        assert_eq!(price.as_ref().map(format_price).as_deref(), Some("20.00"));
    }

    #[test]
    fn numeric_price_is_accepted() {
        let request: NewVisitRequest =
            serde_json::from_str(r#"{"clientId": 1, "date": "2024-01-10", "price": 75}"#).unwrap();
        let visit = NewVisit::try_from(request).unwrap();

        assert_eq!(visit.price.as_ref().map(format_price).as_deref(), Some("75.00"));
    }

    #[test]
    fn bad_prices_are_rejected() {
        assert!(parse_price(Some(PriceInput::Text("cheap".to_string()))).is_err());
        assert!(parse_price(Some(PriceInput::Text("-1".to_string()))).is_err());
        assert!(parse_price(Some(PriceInput::Text("100000000".to_string()))).is_err());
        assert_eq!(parse_price(Some(PriceInput::Text(" ".to_string()))), Ok(None));
    }

    #[test]
    fn update_can_clear_price() {
        let request: VisitUpdateRequest = serde_json::from_str(r#"{"price": null}"#).unwrap();
        let update = VisitUpdate::try_from(request).unwrap();

        assert_eq!(update.price, Some(None));
        assert!(!update.is_empty());
    }
}
