use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::query::{Pagination, Sort};
use super::{non_blank, nullable, require_text, ValidationError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    #[default]
    Active,
    Inactive,
    New,
}

impl ClientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientStatus::Active => "active",
            ClientStatus::Inactive => "inactive",
            ClientStatus::New => "new",
        }
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ClientStatus::Active),
            "inactive" => Ok(ClientStatus::Inactive),
            "new" => Ok(ClientStatus::New),
            other => Err(ValidationError(format!("Invalid status: {}", other))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub notes: Option<String>,
    pub status: ClientStatus,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClient {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: Option<ClientStatus>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl NewClient {
    pub fn validated(self) -> Result<Self, ValidationError> {
        Ok(NewClient {
            first_name: require_text("firstName", &self.first_name)?,
            last_name: require_text("lastName", &self.last_name)?,
            phone: require_text("phone", &self.phone)?,
            email: non_blank(self.email),
            address: non_blank(self.address),
            city: non_blank(self.city),
            zip: non_blank(self.zip),
            notes: non_blank(self.notes),
            status: self.status,
            photo_url: non_blank(self.photo_url),
        })
    }
}

/// Partial update. Outer `None` leaves a field untouched; for nullable
/// columns `Some(None)` clears it.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientUpdate {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub city: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub zip: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<ClientStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub photo_url: Option<Option<String>>,
}

impl ClientUpdate {
    pub fn is_empty(&self) -> bool {
        *self == ClientUpdate::default()
    }

    pub fn validated(self) -> Result<Self, ValidationError> {
        Ok(ClientUpdate {
            first_name: self
                .first_name
                .map(|v| require_text("firstName", &v))
                .transpose()?,
            last_name: self
                .last_name
                .map(|v| require_text("lastName", &v))
                .transpose()?,
            phone: self.phone.map(|v| require_text("phone", &v)).transpose()?,
            email: self.email.map(non_blank),
            address: self.address.map(non_blank),
            city: self.city.map(non_blank),
            zip: self.zip.map(non_blank),
            notes: self.notes.map(non_blank),
            status: self.status,
            photo_url: self.photo_url.map(non_blank),
        })
    }

    /// Merges the provided fields onto `client`.
    pub fn apply_to(self, client: &mut Client) {
        if let Some(first_name) = self.first_name {
            client.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            client.last_name = last_name;
        }
        if let Some(phone) = self.phone {
            client.phone = phone;
        }
        if let Some(email) = self.email {
            client.email = email;
        }
        if let Some(address) = self.address {
            client.address = address;
        }
        if let Some(city) = self.city {
            client.city = city;
        }
        if let Some(zip) = self.zip {
            client.zip = zip;
        }
        if let Some(notes) = self.notes {
            client.notes = notes;
        }
        if let Some(status) = self.status {
            client.status = status;
        }
        if let Some(photo_url) = self.photo_url {
            client.photo_url = photo_url;
        }
    }

    pub fn photo(url: String) -> Self {
        ClientUpdate {
            photo_url: Some(Some(url)),
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientSortField {
    Id,
    FirstName,
    LastName,
    Phone,
    Email,
    Address,
    City,
    Zip,
    Notes,
    Status,
    PhotoUrl,
    CreatedAt,
}

impl ClientSortField {
    /// Accepts the camelCase names used on the wire. Unknown names yield
    /// `None` so callers fall back to the default ordering.
    pub fn parse(name: &str) -> Option<Self> {
        let field = match name {
            "id" => ClientSortField::Id,
            "firstName" => ClientSortField::FirstName,
            "lastName" => ClientSortField::LastName,
            "phone" => ClientSortField::Phone,
            "email" => ClientSortField::Email,
            "address" => ClientSortField::Address,
            "city" => ClientSortField::City,
            "zip" => ClientSortField::Zip,
            "notes" => ClientSortField::Notes,
            "status" => ClientSortField::Status,
            "photoUrl" => ClientSortField::PhotoUrl,
            "createdAt" => ClientSortField::CreatedAt,
            _ => return None,
        };

        Some(field)
    }

    pub fn column(&self) -> &'static str {
        match self {
            ClientSortField::Id => "id",
            ClientSortField::FirstName => "first_name",
            ClientSortField::LastName => "last_name",
            ClientSortField::Phone => "phone",
            ClientSortField::Email => "email",
            ClientSortField::Address => "address",
            ClientSortField::City => "city",
            ClientSortField::Zip => "zip",
            ClientSortField::Notes => "notes",
            ClientSortField::Status => "status",
            ClientSortField::PhotoUrl => "photo_url",
            ClientSortField::CreatedAt => "created_at",
        }
    }

    pub fn is_text(&self) -> bool {
        !matches!(self, ClientSortField::Id | ClientSortField::CreatedAt)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ClientListParams {
    pub search: Option<String>,
    pub status: Option<ClientStatus>,
    pub sort: Option<Sort<ClientSortField>>,
    pub pagination: Option<Pagination>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_tells_null_from_missing() {
        let update: ClientUpdate =
            serde_json::from_str(r#"{"email": null, "city": "Springfield"}"#).unwrap();

        assert_eq!(update.email, Some(None));
        assert_eq!(update.city, Some(Some("Springfield".to_string())));
        assert_eq!(update.zip, None);
        assert!(!update.is_empty());
        assert!(serde_json::from_str::<ClientUpdate>("{}").unwrap().is_empty());
    }

    #[test]
    fn update_ignores_immutable_fields() {
        let update: ClientUpdate =
            serde_json::from_str(r#"{"id": 99, "createdAt": "2020-01-01T00:00:00Z"}"#).unwrap();

        assert!(update.is_empty());
    }

    #[test]
    fn new_client_requires_non_blank_names() {
        let client = NewClient {
            first_name: "  ".to_string(),
            last_name: "Lee".to_string(),
            phone: "555-0001".to_string(),
            ..Default::default()
        };

        assert_eq!(
            client.validated().unwrap_err(),
            ValidationError("firstName is required".to_string())
        );
    }

    #[test]
    fn new_client_blanks_become_null() {
        let client = NewClient {
            first_name: "Ann".to_string(),
            last_name: "Lee".to_string(),
            phone: "555-0001".to_string(),
            email: Some("".to_string()),
            ..Default::default()
        }
        .validated()
        .unwrap();

        assert_eq!(client.email, None);
    }

    #[test]
    fn status_rejects_unknown_values() {
        assert!(serde_json::from_str::<ClientStatus>(r#""vip""#).is_err());
        assert_eq!("new".parse::<ClientStatus>(), Ok(ClientStatus::New));
    }

    #[test]
    fn sort_field_parses_wire_names() {
        assert_eq!(ClientSortField::parse("lastName"), Some(ClientSortField::LastName));
        assert_eq!(ClientSortField::parse("last_name"), None);
        assert_eq!(ClientSortField::parse("photoUrl").map(|f| f.column()), Some("photo_url"));
    }
}
