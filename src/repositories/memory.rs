use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{Storage, StorageError};
use crate::models::clients::{Client, ClientListParams, ClientSortField, ClientUpdate, NewClient};
use crate::models::query::{
    cmp_nullable, contains_folded, locale_cmp, ListPage, Sort, SortDirection,
};
use crate::models::visits::{
    format_price, NewVisit, Visit, VisitListParams, VisitSortField, VisitUpdate,
};

struct Tables {
    clients: BTreeMap<i32, Client>,
    visits: BTreeMap<i32, Visit>,
    next_client_id: i32,
    next_visit_id: i32,
}

/// Map-backed store for development and tests. All access goes through one
/// lock, so it only makes sense inside a single process.
pub struct MemStorage {
    tables: Mutex<Tables>,
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStorage {
    pub fn new() -> Self {
        MemStorage {
            tables: Mutex::new(Tables {
                clients: BTreeMap::new(),
                visits: BTreeMap::new(),
                next_client_id: 1,
                next_visit_id: 1,
            }),
        }
    }
}

enum SortValue<'a> {
    Int(i32),
    Text(&'a str),
    Time(DateTime<Utc>),
    Decimal(BigDecimal),
}

impl SortValue<'_> {
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Int(a), SortValue::Int(b)) => a.cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => locale_cmp(a, b),
            (SortValue::Time(a), SortValue::Time(b)) => a.cmp(b),
            (SortValue::Decimal(a), SortValue::Decimal(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

fn client_sort_value(client: &Client, field: ClientSortField) -> Option<SortValue<'_>> {
    match field {
        ClientSortField::Id => Some(SortValue::Int(client.id)),
        ClientSortField::FirstName => Some(SortValue::Text(&client.first_name)),
        ClientSortField::LastName => Some(SortValue::Text(&client.last_name)),
        ClientSortField::Phone => Some(SortValue::Text(&client.phone)),
        ClientSortField::Email => client.email.as_deref().map(SortValue::Text),
        ClientSortField::Address => client.address.as_deref().map(SortValue::Text),
        ClientSortField::City => client.city.as_deref().map(SortValue::Text),
        ClientSortField::Zip => client.zip.as_deref().map(SortValue::Text),
        ClientSortField::Notes => client.notes.as_deref().map(SortValue::Text),
        ClientSortField::Status => Some(SortValue::Text(client.status.as_str())),
        ClientSortField::PhotoUrl => client.photo_url.as_deref().map(SortValue::Text),
        ClientSortField::CreatedAt => Some(SortValue::Time(client.created_at)),
    }
}

fn visit_sort_value(visit: &Visit, field: VisitSortField) -> Option<SortValue<'_>> {
    match field {
        VisitSortField::Id => Some(SortValue::Int(visit.id)),
        VisitSortField::ClientId => Some(SortValue::Int(visit.client_id)),
        VisitSortField::Date => Some(SortValue::Time(visit.date)),
        VisitSortField::Service => visit.service.as_deref().map(SortValue::Text),
        VisitSortField::Formula => visit.formula.as_deref().map(SortValue::Text),
        VisitSortField::Price => visit
            .price
            .as_deref()
            .and_then(|price| BigDecimal::from_str(price).ok())
            .map(SortValue::Decimal),
        VisitSortField::Notes => visit.notes.as_deref().map(SortValue::Text),
        VisitSortField::CreatedAt => Some(SortValue::Time(visit.created_at)),
    }
}

const DEFAULT_CLIENT_SORT: Sort<ClientSortField> = Sort {
    field: ClientSortField::LastName,
    direction: SortDirection::Asc,
};

const DEFAULT_VISIT_SORT: Sort<VisitSortField> = Sort {
    field: VisitSortField::Date,
    direction: SortDirection::Desc,
};

fn client_matches(client: &Client, params: &ClientListParams) -> bool {
    if let Some(status) = params.status {
        if client.status != status {
            return false;
        }
    }

    match params.search.as_deref().filter(|term| !term.is_empty()) {
        Some(term) => {
            let term = term.to_lowercase();
            contains_folded(Some(&client.first_name), &term)
                || contains_folded(Some(&client.last_name), &term)
                || contains_folded(client.email.as_deref(), &term)
                || contains_folded(Some(&client.phone), &term)
        }
        None => true,
    }
}

fn visit_matches(visit: &Visit, params: &VisitListParams) -> bool {
    if let Some(client_id) = params.client_id {
        if visit.client_id != client_id {
            return false;
        }
    }

    match params.search.as_deref().filter(|term| !term.is_empty()) {
        Some(term) => {
            let term = term.to_lowercase();
            contains_folded(visit.service.as_deref(), &term)
                || contains_folded(visit.formula.as_deref(), &term)
                || contains_folded(visit.notes.as_deref(), &term)
        }
        None => true,
    }
}

#[async_trait]
impl Storage for MemStorage {
    async fn get_client(&self, id: i32) -> Result<Option<Client>, StorageError> {
        let tables = self.tables.lock().await;

        Ok(tables.clients.get(&id).cloned())
    }

    async fn list_clients(
        &self,
        params: &ClientListParams,
    ) -> Result<ListPage<Client>, StorageError> {
        let tables = self.tables.lock().await;

        let mut clients: Vec<Client> = tables
            .clients
            .values()
            .filter(|client| client_matches(client, params))
            .cloned()
            .collect();
        let total = clients.len() as i64;

        let sort = params.sort.unwrap_or(DEFAULT_CLIENT_SORT);
        clients.sort_by(|a, b| {
            cmp_nullable(
                client_sort_value(a, sort.field),
                client_sort_value(b, sort.field),
                sort.direction,
                SortValue::compare,
            )
            .then_with(|| a.id.cmp(&b.id))
        });

        let items = match params.pagination {
            Some(pagination) => pagination.window(clients),
            None => clients,
        };

        Ok(ListPage { items, total })
    }

    async fn create_client(&self, client: NewClient) -> Result<Client, StorageError> {
        let mut tables = self.tables.lock().await;

        let id = tables.next_client_id;
        tables.next_client_id += 1;

        let client = Client {
            id,
            first_name: client.first_name,
            last_name: client.last_name,
            phone: client.phone,
            email: client.email,
            address: client.address,
            city: client.city,
            zip: client.zip,
            notes: client.notes,
            status: client.status.unwrap_or_default(),
            photo_url: client.photo_url,
            created_at: Utc::now(),
        };
        tables.clients.insert(id, client.clone());

        Ok(client)
    }

    async fn update_client(
        &self,
        id: i32,
        changes: ClientUpdate,
    ) -> Result<Option<Client>, StorageError> {
        let mut tables = self.tables.lock().await;

        let Some(client) = tables.clients.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply_to(client);

        Ok(Some(client.clone()))
    }

    async fn delete_client(&self, id: i32) -> Result<bool, StorageError> {
        let mut tables = self.tables.lock().await;

        tables.visits.retain(|_, visit| visit.client_id != id);

        Ok(tables.clients.remove(&id).is_some())
    }

    async fn get_visit(&self, id: i32) -> Result<Option<Visit>, StorageError> {
        let tables = self.tables.lock().await;

        Ok(tables.visits.get(&id).cloned())
    }

    async fn list_visits(&self, params: &VisitListParams) -> Result<ListPage<Visit>, StorageError> {
        let tables = self.tables.lock().await;

        let mut visits: Vec<Visit> = tables
            .visits
            .values()
            .filter(|visit| visit_matches(visit, params))
            .cloned()
            .collect();
        let total = visits.len() as i64;

        let sort = params.sort.unwrap_or(DEFAULT_VISIT_SORT);
        visits.sort_by(|a, b| {
            cmp_nullable(
                visit_sort_value(a, sort.field),
                visit_sort_value(b, sort.field),
                sort.direction,
                SortValue::compare,
            )
            .then_with(|| a.id.cmp(&b.id))
        });

        let items = match params.pagination {
            Some(pagination) => pagination.window(visits),
            None => visits,
        };

        Ok(ListPage { items, total })
    }

    async fn create_visit(&self, visit: NewVisit) -> Result<Visit, StorageError> {
        let mut tables = self.tables.lock().await;

        if !tables.clients.contains_key(&visit.client_id) {
            return Err(StorageError::MissingClient(visit.client_id));
        }

        let id = tables.next_visit_id;
        tables.next_visit_id += 1;

        let visit = Visit {
            id,
            client_id: visit.client_id,
            date: visit.date,
            service: visit.service,
            formula: visit.formula,
            price: visit.price.as_ref().map(format_price),
            notes: visit.notes,
            created_at: Utc::now(),
        };
        tables.visits.insert(id, visit.clone());

        Ok(visit)
    }

    async fn update_visit(
        &self,
        id: i32,
        changes: VisitUpdate,
    ) -> Result<Option<Visit>, StorageError> {
        let mut tables = self.tables.lock().await;

        if !tables.visits.contains_key(&id) {
            return Ok(None);
        }
        if let Some(client_id) = changes.client_id {
            if !tables.clients.contains_key(&client_id) {
                return Err(StorageError::MissingClient(client_id));
            }
        }

        let Some(visit) = tables.visits.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply_to(visit);

        Ok(Some(visit.clone()))
    }

    async fn delete_visit(&self, id: i32) -> Result<bool, StorageError> {
        let mut tables = self.tables.lock().await;

        Ok(tables.visits.remove(&id).is_some())
    }
}
