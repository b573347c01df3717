use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{Storage, StorageError};
use crate::models::clients::{Client, ClientListParams, ClientUpdate, NewClient};
use crate::models::query::{ListPage, Pagination, SortDirection};
use crate::models::visits::{format_price, NewVisit, Visit, VisitListParams, VisitUpdate};

const CLIENT_COLUMNS: &str =
    "id, first_name, last_name, phone, email, address, city, zip, notes, status, photo_url, created_at";

const VISIT_COLUMNS: &str = "id, client_id, date, service, formula, price, notes, created_at";

const FOREIGN_KEY_VIOLATION: &str = "23503";

const TEXT_COLLATION: &str = " COLLATE \"und-x-icu\"";

#[derive(sqlx::FromRow)]
struct ClientRow {
    id: i32,
    first_name: String,
    last_name: String,
    phone: String,
    email: Option<String>,
    address: Option<String>,
    city: Option<String>,
    zip: Option<String>,
    notes: Option<String>,
    status: String,
    photo_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Client {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            email: row.email,
            address: row.address,
            city: row.city,
            zip: row.zip,
            notes: row.notes,
            // The column carries a CHECK constraint, so this only falls back
            // for rows written before it existed.
            status: row.status.parse().unwrap_or_default(),
            photo_url: row.photo_url,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VisitRow {
    id: i32,
    client_id: i32,
    date: DateTime<Utc>,
    service: Option<String>,
    formula: Option<String>,
    price: Option<BigDecimal>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<VisitRow> for Visit {
    fn from(row: VisitRow) -> Self {
        Visit {
            id: row.id,
            client_id: row.client_id,
            date: row.date,
            service: row.service,
            formula: row.formula,
            price: row.price.as_ref().map(format_price),
            notes: row.notes,
            created_at: row.created_at,
        }
    }
}

/// Escapes LIKE metacharacters so a search term only ever matches literally.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');

    pattern
}

fn push_client_filters(query: &mut QueryBuilder<'_, Postgres>, params: &ClientListParams) {
    let mut keyword = " WHERE ";

    if let Some(term) = params.search.as_deref().filter(|term| !term.is_empty()) {
        let pattern = like_pattern(term);
        query
            .push(keyword)
            .push("(first_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR last_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR phone ILIKE ")
            .push_bind(pattern)
            .push(")");
        keyword = " AND ";
    }

    if let Some(status) = params.status {
        query
            .push(keyword)
            .push("status = ")
            .push_bind(status.as_str());
    }
}

fn push_visit_filters(query: &mut QueryBuilder<'_, Postgres>, params: &VisitListParams) {
    let mut keyword = " WHERE ";

    if let Some(client_id) = params.client_id {
        query
            .push(keyword)
            .push("client_id = ")
            .push_bind(client_id);
        keyword = " AND ";
    }

    if let Some(term) = params.search.as_deref().filter(|term| !term.is_empty()) {
        let pattern = like_pattern(term);
        query
            .push(keyword)
            .push("(service ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR formula ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR notes ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

/// Column names come from the sort-field enums, never from request text.
/// Text columns use the ICU root collation so accents and case order the
/// same way as the in-memory store.
fn push_order(
    query: &mut QueryBuilder<'_, Postgres>,
    column: &str,
    is_text: bool,
    direction: SortDirection,
) {
    let collation = if is_text { TEXT_COLLATION } else { "" };
    query.push(format!(
        " ORDER BY {}{} {} NULLS FIRST, id ASC",
        column,
        collation,
        direction.sql()
    ));
}

/// OFFSET is a BIGINT; pages beyond it simply come back empty.
fn sql_offset(pagination: Pagination) -> i64 {
    i64::try_from(pagination.offset()).unwrap_or(i64::MAX)
}

fn push_pagination(query: &mut QueryBuilder<'_, Postgres>, pagination: Option<Pagination>) {
    if let Some(pagination) = pagination {
        query
            .push(" LIMIT ")
            .push_bind(i64::from(pagination.limit))
            .push(" OFFSET ")
            .push_bind(sql_offset(pagination));
    }
}

fn client_list_query(params: &ClientListParams) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!("SELECT {} FROM clients", CLIENT_COLUMNS));
    push_client_filters(&mut query, params);
    match params.sort {
        Some(sort) => push_order(
            &mut query,
            sort.field.column(),
            sort.field.is_text(),
            sort.direction,
        ),
        None => push_order(&mut query, "last_name", true, SortDirection::Asc),
    }
    push_pagination(&mut query, params.pagination);

    query
}

fn visit_list_query(params: &VisitListParams) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!("SELECT {} FROM visits", VISIT_COLUMNS));
    push_visit_filters(&mut query, params);
    match params.sort {
        Some(sort) => push_order(
            &mut query,
            sort.field.column(),
            sort.field.is_text(),
            sort.direction,
        ),
        None => push_order(&mut query, "date", false, SortDirection::Desc),
    }
    push_pagination(&mut query, params.pagination);

    query
}

/// Builds `UPDATE clients SET ... WHERE id = $n RETURNING ...`. Callers
/// handle the empty case before getting here.
fn client_update_query(id: i32, changes: ClientUpdate) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new("UPDATE clients SET ");
    let mut set = query.separated(", ");

    if let Some(first_name) = changes.first_name {
        set.push("first_name = ").push_bind_unseparated(first_name);
    }
    if let Some(last_name) = changes.last_name {
        set.push("last_name = ").push_bind_unseparated(last_name);
    }
    if let Some(phone) = changes.phone {
        set.push("phone = ").push_bind_unseparated(phone);
    }
    if let Some(email) = changes.email {
        set.push("email = ").push_bind_unseparated(email);
    }
    if let Some(address) = changes.address {
        set.push("address = ").push_bind_unseparated(address);
    }
    if let Some(city) = changes.city {
        set.push("city = ").push_bind_unseparated(city);
    }
    if let Some(zip) = changes.zip {
        set.push("zip = ").push_bind_unseparated(zip);
    }
    if let Some(notes) = changes.notes {
        set.push("notes = ").push_bind_unseparated(notes);
    }
    if let Some(status) = changes.status {
        set.push("status = ").push_bind_unseparated(status.as_str());
    }
    if let Some(photo_url) = changes.photo_url {
        set.push("photo_url = ").push_bind_unseparated(photo_url);
    }

    query
        .push(" WHERE id = ")
        .push_bind(id)
        .push(format!(" RETURNING {}", CLIENT_COLUMNS));

    query
}

fn visit_update_query(id: i32, changes: VisitUpdate) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new("UPDATE visits SET ");
    let mut set = query.separated(", ");

    if let Some(client_id) = changes.client_id {
        set.push("client_id = ").push_bind_unseparated(client_id);
    }
    if let Some(date) = changes.date {
        set.push("date = ").push_bind_unseparated(date);
    }
    if let Some(service) = changes.service {
        set.push("service = ").push_bind_unseparated(service);
    }
    if let Some(formula) = changes.formula {
        set.push("formula = ").push_bind_unseparated(formula);
    }
    if let Some(price) = changes.price {
        set.push("price = ").push_bind_unseparated(price);
    }
    if let Some(notes) = changes.notes {
        set.push("notes = ").push_bind_unseparated(notes);
    }

    query
        .push(" WHERE id = ")
        .push_bind(id)
        .push(format!(" RETURNING {}", VISIT_COLUMNS));

    query
}

fn missing_client(error: sqlx::Error, client_id: i32) -> StorageError {
    match &error {
        sqlx::Error::Database(db_error)
            if db_error.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) =>
        {
            StorageError::MissingClient(client_id)
        }
        _ => StorageError::Database(error),
    }
}

#[derive(Clone)]
pub struct PgStorage {
    conn: PgPool,
}

impl PgStorage {
    pub fn new(conn: PgPool) -> Self {
        PgStorage { conn }
    }

    /// Connects and brings the schema up to date.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let conn = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        sqlx::migrate!("./migrations").run(&conn).await?;

        Ok(PgStorage::new(conn))
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn get_client(&self, id: i32) -> Result<Option<Client>, StorageError> {
        let client = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {} FROM clients WHERE id = $1",
            CLIENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(client.map(Client::from))
    }

    async fn list_clients(
        &self,
        params: &ClientListParams,
    ) -> Result<ListPage<Client>, StorageError> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM clients");
        push_client_filters(&mut count, params);
        let total: i64 = count.build_query_scalar().fetch_one(&self.conn).await?;

        let rows: Vec<ClientRow> = client_list_query(params)
            .build_query_as()
            .fetch_all(&self.conn)
            .await?;

        Ok(ListPage {
            items: rows.into_iter().map(Client::from).collect(),
            total,
        })
    }

    async fn create_client(&self, client: NewClient) -> Result<Client, StorageError> {
        let row = sqlx::query_as::<_, ClientRow>(&format!(
            r#"INSERT INTO clients
            (first_name, last_name, phone, email, address, city, zip, notes, status, photo_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}"#,
            CLIENT_COLUMNS
        ))
        .bind(client.first_name)
        .bind(client.last_name)
        .bind(client.phone)
        .bind(client.email)
        .bind(client.address)
        .bind(client.city)
        .bind(client.zip)
        .bind(client.notes)
        .bind(client.status.unwrap_or_default().as_str())
        .bind(client.photo_url)
        .fetch_one(&self.conn)
        .await?;

        Ok(row.into())
    }

    async fn update_client(
        &self,
        id: i32,
        changes: ClientUpdate,
    ) -> Result<Option<Client>, StorageError> {
        if changes.is_empty() {
            return self.get_client(id).await;
        }

        let row: Option<ClientRow> = client_update_query(id, changes)
            .build_query_as()
            .fetch_optional(&self.conn)
            .await?;

        Ok(row.map(Client::from))
    }

    async fn delete_client(&self, id: i32) -> Result<bool, StorageError> {
        let mut tx = self.conn.begin().await?;

        sqlx::query("DELETE FROM visits WHERE client_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(deleted.rows_affected() > 0)
    }

    async fn get_visit(&self, id: i32) -> Result<Option<Visit>, StorageError> {
        let visit = sqlx::query_as::<_, VisitRow>(&format!(
            "SELECT {} FROM visits WHERE id = $1",
            VISIT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(visit.map(Visit::from))
    }

    async fn list_visits(&self, params: &VisitListParams) -> Result<ListPage<Visit>, StorageError> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM visits");
        push_visit_filters(&mut count, params);
        let total: i64 = count.build_query_scalar().fetch_one(&self.conn).await?;

        let rows: Vec<VisitRow> = visit_list_query(params)
            .build_query_as()
            .fetch_all(&self.conn)
            .await?;

        Ok(ListPage {
            items: rows.into_iter().map(Visit::from).collect(),
            total,
        })
    }

    async fn create_visit(&self, visit: NewVisit) -> Result<Visit, StorageError> {
        let client_id = visit.client_id;
        let row = sqlx::query_as::<_, VisitRow>(&format!(
            r#"INSERT INTO visits
            (client_id, date, service, formula, price, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}"#,
            VISIT_COLUMNS
        ))
        .bind(visit.client_id)
        .bind(visit.date)
        .bind(visit.service)
        .bind(visit.formula)
        .bind(visit.price)
        .bind(visit.notes)
        .fetch_one(&self.conn)
        .await
        .map_err(|e| missing_client(e, client_id))?;

        Ok(row.into())
    }

    async fn update_visit(
        &self,
        id: i32,
        changes: VisitUpdate,
    ) -> Result<Option<Visit>, StorageError> {
        if changes.is_empty() {
            return self.get_visit(id).await;
        }

        let client_id = changes.client_id.unwrap_or_default();
        let row: Option<VisitRow> = visit_update_query(id, changes)
            .build_query_as()
            .fetch_optional(&self.conn)
            .await
            .map_err(|e| missing_client(e, client_id))?;

        Ok(row.map(Visit::from))
    }

    async fn delete_visit(&self, id: i32) -> Result<bool, StorageError> {
        let deleted = sqlx::query("DELETE FROM visits WHERE id = $1")
            .bind(id)
            .execute(&self.conn)
            .await?;

        Ok(deleted.rows_affected() > 0)
    }
}
