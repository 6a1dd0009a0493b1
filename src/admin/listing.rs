use std::future::Future;

use askama::Template;
use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};
use serde::Deserialize;
use sqlx::{prelude::FromRow, sqlite::SqliteRow, QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::{
    database::Database,
    errors::AppError,
    log_and_wrap_custom_internal,
    state::AppState,
    website::{template_to_response, HtmlResult, Meta},
    ListingRow as DeriveListingRow,
};

pub const PAGE_SIZE: i64 = 20;

/// A table column: the row field it reads and its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    id: &'static str,
    label: &'static str,
}

impl Column {
    pub const fn new(id: &'static str, label: &'static str) -> Self {
        Self { id, label }
    }

    pub fn id(&self) -> &str {
        self.id
    }

    pub fn label(&self) -> &str {
        self.label
    }
}

/// Data columns followed by a controls column linking to each row.
#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

/// Implemented through `#[derive(ListingRow)]`.
pub trait ListingRow: for<'r> FromRow<'r, SqliteRow> + Send + Unpin {
    fn columns() -> Vec<Column>;

    fn cells(&self) -> Vec<String>;

    fn resource_slug(&self) -> Option<String>;
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    page: Option<i64>,
}

impl PageParams {
    pub fn number(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }
}

#[derive(Debug)]
pub struct Page<R> {
    pub rows: Vec<R>,
    pub number: i64,
    pub total: i64,
}

impl<R> Page<R> {
    pub fn total_pages(&self) -> i64 {
        ((self.total + PAGE_SIZE - 1) / PAGE_SIZE).max(1)
    }

    pub fn previous(&self) -> Option<i64> {
        (self.number > 1).then(|| self.number - 1)
    }

    pub fn next(&self) -> Option<i64> {
        (self.number < self.total_pages()).then(|| self.number + 1)
    }
}

pub trait Listing: Sized + Send + Sync + 'static {
    const TITLE: &'static str;
    const BASE_PATH: &'static str;
    /// Everything up to, but excluding, the ordering.
    const QUERY: &'static str;
    const COUNT_QUERY: &'static str;

    type Row: ListingRow;

    fn table() -> Table {
        Table::new(Self::Row::columns())
    }

    /// Newest first.
    fn order_query(query: &mut QueryBuilder<'_, Sqlite>) {
        query.push(" ORDER BY created_at DESC, pk DESC");
    }

    fn fetch_page(
        database: &Database,
        number: i64,
    ) -> impl Future<Output = Result<Page<Self::Row>, AppError>> + Send {
        async move {
            let total: i64 = sqlx::query_scalar(Self::COUNT_QUERY)
                .fetch_one(&**database)
                .await
                .map_err(|e| log_and_wrap_custom_internal!(e))?;

            // Past any reachable offset, nothing to show.
            let Some(offset) = (number - 1).checked_mul(PAGE_SIZE) else {
                return Ok(Page {
                    rows: Vec::new(),
                    number,
                    total,
                });
            };

            let mut query = QueryBuilder::new(Self::QUERY);
            Self::order_query(&mut query);
            query
                .push(" LIMIT ")
                .push_bind(PAGE_SIZE)
                .push(" OFFSET ")
                .push_bind(offset);

            let rows = query
                .build_query_as::<Self::Row>()
                .fetch_all(&**database)
                .await
                .map_err(|e| log_and_wrap_custom_internal!(e))?;

            Ok(Page {
                rows,
                number,
                total,
            })
        }
    }

    fn routes() -> Router<AppState> {
        Router::new().route(Self::BASE_PATH, get(list::<Self>))
    }
}

struct RenderedRow {
    cells: Vec<String>,
    show_url: Option<String>,
}

#[derive(Template)]
#[template(path = "admin/list.html")]
struct ListTemplate<'a> {
    meta: Meta<'a>,
    base_path: &'a str,
    table: Table,
    rows: Vec<RenderedRow>,
    number: i64,
    total: i64,
    total_pages: i64,
    previous: Option<i64>,
    next: Option<i64>,
}

async fn list<L: Listing>(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> HtmlResult {
    let page = L::fetch_page(state.database(), params.number()).await?;

    let rows = page
        .rows
        .iter()
        .map(|row| RenderedRow {
            cells: row.cells(),
            show_url: row
                .resource_slug()
                .map(|slug| format!("{}/{}", L::BASE_PATH, slug)),
        })
        .collect();

    template_to_response(&ListTemplate {
        meta: Meta::new(L::TITLE),
        base_path: L::BASE_PATH,
        table: L::table(),
        rows,
        number: page.number,
        total: page.total,
        total_pages: page.total_pages(),
        previous: page.previous(),
        next: page.next(),
    })
}

#[derive(Debug, FromRow, DeriveListingRow)]
pub struct UserRow {
    #[sqlx(rename = "pk")]
    #[column(label = "Id")]
    pub id: i64,
    #[column(label = "Friendly name")]
    pub friendly_name: String,
    #[column(label = "Email")]
    pub email: String,
    #[listing(resource)]
    pub uuid: Uuid,
}

pub struct UserListing;

impl Listing for UserListing {
    const TITLE: &'static str = "All users";
    const BASE_PATH: &'static str = "/admin/users";
    const QUERY: &'static str =
        "SELECT pk, COALESCE(full_name, username) AS friendly_name, email, uuid FROM users";
    const COUNT_QUERY: &'static str = "SELECT COUNT(*) FROM users;";

    type Row = UserRow;
}

#[derive(Debug, FromRow, DeriveListingRow)]
pub struct GroupRow {
    #[sqlx(rename = "pk")]
    #[column(label = "Id")]
    pub id: i64,
    #[column(label = "Name")]
    pub name: String,
    #[listing(resource)]
    pub uuid: Uuid,
}

pub struct GroupListing;

impl Listing for GroupListing {
    const TITLE: &'static str = "All groups";
    const BASE_PATH: &'static str = "/admin/groups";
    const QUERY: &'static str = "SELECT pk, name, uuid FROM groups";
    const COUNT_QUERY: &'static str = "SELECT COUNT(*) FROM groups;";

    type Row = GroupRow;
}
