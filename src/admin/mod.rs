//! Admin panel: user overview, listings and detail pages. Members of the
//! `admin` group only.

mod listing;
mod views;

use axum::{middleware::from_fn_with_state, routing::get, Router};

use crate::{
    auth::{admin_required_middleware, login_required_middleware},
    state::AppState,
};

pub use listing::{
    Column, GroupListing, GroupRow, Listing, ListingRow, Page, PageParams, Table, UserListing,
    UserRow, PAGE_SIZE,
};

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin", get(views::user_panel))
        .merge(UserListing::routes())
        .merge(GroupListing::routes())
        .route("/admin/users/{slug}", get(views::user_detail))
        .route("/admin/groups/{slug}", get(views::group_detail))
        .layer(from_fn_with_state(state.clone(), admin_required_middleware))
        .layer(from_fn_with_state(state, login_required_middleware))
}
