use askama::Template;
use axum::extract::{Path, State};

use super::listing::UserListing;
use crate::{
    admin::Listing,
    errors::AppError,
    models::{Group, User},
    slug::slug_to_uuid,
    state::AppState,
    website::{template_to_response, HtmlResult, Meta},
};

#[derive(Template)]
#[template(path = "admin/panel.html")]
struct PanelTemplate<'a> {
    meta: Meta<'a>,
    count: i64,
    latest_user: Option<User>,
    latest_user_url: Option<String>,
}

fn user_url(user: &User) -> String {
    format!("{}/{}", UserListing::BASE_PATH, user.slug())
}

pub async fn user_panel(State(state): State<AppState>) -> HtmlResult {
    let database = state.database();
    let count = User::count(&**database).await?;
    let latest_user = User::latest_activated(&**database).await?;
    let latest_user_url = latest_user.as_ref().map(user_url);

    template_to_response(&PanelTemplate {
        meta: Meta::new("Users"),
        count,
        latest_user,
        latest_user_url,
    })
}

#[derive(Template)]
#[template(path = "admin/user.html")]
struct UserTemplate<'a> {
    meta: Meta<'a>,
    user: &'a User,
    groups: Vec<(Group, String)>,
}

pub async fn user_detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> HtmlResult {
    let uuid = slug_to_uuid(&slug)?;
    let database = state.database();
    let user = User::get_by_uuid(uuid, &**database)
        .await?
        .ok_or(AppError::DoesNotExist)?;
    let groups = user
        .groups(&**database)
        .await?
        .into_iter()
        .map(|group| {
            let url = format!("/admin/groups/{}", group.slug());
            (group, url)
        })
        .collect();

    template_to_response(&UserTemplate {
        meta: Meta::new(user.friendly_name().to_owned()),
        user: &user,
        groups,
    })
}

#[derive(Template)]
#[template(path = "admin/group.html")]
struct GroupTemplate<'a> {
    meta: Meta<'a>,
    group: &'a Group,
    members: Vec<(User, String)>,
}

pub async fn group_detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> HtmlResult {
    let uuid = slug_to_uuid(&slug)?;
    let database = state.database();
    let group = Group::get_by_uuid(uuid, &**database)
        .await?
        .ok_or(AppError::DoesNotExist)?;
    let members = group
        .members(&**database)
        .await?
        .into_iter()
        .map(|user| {
            let url = user_url(&user);
            (user, url)
        })
        .collect();

    template_to_response(&GroupTemplate {
        meta: Meta::new(group.name.clone()),
        group: &group,
        members,
    })
}
