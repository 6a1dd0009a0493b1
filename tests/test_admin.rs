mod common;

use axum::http::StatusCode;
use common::Client;
use userhub::{
    models::{Group, ADMIN_GROUP},
    uuid_to_slug,
};

async fn admin_client(others: &[&str]) -> Client {
    let mut client = Client::new().await;
    client.register("root", "root@example.com", "correct horse").await;
    for name in others {
        client
            .register(name, &format!("{}@example.com", name), "correct horse")
            .await;
    }
    client.make_admin("root").await;
    client.logout().await;
    client.login("root", "correct horse").await;
    client
}

fn position(body: &str, needle: &str) -> usize {
    body.find(needle)
        .unwrap_or_else(|| panic!("{} not found in {}", needle, body))
}

#[tokio::test]
async fn test_user_listing_newest_first() {
    let mut client = admin_client(&["first", "second", "third"]).await;

    let response = client.get("/admin/users").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("<title>All users</title>"));
    assert!(response.body.contains(">Friendly name</th>"));

    let third = position(&response.body, "third@example.com");
    let second = position(&response.body, "second@example.com");
    let first = position(&response.body, "first@example.com");
    let root = position(&response.body, "root@example.com");
    assert!(third < second && second < first && first < root);

    let slug = client.user("third").await.slug();
    assert!(response
        .body
        .contains(&format!("href=\"/admin/users/{}\"", slug)));
}

#[tokio::test]
async fn test_user_listing_pages() {
    let names: Vec<String> = (0..20).map(|i| format!("user{:02}", i)).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let mut client = admin_client(&names).await;

    let response = client.get("/admin/users").await;
    assert!(response.body.contains("Page 1 of 2"));
    assert!(response.body.contains("user19@example.com"));
    assert!(!response.body.contains("root@example.com"));

    let response = client.get("/admin/users?page=2").await;
    assert!(response.body.contains("Page 2 of 2"));
    assert!(response.body.contains("root@example.com"));
    assert!(response.body.contains("href=\"/admin/users?page=1\""));
}

#[tokio::test]
async fn test_listing_page_past_the_end() {
    let mut client = admin_client(&[]).await;

    let response = client.get("/admin/users?page=9223372036854775807").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(!response.body.contains("root@example.com"));

    let response = client.get("/admin/users?page=0").await;
    assert!(response.body.contains("root@example.com"));
}

#[tokio::test]
async fn test_group_listing() {
    let mut client = admin_client(&[]).await;

    let response = client.get("/admin/groups").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("<title>All groups</title>"));
    assert!(response.body.contains("<td>admin</td>"));
}

#[tokio::test]
async fn test_user_panel() {
    let mut client = admin_client(&["first", "second"]).await;

    let response = client.get("/admin").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("<dd id=\"user-count\">3</dd>"));

    let latest = client.user("second").await;
    assert!(response
        .body
        .contains(&format!("href=\"/admin/users/{}\"", latest.slug())));
}

#[tokio::test]
async fn test_user_and_group_details() {
    let mut client = admin_client(&["first"]).await;

    let first = client.user("first").await;
    let response = client.get(&format!("/admin/users/{}", first.slug())).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("first@example.com"));

    let admin = Group::get_by_name(ADMIN_GROUP, &**client.state.database())
        .await
        .unwrap()
        .unwrap();
    let response = client
        .get(&format!("/admin/groups/{}", uuid_to_slug(&admin.uuid)))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains(">root</a>"));
    assert!(!response.body.contains(">first</a>"));
}

#[tokio::test]
async fn test_detail_with_bad_slugs() {
    let mut client = admin_client(&[]).await;

    let response = client.get("/admin/users/not-a-slug").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = client.get("/admin/users/AAAAAAAAAAAAAAAAAAAAAA").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = client.get("/admin/groups/AAAAAAAAAAAAAAAAAAAA*!").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_route() {
    let mut client = Client::new().await;
    let response = client.get("/nowhere").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
