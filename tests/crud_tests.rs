mod common;

use common::{create_user, error_text, service};
use platform_mcp::{CrudService, QueryRequest, ResultEnvelope};
use serde_json::{json, Value};

async fn read_one(crud: &CrudService, id: &Value) -> Value {
    let out = crud.read(&QueryRequest::new("users").filter("id", id.clone())).await;
    assert!(out.success, "{:?}", out.error);
    out.data.unwrap()[0].clone()
}

fn changed_fields(envelope: &ResultEnvelope) -> Vec<String> {
    let mut names: Vec<String> = serde_json::from_value(envelope.meta("changed_fields").cloned().unwrap()).unwrap();
    names.sort();
    names
}

/// Attribute names whose values differ between two representations, sorted.
fn differing(before: &Value, after: &Value) -> Vec<String> {
    let (before, after) = (before.as_object().unwrap(), after.as_object().unwrap());
    let mut names: Vec<String> = before
        .keys()
        .chain(after.keys())
        .filter(|k| before.get(*k) != after.get(*k))
        .cloned()
        .collect();
    names.sort();
    names.dedup();
    names
}

#[tokio::test]
async fn test_create_then_read_returns_same_representation() {
    let crud = service();
    let created = crud
        .create("users", &json!({"name": "Ann", "email": "ann@example.com", "password": "hunter22"}))
        .await;
    assert!(created.success);
    assert_eq!(created.message.as_deref(), Some("Your item has been successfully added"));
    assert_eq!(created.meta("resource"), Some(&json!("users")));
    assert_eq!(created.meta("id"), Some(&json!(1)));
    assert!(created.meta("created_at").is_some_and(Value::is_string));

    let data = created.data.clone().unwrap();
    assert_eq!(data["status"], json!("active"));
    assert!(data.get("password").is_none());

    let read = crud.read(&QueryRequest::new("users").filter("id", json!(1))).await;
    assert!(read.success);
    assert_eq!(read.data.unwrap()[0], data);
}

#[tokio::test]
async fn test_partial_update_preserves_omitted_fields() {
    let crud = service();
    let id = create_user(&crud, "Ann", "ann@example.com").await;

    let before = read_one(&crud, &id).await;

    let updated = crud.update("users", &id, &json!({"name": "Anna"})).await;
    assert!(updated.success, "{:?}", updated.error);
    assert_eq!(updated.message.as_deref(), Some("Your item has been successfully updated"));
    let data = updated.data.clone().unwrap();
    assert_eq!(data["name"], json!("Anna"));
    assert_eq!(data["email"], json!("ann@example.com"));

    assert_eq!(changed_fields(&updated), differing(&before, &data));
    assert!(changed_fields(&updated).contains(&"name".to_string()));
    assert!(!changed_fields(&updated).contains(&"email".to_string()));
}

#[tokio::test]
async fn test_hidden_attributes_never_reported_as_changed() {
    let crud = service();
    let id = create_user(&crud, "Ann", "ann@example.com").await;
    let before = read_one(&crud, &id).await;

    let updated = crud.update("users", &id, &json!({"password": "correct-horse"})).await;
    assert!(updated.success, "{:?}", updated.error);
    let after = updated.data.clone().unwrap();
    assert!(after.get("password").is_none());
    assert_eq!(changed_fields(&updated), differing(&before, &after));
    assert!(!changed_fields(&updated).contains(&"password".to_string()));
}

#[tokio::test]
async fn test_huge_page_number_fails_validation() {
    let crud = service();
    create_user(&crud, "Ann", "ann@example.com").await;
    let out = crud.read(&QueryRequest::new("users").page(i64::MAX, 100)).await;
    let text = error_text(&out);
    assert!(text.starts_with("The search criteria provided is invalid"));
    assert!(text.contains("page.number"));

    let out = crud.read(&QueryRequest::new("users").page(i64::MAX, 1)).await;
    assert!(out.success, "{:?}", out.error);
    assert_eq!(out.data.clone().unwrap(), json!([]));
    assert_eq!(out.meta("total"), Some(&json!(1)));
}

#[tokio::test]
async fn test_update_accepts_string_id_and_rejects_nulling_required_field() {
    let crud = service();
    create_user(&crud, "Ann", "ann@example.com").await;
    let out = crud.update("users", &json!("1"), &json!({"status": "inactive"})).await;
    assert!(out.success);
    assert_eq!(out.meta("id"), Some(&json!(1)));

    let out = crud.update("users", &json!("1"), &json!({"name": null})).await;
    assert!(error_text(&out).starts_with("Some of the changes you made are invalid"));
}

#[tokio::test]
async fn test_update_unknown_or_malformed_id_is_not_found() {
    let crud = service();
    create_user(&crud, "Ann", "ann@example.com").await;
    let out = crud.update("users", &json!(42), &json!({"name": "Bo"})).await;
    assert_eq!(error_text(&out), "The item with ID '42' could not be found in 'users'.");
    let out = crud.delete("users", &json!("not-a-number"), false).await;
    assert!(error_text(&out).contains("could not be found"));
}

#[tokio::test]
async fn test_page_size_above_limit_fails_validation() {
    let crud = service();
    let out = crud.read(&QueryRequest::new("users").page(1, 101)).await;
    let text = error_text(&out);
    assert!(text.starts_with("The search criteria provided is invalid"));
    assert!(text.contains("page.size"));
    let out = crud.read(&QueryRequest::new("users").page(0, 10)).await;
    assert!(error_text(&out).contains("page.number"));
}

#[tokio::test]
async fn test_undeclared_filter_sort_and_include_are_invalid_queries() {
    let crud = service();
    let out = crud.read(&QueryRequest::new("users").filter("password", json!("x"))).await;
    let text = error_text(&out);
    assert!(text.starts_with("The filter you specified cannot be applied"));
    assert!(text.contains("`password`"));

    let out = crud.read(&QueryRequest::new("users").sort("-email")).await;
    assert!(error_text(&out).starts_with("The sorting option you chose is not available"));

    let out = crud.read(&QueryRequest::new("users").include("friends")).await;
    assert!(error_text(&out).starts_with("The related information you requested is not available"));
}

#[tokio::test]
async fn test_referenced_delete_is_constraint_violation() {
    let crud = service();
    let user = create_user(&crud, "Ann", "ann@example.com").await;
    let post = crud.create("posts", &json!({"user_id": user, "title": "Hello"})).await;
    let post_id = post.meta("id").cloned().unwrap();
    let comment = crud.create("comments", &json!({"post_id": post_id, "body": "Nice"})).await;
    assert!(comment.success);

    let out = crud.delete("posts", &post_id, false).await;
    let text = error_text(&out);
    assert!(text.contains(&format!("Cannot remove the item with ID '{}' from 'posts'", post_id)));
    assert!(text.ends_with("Please remove the related items first."));

    let out = crud.delete("comments", comment.meta("id").unwrap(), false).await;
    assert!(out.success);
    assert_eq!(out.meta("delete_type"), Some(&json!("deleted")));
    assert_eq!(out.meta("permanently_deleted"), Some(&json!(true)));

    let out = crud.delete("posts", &post_id, false).await;
    assert!(out.success);
    assert_eq!(out.message.as_deref(), Some("Your item has been successfully removed"));
}

#[tokio::test]
async fn test_user_lifecycle_soft_then_force_delete() {
    let crud = service();
    let id = create_user(&crud, "Ann", "ann@example.com").await;
    create_user(&crud, "Bo", "bo@example.com").await;

    let read = crud.read(&QueryRequest::new("users").filter("email", json!("ann@example.com"))).await;
    assert_eq!(read.meta("total"), Some(&json!(1)));

    let out = crud.delete("users", &id, false).await;
    assert!(out.success);
    assert_eq!(out.meta("delete_type"), Some(&json!("soft_deleted")));
    assert_eq!(out.meta("permanently_deleted"), Some(&json!(false)));
    assert!(out.meta("deleted_at").is_some_and(Value::is_string));

    let read = crud.read(&QueryRequest::new("users").filter("email", json!("ann@example.com"))).await;
    assert_eq!(read.meta("total"), Some(&json!(0)));
    let out = crud.delete("users", &id, false).await;
    assert!(error_text(&out).contains("could not be found"));

    let out = crud.delete("users", &id, true).await;
    assert!(out.success);
    assert_eq!(out.meta("delete_type"), Some(&json!("force_deleted")));
    assert_eq!(out.meta("permanently_deleted"), Some(&json!(true)));
    let out = crud.delete("users", &id, true).await;
    assert!(error_text(&out).contains("could not be found"));
}

#[tokio::test]
async fn test_unknown_resource_lists_available_collections() {
    let crud = service();
    let out = crud.create("orders", &json!({"total": 1})).await;
    assert_eq!(
        error_text(&out),
        "The collection 'orders' you're trying to add to doesn't exist in the system. Available collections: users, posts, comments, tags, audits"
    );
}

#[tokio::test]
async fn test_unsupported_operations() {
    let crud = service();
    let out = crud.create("tags", &json!({"label": "x"})).await;
    assert!(error_text(&out).contains("doesn't support automatic data validation"));

    let out = crud.create("audits", &json!({"event": "login"})).await;
    assert_eq!(error_text(&out), "The collection 'audits' does not allow create operations.");

    let read = crud.read(&QueryRequest::new("tags")).await;
    assert!(read.success);
}

#[tokio::test]
async fn test_validation_collects_field_errors() {
    let crud = service();
    let out = crud.create("users", &json!({"email": "not-an-email", "status": "gone"})).await;
    let text = error_text(&out);
    assert!(text.starts_with("Some required information is missing or incorrect"));
    assert!(text.contains("The name field is required."));
    assert!(text.contains("valid email address"));
    assert!(text.contains("The selected status is invalid"));

    let out = crud.create("users", &json!({})).await;
    assert!(error_text(&out).contains("payload"));

    let out = crud.create("users", &json!({"name": "Ann", "email": "ann@example.com", "id": 9, "role": "admin"})).await;
    let text = error_text(&out);
    assert!(text.contains("The id field is not a writable attribute"));
    assert!(text.contains("The role field is not a writable attribute"));
}

#[tokio::test]
async fn test_nested_includes_with_sparse_fieldsets() {
    let crud = service();
    let ann = create_user(&crud, "Ann", "ann@example.com").await;
    create_user(&crud, "Bo", "bo@example.com").await;
    let post = crud.create("posts", &json!({"user_id": ann, "title": "Hello"})).await;
    let post_id = post.meta("id").cloned().unwrap();
    crud.create("comments", &json!({"post_id": post_id, "body": "First"})).await;
    crud.create("comments", &json!({"post_id": post_id, "body": "Second"})).await;

    let request = QueryRequest::new("users")
        .include("posts.comments")
        .fields("users", "id,name")
        .fields("posts", "id,title")
        .sort("id");
    let out = crud.read(&request).await;
    assert!(out.success, "{:?}", out.error);
    let data = out.data.unwrap();

    let ann = data[0].as_object().unwrap();
    let mut keys: Vec<&str> = ann.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["id", "name", "posts"]);
    let posts = ann["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["title"], json!("Hello"));
    assert!(posts[0].get("user_id").is_none());
    assert_eq!(posts[0]["comments"].as_array().unwrap().len(), 2);

    assert_eq!(data[1]["posts"], json!([]));
}

#[tokio::test]
async fn test_belongs_to_include_and_unknown_nested_segment() {
    let crud = service();
    let ann = create_user(&crud, "Ann", "ann@example.com").await;
    crud.create("posts", &json!({"user_id": ann, "title": "Hello"})).await;

    let out = crud.read(&QueryRequest::new("posts").include("author")).await;
    let author = &out.data.unwrap()[0]["author"];
    assert_eq!(author["name"], json!("Ann"));
    assert!(author.get("password").is_none());

    let out = crud.read(&QueryRequest::new("users").include("posts.likes")).await;
    assert!(error_text(&out).contains("`likes`"));
}

#[tokio::test]
async fn test_appends_and_unknown_appends() {
    let crud = service();
    create_user(&crud, "Ann", "ann@example.com").await;
    let out = crud.read(&QueryRequest::new("users").append("display_name,nickname")).await;
    let item = &out.data.unwrap()[0];
    assert_eq!(item["display_name"], json!("Ann <ann@example.com>"));
    assert_eq!(item["nickname"], Value::Null);
}

#[tokio::test]
async fn test_sorting_pagination_and_links() {
    let crud = service();
    for (name, email) in [("Cy", "cy@example.com"), ("Ann", "ann@example.com"), ("Bo", "bo@example.com")] {
        create_user(&crud, name, email).await;
    }
    let request = QueryRequest::new("users").sort("-name").page(1, 2);
    let out = crud.read(&request).await;
    let names: Vec<Value> = out.data.clone().unwrap().as_array().unwrap().iter().map(|u| u["name"].clone()).collect();
    assert_eq!(names, vec![json!("Cy"), json!("Bo")]);
    assert_eq!(out.meta("total"), Some(&json!(3)));
    assert_eq!(out.meta("last_page"), Some(&json!(2)));
    assert_eq!(out.meta("from"), Some(&json!(1)));
    assert_eq!(out.meta("to"), Some(&json!(2)));
    let links = out.links.unwrap();
    assert_eq!(links["next"], json!("/users?sort=-name&page%5Bnumber%5D=2&page%5Bsize%5D=2"));
    assert_eq!(links["prev"], Value::Null);

    let out = crud.read(&request.clone().page(2, 2)).await;
    assert_eq!(out.data.clone().unwrap()[0]["name"], json!("Ann"));
    assert_eq!(out.meta("from"), Some(&json!(3)));

    let out = crud.read(&request.page(5, 2)).await;
    assert_eq!(out.data.clone().unwrap(), json!([]));
    assert_eq!(out.meta("from"), Some(&Value::Null));
}

#[tokio::test]
async fn test_scope_and_partial_filters() {
    let crud = service();
    let ann = create_user(&crud, "Ann Smith", "ann@example.com").await;
    create_user(&crud, "Bo Smithers", "bo@example.com").await;
    create_user(&crud, "Cy", "cy@example.com").await;
    crud.update("users", &ann, &json!({"status": "inactive"})).await;

    let out = crud.read(&QueryRequest::new("users").filter("active", json!(true))).await;
    assert_eq!(out.meta("total"), Some(&json!(2)));

    let out = crud
        .read(&QueryRequest::new("users").filter("name", json!("smith")).filter("active", json!(true)))
        .await;
    assert_eq!(out.meta("total"), Some(&json!(1)));
    assert_eq!(out.data.unwrap()[0]["name"], json!("Bo Smithers"));

    let out = crud.read(&QueryRequest::new("users").filter("email", json!(["ann@example.com", "cy@example.com"]))).await;
    assert_eq!(out.meta("total"), Some(&json!(2)));
}
