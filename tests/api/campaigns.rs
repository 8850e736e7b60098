use serde_json::{Value, json};
use wiremock::{
    Mock, ResponseTemplate,
    matchers::{any, method, path, path_regex},
};

use crate::helpers::{StubSecretStore, TestApp, spawn_app, spawn_app_with_secret_store};

struct GroupNameMatcher;

impl wiremock::Match for GroupNameMatcher {
    fn matches(&self, request: &wiremock::Request) -> bool {
        let result: Result<Value, _> = serde_json::from_slice(&request.body);

        if let Ok(body) = result {
            body.get("name")
                .and_then(Value::as_str)
                .is_some_and(|name| {
                    name.strip_prefix("campaign group ").is_some_and(|stamp| {
                        stamp.len() == 20 && stamp.chars().all(|c| c.is_ascii_digit())
                    })
                })
        } else {
            false
        }
    }
}

fn single_user_body() -> String {
    json!({"users": [{"email": "ursula@example.com", "name": "Ursula"}]}).to_string()
}

#[tokio::test]
async fn dispatch_returns_400_with_the_reason_when_the_body_is_invalid() {
    let app = spawn_app().await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.mailer_server)
        .await;

    let test_cases = vec![
        (
            "definitely not json".to_string(),
            "Invalid JSON in request body",
            "the body is not JSON",
        ),
        (
            json!({"contacts": []}).to_string(),
            "Missing 'users' in request body",
            "the users key is absent",
        ),
        (
            json!({"users": []}).to_string(),
            "'users' must be a non-empty list",
            "the users list is empty",
        ),
        (
            json!({"users": "everyone"}).to_string(),
            "'users' must be a non-empty list",
            "the users value is not a list",
        ),
        (
            json!({"users": [{"email": "a@example.com"}]}).to_string(),
            "Each user must be an object with 'email' and 'name'. Error at index 0",
            "a user entry has no name",
        ),
        (
            json!({"users": [{"email": "a@example.com", "name": "A"}, {"name": "B"}]})
                .to_string(),
            "Each user must be an object with 'email' and 'name'. Error at index 1",
            "a later user entry has no email",
        ),
    ];

    for (body, expected_error, description) in test_cases {
        let response = app.post_campaign(body).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 Bad Request when {description}."
        );
        let error_body: Value = response
            .json()
            .await
            .expect("Failed to read the error body");
        assert_eq!(
            json!(expected_error),
            error_body["error"],
            "Unexpected error message when {description}."
        );
    }
}

#[tokio::test]
async fn dispatch_provisions_the_group_the_subscriber_and_the_campaign() {
    let app = spawn_app().await;

    Mock::given(path("/groups"))
        .and(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/groups"))
        .and(method("POST"))
        .and(GroupNameMatcher)
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "grp-1"}})),
        )
        .expect(1)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/subscribers/ursula%40example.com"))
        .and(method("GET"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"message": "Resource not found."})),
        )
        .expect(1)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/subscribers"))
        .and(method("POST"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "sub-1"}})),
        )
        .expect(1)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/groups/grp-1/subscribers"))
        .and(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/subscribers/sub-1/groups/grp-1"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .expect(1)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/campaigns"))
        .and(method("POST"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "cmp-1"}})),
        )
        .expect(1)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/campaigns/cmp-1/schedule"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .expect(1)
        .mount(&app.mailer_server)
        .await;

    let response = app.post_campaign(single_user_body()).await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to read the body");
    assert_eq!(json!("mails are being sent"), body["message"]);
}

#[tokio::test]
async fn dispatch_reuses_existing_subscribers_and_memberships() {
    let app = spawn_app().await;

    Mock::given(path("/groups"))
        .and(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/groups"))
        .and(method("POST"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "grp-1"}})),
        )
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/subscribers/ursula%40example.com"))
        .and(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"id": "sub-a"}})),
        )
        .expect(1)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/subscribers/leo%40example.com"))
        .and(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"id": "sub-b"}})),
        )
        .expect(1)
        .mount(&app.mailer_server)
        .await;
    // Both lookups hit, so nobody is created.
    Mock::given(path("/subscribers"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/groups/grp-1/subscribers"))
        .and(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": "sub-a"}]})),
        )
        .expect(2)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/subscribers/sub-a/groups/grp-1"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/subscribers/sub-b/groups/grp-1"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .expect(1)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/campaigns"))
        .and(method("POST"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "cmp-1"}})),
        )
        .expect(1)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/campaigns/cmp-1/schedule"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .expect(1)
        .mount(&app.mailer_server)
        .await;

    let body = json!({"users": [
        {"email": "ursula@example.com", "name": "Ursula"},
        {"email": "leo@example.com", "name": "Leo"}
    ]})
    .to_string();

    let response = app.post_campaign(body).await;

    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn repeat_dispatches_provision_distinct_groups() {
    let app = spawn_app().await;

    Mock::given(path("/groups"))
        .and(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(2)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/groups"))
        .and(method("POST"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "grp-1"}})),
        )
        .expect(2)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/subscribers/ursula%40example.com"))
        .and(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"id": "sub-a"}})),
        )
        .expect(2)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/groups/grp-1/subscribers"))
        .and(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(2)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/subscribers/sub-a/groups/grp-1"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .expect(2)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/campaigns"))
        .and(method("POST"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "cmp-1"}})),
        )
        .expect(2)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/campaigns/cmp-1/schedule"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .expect(2)
        .mount(&app.mailer_server)
        .await;

    let first = app.post_campaign(single_user_body()).await;
    let second = app.post_campaign(single_user_body()).await;

    assert_eq!(200, first.status().as_u16());
    assert_eq!(200, second.status().as_u16());

    let requests = app
        .mailer_server
        .received_requests()
        .await
        .expect("Request recording is disabled");
    let group_names: Vec<Value> = requests
        .iter()
        .filter(|r| r.url.path() == "/groups" && r.method.as_str() == "POST")
        .map(|r| {
            serde_json::from_slice::<Value>(&r.body).expect("Group body is not JSON")["name"]
                .clone()
        })
        .collect();

    assert_eq!(2, group_names.len());
    assert_ne!(group_names[0], group_names[1]);
}

#[tokio::test]
async fn dispatch_aborts_when_the_mailer_rejects_a_write() {
    let app = spawn_app().await;

    Mock::given(path("/groups"))
        .and(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/groups"))
        .and(method("POST"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "grp-1"}})),
        )
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/subscribers/ursula%40example.com"))
        .and(method("GET"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"message": "Resource not found."})),
        )
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/subscribers"))
        .and(method("POST"))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_json(json!({"message": "Invalid email address."})),
        )
        .expect(1)
        .mount(&app.mailer_server)
        .await;
    // Terminal status: no downstream call may happen afterwards.
    Mock::given(path_regex("^/groups/.*/subscribers$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path_regex("^/campaigns.*"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.mailer_server)
        .await;

    let response = app.post_campaign(single_user_body()).await;

    assert_eq!(500, response.status().as_u16());
}

#[tokio::test]
async fn dispatch_aborts_on_a_status_outside_the_known_table() {
    let app = spawn_app().await;

    Mock::given(path("/groups"))
        .and(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path("/groups"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path_regex("^/subscribers.*"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.mailer_server)
        .await;
    Mock::given(path_regex("^/campaigns.*"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.mailer_server)
        .await;

    let response = app.post_campaign(single_user_body()).await;

    assert_eq!(500, response.status().as_u16());
}

#[tokio::test]
async fn dispatch_returns_500_when_the_secret_has_no_api_key_entry() {
    let app = spawn_app_with_secret_store(StubSecretStore::empty()).await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.mailer_server)
        .await;

    let response = app.post_campaign(single_user_body()).await;

    assert_eq!(500, response.status().as_u16());
}

#[tokio::test]
async fn dispatch_returns_500_when_the_secret_store_fails() {
    let app = spawn_app_with_secret_store(StubSecretStore::failing()).await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.mailer_server)
        .await;

    let response = app.post_campaign(single_user_body()).await;

    assert_eq!(500, response.status().as_u16());
}

#[tokio::test]
async fn dispatch_returns_500_when_the_mailer_api_is_unreachable() {
    let TestApp {
        address,
        mailer_server,
    } = spawn_app().await;
    drop(mailer_server);

    let response = reqwest::Client::new()
        .post(format!("{address}/campaigns"))
        .header("Content-Type", "application/json")
        .body(single_user_body())
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(500, response.status().as_u16());
}
