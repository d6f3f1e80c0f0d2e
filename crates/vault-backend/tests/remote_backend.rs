//! Integration tests for the hosted backend against an in-process fake of the
//! identity, token and document REST endpoints.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};

use vault_backend::config::FirebaseConfig;
use vault_backend::remote::{REMOTE_SESSION_KEY, RemoteBackend};
use vault_backend::{AuthNotifier, Backend};
use vault_db::Database;
use vault_types::auth::AuthError;
use vault_types::models::{AccountPatch, NewAccount, User};

// -- Fake service --

struct FakeUser {
    local_id: String,
    email: String,
    password: String,
    display_name: Option<String>,
}

#[derive(Default)]
struct FakeState {
    users: Mutex<Vec<FakeUser>>,
    docs: Mutex<BTreeMap<String, serde_json::Map<String, Value>>>,
    next_id: AtomicU64,
    /// Held before answering a token refresh.
    refresh_delay_ms: AtomicU64,
}

type Fake = Arc<FakeState>;

fn rejected(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({"error": {"code": status.as_u16(), "message": message}})),
    )
        .into_response()
}

fn grant(user: &FakeUser) -> Value {
    json!({
        "idToken": format!("id-{}", user.local_id),
        "refreshToken": format!("refresh-{}", user.local_id),
        "expiresIn": "3600",
        "localId": user.local_id,
        "email": user.email,
        "displayName": user.display_name.clone().unwrap_or_default(),
    })
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer id-"))
}

async fn sign_up(State(fake): State<Fake>, Json(body): Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default().to_lowercase();
    let password = body["password"].as_str().unwrap_or_default().to_string();

    let mut users = fake.users.lock().unwrap();
    if users.iter().any(|u| u.email == email) {
        return rejected(StatusCode::BAD_REQUEST, "EMAIL_EXISTS");
    }
    let user = FakeUser {
        local_id: format!("uid{}", fake.next_id.fetch_add(1, Ordering::SeqCst)),
        email,
        password,
        display_name: None,
    };
    let body = grant(&user);
    users.push(user);
    Json(body).into_response()
}

async fn sign_in(State(fake): State<Fake>, Json(body): Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default().to_lowercase();
    let password = body["password"].as_str().unwrap_or_default();

    let users = fake.users.lock().unwrap();
    match users.iter().find(|u| u.email == email && u.password == password) {
        Some(user) => Json(grant(user)).into_response(),
        None => rejected(StatusCode::BAD_REQUEST, "INVALID_LOGIN_CREDENTIALS"),
    }
}

async fn update_profile(State(fake): State<Fake>, Json(body): Json<Value>) -> Response {
    let token = body["idToken"].as_str().unwrap_or_default();
    let mut users = fake.users.lock().unwrap();
    match users.iter_mut().find(|u| format!("id-{}", u.local_id) == token) {
        Some(user) => {
            user.display_name = body["displayName"].as_str().map(str::to_string);
            Json(json!({"localId": user.local_id})).into_response()
        }
        None => rejected(StatusCode::BAD_REQUEST, "INVALID_ID_TOKEN"),
    }
}

async fn refresh(State(fake): State<Fake>, body: String) -> Response {
    let delay = fake.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    let token = body
        .split('&')
        .find_map(|kv| kv.strip_prefix("refresh_token="))
        .unwrap_or_default();
    let users = fake.users.lock().unwrap();
    match users.iter().find(|u| format!("refresh-{}", u.local_id) == token) {
        Some(user) => Json(json!({
            "id_token": format!("id-{}", user.local_id),
            "refresh_token": format!("refresh-{}", user.local_id),
            "expires_in": "3600",
            "user_id": user.local_id,
        }))
        .into_response(),
        None => rejected(StatusCode::BAD_REQUEST, "INVALID_REFRESH_TOKEN"),
    }
}

fn document(id: &str, fields: &serde_json::Map<String, Value>) -> Value {
    json!({
        "name": format!("projects/vault-test/databases/(default)/documents/social_accounts/{}", id),
        "fields": fields,
    })
}

async fn run_query(State(fake): State<Fake>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return rejected(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED");
    }
    let owner = body["structuredQuery"]["where"]["fieldFilter"]["value"]["stringValue"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    let docs = fake.docs.lock().unwrap();
    let rows: Vec<Value> = docs
        .iter()
        .filter(|(_, f)| f["userId"]["stringValue"] == owner.as_str())
        .map(|(id, f)| json!({"document": document(id, f), "readTime": "2024-01-01T00:00:00Z"}))
        .collect();

    if rows.is_empty() {
        return Json(json!([{"readTime": "2024-01-01T00:00:00Z"}])).into_response();
    }
    Json(Value::Array(rows)).into_response()
}

async fn create_doc(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return rejected(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED");
    }
    let id = format!("doc{:04}", fake.next_id.fetch_add(1, Ordering::SeqCst));
    let fields = body["fields"].as_object().cloned().unwrap_or_default();
    let resp = document(&id, &fields);
    fake.docs.lock().unwrap().insert(id, fields);
    Json(resp).into_response()
}

async fn patch_doc(
    State(fake): State<Fake>,
    Path((_project, _db, id)): Path<(String, String, String)>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return rejected(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED");
    }
    let mut docs = fake.docs.lock().unwrap();
    let Some(fields) = docs.get_mut(&id) else {
        return rejected(StatusCode::NOT_FOUND, "No document to update");
    };

    let updates = body["fields"].as_object().cloned().unwrap_or_default();
    for (key, path) in &params {
        if key != "updateMask.fieldPaths" {
            continue;
        }
        match updates.get(path) {
            Some(v) => {
                fields.insert(path.clone(), v.clone());
            }
            None => {
                fields.remove(path);
            }
        }
    }
    Json(document(&id, fields)).into_response()
}

async fn get_doc(
    State(fake): State<Fake>,
    Path((_project, _db, id)): Path<(String, String, String)>,
) -> Response {
    match fake.docs.lock().unwrap().get(&id) {
        Some(fields) => Json(document(&id, fields)).into_response(),
        None => rejected(StatusCode::NOT_FOUND, "Document not found"),
    }
}

async fn delete_doc(
    State(fake): State<Fake>,
    Path((_project, _db, id)): Path<(String, String, String)>,
) -> Response {
    fake.docs.lock().unwrap().remove(&id);
    Json(json!({})).into_response()
}

async fn spawn_fake() -> (String, Fake) {
    let fake: Fake = Arc::new(FakeState::default());
    let docs = "/v1/projects/{project}/databases/{database}";

    let app = Router::new()
        .route("/v1/accounts:signUp", post(sign_up))
        .route("/v1/accounts:signInWithPassword", post(sign_in))
        .route("/v1/accounts:update", post(update_profile))
        .route("/v1/token", post(refresh))
        .route(&format!("{}/documents:runQuery", docs), post(run_query))
        .route(&format!("{}/documents/social_accounts", docs), post(create_doc))
        .route(
            &format!("{}/documents/social_accounts/{{id}}", docs),
            get(get_doc).patch(patch_doc).delete(delete_doc),
        )
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), fake)
}

// -- Helpers --

async fn connect(base: &str, db: Arc<Database>) -> Arc<RemoteBackend> {
    let config = FirebaseConfig::for_endpoint(base, "test-key", "vault-test");
    RemoteBackend::connect(&config, db).expect("connect should succeed")
}

fn new_account(user_id: &str, platform: &str) -> NewAccount {
    NewAccount {
        user_id: user_id.to_string(),
        platform: platform.to_string(),
        username: "handle".to_string(),
        password: Some("tracked-secret".to_string()),
        profile_url: None,
        note: "n".to_string(),
    }
}

fn recorder() -> (
    vault_backend::session::AuthCallback,
    Arc<Mutex<Vec<Option<User>>>>,
) {
    let seen: Arc<Mutex<Vec<Option<User>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (
        Box::new(move |u: Option<User>| sink.lock().unwrap().push(u)),
        seen,
    )
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// -- Tests --

#[tokio::test]
async fn register_and_login_round_trip() {
    let (base, _fake) = spawn_fake().await;
    let backend = connect(&base, Arc::new(Database::open_in_memory().unwrap())).await;

    let registered = backend
        .register("a@x.com", "secret1", Some("A"))
        .await
        .expect("registration should succeed");
    assert_eq!(registered.name.as_deref(), Some("A"));

    assert_eq!(
        backend.login("a@x.com", "wrong1").await,
        Err(AuthError::WrongEmailOrPassword)
    );

    let user = backend.login("a@x.com", "secret1").await.unwrap();
    assert_eq!(user.id, registered.id);
    assert_eq!(user.name.as_deref(), Some("A"));
}

#[tokio::test]
async fn duplicate_email_maps_to_email_in_use() {
    let (base, fake) = spawn_fake().await;
    let backend = connect(&base, Arc::new(Database::open_in_memory().unwrap())).await;

    backend.register("a@x.com", "secret1", None).await.unwrap();
    assert_eq!(
        backend.register("a@x.com", "secret2", None).await,
        Err(AuthError::EmailInUse)
    );
    assert_eq!(fake.users.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn data_operations_round_trip() {
    let (base, fake) = spawn_fake().await;
    let backend = connect(&base, Arc::new(Database::open_in_memory().unwrap())).await;
    let user = backend.register("a@x.com", "secret1", None).await.unwrap();

    let older = backend.create_account(new_account(&user.id, "GitHub")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let newer = backend.create_account(new_account(&user.id, "Reddit")).await.unwrap();
    backend.create_account(new_account("someone-else", "Tumblr")).await.unwrap();

    let accounts = backend.get_accounts(&user.id).await;
    assert_eq!(accounts, vec![newer.clone(), older.clone()]);

    let updated = backend
        .update_account(&older.id, AccountPatch::note("x"))
        .await
        .unwrap();
    let mut expected = older.clone();
    expected.note = "x".to_string();
    assert_eq!(updated, expected);

    backend.delete_account(&newer.id).await.unwrap();
    backend.delete_account("does-not-exist").await.unwrap();
    assert_eq!(backend.get_accounts(&user.id).await, vec![expected]);
    assert_eq!(fake.docs.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn sign_in_password_never_reaches_the_document_store() {
    let (base, fake) = spawn_fake().await;
    let backend = connect(&base, Arc::new(Database::open_in_memory().unwrap())).await;
    let user = backend.register("a@x.com", "secret1", None).await.unwrap();
    backend.create_account(new_account(&user.id, "GitHub")).await.unwrap();

    let docs = serde_json::to_string(&*fake.docs.lock().unwrap()).unwrap();
    assert!(!docs.contains("secret1"));
}

#[tokio::test]
async fn update_of_missing_document_is_not_found() {
    let (base, _fake) = spawn_fake().await;
    let backend = connect(&base, Arc::new(Database::open_in_memory().unwrap())).await;
    backend.register("a@x.com", "secret1", None).await.unwrap();

    let err = backend
        .update_account("nope", AccountPatch::note("x"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Account not found"));
}

#[tokio::test]
async fn signed_out_reads_fail_open_and_writes_fail() {
    let (base, _fake) = spawn_fake().await;
    let backend = connect(&base, Arc::new(Database::open_in_memory().unwrap())).await;

    assert!(backend.get_accounts("uid0").await.is_empty());
    assert!(backend.create_account(new_account("uid0", "GitHub")).await.is_err());
}

#[tokio::test]
async fn fresh_start_reports_signed_out() {
    let (base, _fake) = spawn_fake().await;
    let backend = connect(&base, Arc::new(Database::open_in_memory().unwrap())).await;

    let (callback, seen) = recorder();
    let _sub = backend.on_auth_change(callback).unwrap();
    settle().await;
    assert_eq!(*seen.lock().unwrap(), vec![None]);
}

#[tokio::test]
async fn saved_session_is_restored_on_reconnect() {
    let (base, _fake) = spawn_fake().await;
    let db = Arc::new(Database::open_in_memory().unwrap());

    let first = connect(&base, db.clone()).await;
    let user = first.register("a@x.com", "secret1", Some("A")).await.unwrap();
    drop(first);
    assert!(db.get_item(REMOTE_SESSION_KEY).unwrap().is_some());

    let second = connect(&base, db.clone()).await;
    let (callback, seen) = recorder();
    let _sub = second.on_auth_change(callback).unwrap();
    settle().await;
    assert_eq!(*seen.lock().unwrap(), vec![Some(user.clone())]);

    // the restored token works for data calls
    second.create_account(new_account(&user.id, "GitHub")).await.unwrap();
    assert_eq!(second.get_accounts(&user.id).await.len(), 1);

    second.logout().await.unwrap();
    settle().await;
    assert_eq!(db.get_item(REMOTE_SESSION_KEY).unwrap(), None);
    assert_eq!(seen.lock().unwrap().last(), Some(&None));
}

#[tokio::test]
async fn rejected_saved_session_is_discarded() {
    let (base, _fake) = spawn_fake().await;
    let db = Arc::new(Database::open_in_memory().unwrap());
    db.set_json(
        REMOTE_SESSION_KEY,
        &json!({
            "user": {"id": "uid-gone", "email": "gone@x.com"},
            "idToken": "id-uid-gone",
            "refreshToken": "refresh-uid-gone",
            "expiresAt": 0,
        }),
    )
    .unwrap();

    let backend = connect(&base, db.clone()).await;
    let (callback, seen) = recorder();
    let _sub = backend.on_auth_change(callback).unwrap();
    settle().await;

    assert_eq!(*seen.lock().unwrap(), vec![None]);
    assert_eq!(db.get_item(REMOTE_SESSION_KEY).unwrap(), None);
}

#[tokio::test]
async fn sign_in_during_slow_restore_is_kept() {
    let (base, fake) = spawn_fake().await;
    let db = Arc::new(Database::open_in_memory().unwrap());

    let first = connect(&base, db.clone()).await;
    let b = first.register("b@x.com", "secret1", None).await.unwrap();
    let a = first.register("a@x.com", "secret1", None).await.unwrap();
    drop(first);

    fake.refresh_delay_ms.store(300, Ordering::SeqCst);
    let second = connect(&base, db.clone()).await;
    let (callback, seen) = recorder();
    let _sub = second.on_auth_change(callback).unwrap();

    let signed_in = second.login("b@x.com", "secret1").await.unwrap();
    assert_eq!(signed_in.id, b.id);
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(seen.lock().unwrap().last(), Some(&Some(signed_in.clone())));
    assert!(!seen.lock().unwrap().contains(&Some(a)));
    let saved: Value = db.get_json(REMOTE_SESSION_KEY).unwrap().unwrap();
    assert_eq!(saved["user"]["id"], json!(b.id));

    // data calls run with the new sign-in's token
    second.create_account(new_account(&b.id, "GitHub")).await.unwrap();
    assert_eq!(second.try_get_accounts(&b.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn sign_out_during_slow_restore_is_kept() {
    let (base, fake) = spawn_fake().await;
    let db = Arc::new(Database::open_in_memory().unwrap());

    let first = connect(&base, db.clone()).await;
    first.register("a@x.com", "secret1", None).await.unwrap();
    drop(first);

    fake.refresh_delay_ms.store(300, Ordering::SeqCst);
    let second = connect(&base, db.clone()).await;
    let (callback, seen) = recorder();
    let _sub = second.on_auth_change(callback).unwrap();

    second.logout().await.unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(seen.lock().unwrap().last(), Some(&None));
    assert_eq!(db.get_item(REMOTE_SESSION_KEY).unwrap(), None);
    assert!(matches!(
        second.try_get_accounts("anyone").await,
        Err(vault_backend::error::VaultError::NotAuthenticated)
    ));
}
