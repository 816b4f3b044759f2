// ABOUTME: Integration tests for ProductSyncer and the admin client against a stub admin API
// ABOUTME: The stub is a wiremock server whose responder keeps products in memory

use std::sync::{Arc, Mutex};

use entity_sync::catalog::{LocalProducts, ProductCatalog, ProductInput};
use entity_sync::remote::{AdminClient, AdminTokenService, TokenStore, DEFAULT_REQUEST_TIMEOUT};
use entity_sync::syncer::ProductSyncer;
use entity_sync::{
    ChangeRecorder, DeleteRemote, EventBus, OrchestratorConfig, SyncContext, SyncError,
    SyncOrchestrator, Syncer,
};
use serde_json::{json, Value};
use sync_ledger::{ChangeLedger, ChangeOperation, CursorStore, NewChange, SqliteStore};
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

#[derive(Default)]
struct StubAdminApi {
    products: Vec<Value>,
    next_id: u64,
    operations: Vec<String>,
    auth_headers: Vec<Option<String>>,
    fail_status: Option<u16>,
    graphql_error: Option<String>,
    refuse_delete: bool,
}

type Shared = Arc<Mutex<StubAdminApi>>;

struct AdminApiResponder(Shared);

impl Respond for AdminApiResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let auth = request
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body: Value = request.body_json().unwrap_or(Value::Null);
        let (status, body) = handle(&self.0, &body, auth);
        ResponseTemplate::new(status).set_body_json(body)
    }
}

/// Starts the stub. The server stops when the returned handle is dropped.
async fn spawn_admin_api(state: Shared) -> (MockServer, String) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/admin-api"))
        .respond_with(AdminApiResponder(state))
        .mount(&server)
        .await;
    let url = format!("{}/admin-api", server.uri());
    (server, url)
}

fn handle(state: &Mutex<StubAdminApi>, request: &Value, auth: Option<String>) -> (u16, Value) {
    let mut api = state.lock().unwrap();
    api.auth_headers.push(auth);
    if let Some(status) = api.fail_status {
        return (status, json!({}));
    }
    if let Some(ref message) = api.graphql_error {
        return (200, json!({ "data": null, "errors": [{ "message": message }] }));
    }

    let query = request["query"].as_str().unwrap_or_default();
    let vars = &request["variables"];
    let data = if query.contains("createProduct(") {
        api.operations.push("createProduct".to_string());
        api.next_id += 1;
        let input = &vars["input"];
        let product = json!({
            "id": api.next_id.to_string(),
            "externalId": input["externalId"],
            "name": input["name"],
            "slug": input["slug"],
        });
        api.products.push(product.clone());
        json!({ "createProduct": product })
    } else if query.contains("updateProduct(") {
        api.operations.push("updateProduct".to_string());
        let input = &vars["input"];
        let Some(product) = api.products.iter_mut().find(|p| p["id"] == input["id"]) else {
            return (200, json!({ "data": null, "errors": [{ "message": "not found" }] }));
        };
        product["name"] = input["name"].clone();
        product["slug"] = input["slug"].clone();
        json!({ "updateProduct": product.clone() })
    } else if query.contains("deleteProduct(") {
        api.operations.push("deleteProduct".to_string());
        if api.refuse_delete {
            json!({ "deleteProduct": { "result": "NOT_DELETED", "message": "product is in use" } })
        } else {
            let id = vars["id"].clone();
            api.products.retain(|p| p["id"] != id);
            json!({ "deleteProduct": { "result": "DELETED" } })
        }
    } else if query.contains("login(") {
        api.operations.push("login".to_string());
        if vars["password"] == "wrong" {
            json!({
                "login": {
                    "errorCode": "INVALID_CREDENTIALS_ERROR",
                    "message": "bad credentials",
                }
            })
        } else {
            json!({ "login": { "token": "issued-token" } })
        }
    } else if query.contains("products(") {
        api.operations.push("products".to_string());
        let skip = vars["options"]["skip"].as_u64().unwrap_or(0) as usize;
        let take = vars["options"]["take"].as_u64().unwrap_or(10) as usize;
        let items: Vec<Value> = api.products.iter().skip(skip).take(take).cloned().collect();
        json!({ "products": { "items": items, "totalItems": api.products.len() } })
    } else {
        return (400, json!({}));
    };
    (200, json!({ "data": data }))
}

fn product_input(id: &str, name: &str) -> ProductInput {
    ProductInput {
        id: id.to_string(),
        name: name.to_string(),
        slug: name.to_lowercase(),
    }
}

async fn syncer_for(url: &str, catalog: Arc<ProductCatalog>) -> ProductSyncer {
    let client = AdminClient::authenticated(url, "test-token", DEFAULT_REQUEST_TIMEOUT).unwrap();
    ProductSyncer::new(client, catalog)
}

#[tokio::test]
async fn push_creates_then_updates_by_external_id() {
    let api = Shared::default();
    let (_server, url) = spawn_admin_api(api.clone()).await;
    let catalog = Arc::new(ProductCatalog::open_in_memory(None).unwrap());
    let syncer = syncer_for(&url, catalog.clone()).await;
    let ctx = SyncContext::admin(None);

    let chair = catalog
        .upsert_product(&ctx, &product_input("P1", "Chair"))
        .await
        .unwrap();
    syncer.push(&ctx, std::slice::from_ref(&chair)).await.unwrap();

    let renamed = catalog
        .upsert_product(&ctx, &product_input("P1", "Armchair"))
        .await
        .unwrap();
    syncer.push(&ctx, std::slice::from_ref(&renamed)).await.unwrap();
    syncer.push(&ctx, std::slice::from_ref(&renamed)).await.unwrap();

    let api = api.lock().unwrap();
    assert_eq!(api.products.len(), 1);
    assert_eq!(api.products[0]["externalId"], "P1");
    assert_eq!(api.products[0]["name"], "Armchair");
    let mutations: Vec<&str> = api
        .operations
        .iter()
        .map(String::as_str)
        .filter(|op| *op != "products")
        .collect();
    assert_eq!(mutations, vec!["createProduct", "updateProduct", "updateProduct"]);
    assert!(api
        .auth_headers
        .iter()
        .all(|h| h.as_deref() == Some("Bearer test-token")));
}

#[tokio::test]
async fn fetch_remote_walks_every_page() {
    let api = Shared::default();
    {
        let mut api = api.lock().unwrap();
        for i in 0..150 {
            api.products.push(json!({
                "id": format!("r{i}"),
                "name": format!("Item {i}"),
                "slug": format!("item-{i}"),
            }));
        }
    }
    let (_server, url) = spawn_admin_api(api.clone()).await;
    let catalog = Arc::new(ProductCatalog::open_in_memory(None).unwrap());
    let syncer = syncer_for(&url, catalog).await;

    let remotes = syncer.fetch_remote(&SyncContext::admin(None)).await.unwrap();

    assert_eq!(remotes.len(), 150);
    assert_eq!(remotes[149].id, "r149");
    assert_eq!(api.lock().unwrap().operations, vec!["products", "products"]);
}

#[tokio::test]
async fn pull_updates_catalog_without_recording_changes() {
    let api = Shared::default();
    let (_server, url) = spawn_admin_api(api.clone()).await;
    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let catalog = Arc::new(ProductCatalog::open_in_memory(Some(bus)).unwrap());
    let syncer = syncer_for(&url, catalog.clone()).await;
    let ctx = SyncContext::admin(None);

    catalog
        .upsert_product(&ctx, &product_input("P1", "Chair"))
        .await
        .unwrap();
    events.recv().await.unwrap();

    let remote = serde_json::from_value(json!({
        "id": "7",
        "externalId": "P1",
        "name": "Desk chair",
        "slug": "desk-chair",
    }))
    .unwrap();
    syncer.pull(&ctx, &[remote]).await.unwrap();

    let stored = catalog.find("P1").unwrap().unwrap();
    assert_eq!(stored.name, "Desk chair");
    assert_eq!(stored.slug, "desk-chair");
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn recorded_catalog_edits_reach_the_remote() {
    let api = Shared::default();
    let (_server, url) = spawn_admin_api(api.clone()).await;
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let bus = EventBus::default();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let listener = ChangeRecorder::new(store.clone()).spawn(&bus, shutdown_rx);
    let catalog = Arc::new(ProductCatalog::open_in_memory(Some(bus)).unwrap());
    let ctx = SyncContext::admin(Some("tester".to_string()));

    catalog
        .upsert_product(&ctx, &product_input("P1", "Chair"))
        .await
        .unwrap();
    catalog
        .upsert_product(&ctx, &product_input("P2", "Table"))
        .await
        .unwrap();
    shutdown_tx.send(()).unwrap();
    assert_eq!(listener.await.unwrap(), 2);

    let orch = SyncOrchestrator::new(
        vec![Box::new(syncer_for(&url, catalog.clone()).await)],
        store.clone(),
        store.clone(),
        OrchestratorConfig::default(),
    );
    let report = orch.run_incremental(&ctx).await.unwrap();

    let product = report.entity("Product").unwrap();
    assert!(report.is_success());
    assert_eq!(product.pushed, 2);
    assert_eq!(product.pulled, 2);
    assert_eq!(api.lock().unwrap().products.len(), 2);
    assert!(store.find_by_entity("Product").unwrap().is_some());

    let again = orch.run_incremental(&ctx).await.unwrap();
    assert_eq!(again.processed(), 0);
}

#[tokio::test]
async fn rejected_credentials_surface_as_remote_error() {
    let api = Shared::default();
    api.lock().unwrap().fail_status = Some(401);
    let (_server, url) = spawn_admin_api(api.clone()).await;
    let catalog = Arc::new(ProductCatalog::open_in_memory(None).unwrap());
    let syncer = syncer_for(&url, catalog).await;

    let err = syncer
        .fetch_remote(&SyncContext::admin(None))
        .await
        .unwrap_err();
    match err.downcast_ref::<SyncError>() {
        Some(SyncError::Remote { status, .. }) => assert_eq!(*status, 401),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn graphql_errors_are_not_swallowed() {
    let api = Shared::default();
    api.lock().unwrap().graphql_error = Some("Forbidden resource".to_string());
    let (_server, url) = spawn_admin_api(api.clone()).await;
    let catalog = Arc::new(ProductCatalog::open_in_memory(None).unwrap());
    let syncer = syncer_for(&url, catalog).await;

    let err = syncer
        .fetch_remote(&SyncContext::admin(None))
        .await
        .unwrap_err();
    match err.downcast_ref::<SyncError>() {
        Some(SyncError::GraphQl(messages)) => assert_eq!(messages, &["Forbidden resource"]),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn login_issues_and_stores_token() {
    let api = Shared::default();
    let (_server, url) = spawn_admin_api(api.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let store = TokenStore::new(dir.path().join("token"));
    let service = AdminTokenService::new(
        AdminClient::new(&url, DEFAULT_REQUEST_TIMEOUT).unwrap(),
        store.clone(),
    );

    let token = service
        .generate_permanent_token("superadmin", "superadmin")
        .await
        .unwrap();
    assert_eq!(token, "issued-token");
    assert_eq!(store.load().unwrap().as_deref(), Some("issued-token"));
    assert_eq!(api.lock().unwrap().auth_headers, vec![None]);

    assert!(service
        .generate_permanent_token("superadmin", "wrong")
        .await
        .is_err());
}

#[tokio::test]
async fn deleted_change_soft_deletes_the_catalog_row() {
    let api = Shared::default();
    let (_server, url) = spawn_admin_api(api.clone()).await;
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let catalog = Arc::new(ProductCatalog::open_in_memory(None).unwrap());
    let ctx = SyncContext::admin(None);
    catalog
        .upsert_product(&ctx, &product_input("P1", "Chair"))
        .await
        .unwrap();
    store
        .append(&NewChange::new("Product", "P1", ChangeOperation::Deleted))
        .unwrap();

    let orch = SyncOrchestrator::new(
        vec![Box::new(syncer_for(&url, catalog.clone()).await)],
        store.clone(),
        store.clone(),
        OrchestratorConfig::default(),
    );
    let report = orch.run_incremental(&ctx).await.unwrap();

    let product = report.entity("Product").unwrap();
    assert!(report.is_success());
    assert_eq!(product.deleted, 1);
    assert_eq!(product.pushed, 0);
    assert!(catalog.find("P1").unwrap().unwrap().deleted_at.is_some());
    assert!(catalog.list_products().await.unwrap().is_empty());
    assert!(api.lock().unwrap().operations.is_empty());
}

#[tokio::test]
async fn delete_remote_removes_the_remote_product() {
    let api = Shared::default();
    let (_server, url) = spawn_admin_api(api.clone()).await;
    let catalog = Arc::new(ProductCatalog::open_in_memory(None).unwrap());
    let syncer = syncer_for(&url, catalog.clone()).await;
    let ctx = SyncContext::admin(None);

    let chair = catalog
        .upsert_product(&ctx, &product_input("P1", "Chair"))
        .await
        .unwrap();
    syncer.push(&ctx, std::slice::from_ref(&chair)).await.unwrap();
    let remote_id = api.lock().unwrap().products[0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    syncer
        .remote_deletion()
        .unwrap()
        .delete_remote(&ctx, &[remote_id])
        .await
        .unwrap();

    let api = api.lock().unwrap();
    assert!(api.products.is_empty());
    assert_eq!(api.operations.last().map(String::as_str), Some("deleteProduct"));
}

#[tokio::test]
async fn refused_remote_delete_is_an_error() {
    let api = Shared::default();
    api.lock().unwrap().refuse_delete = true;
    let (_server, url) = spawn_admin_api(api.clone()).await;
    let catalog = Arc::new(ProductCatalog::open_in_memory(None).unwrap());
    let syncer = syncer_for(&url, catalog).await;

    let err = syncer
        .remote_deletion()
        .unwrap()
        .delete_remote(&SyncContext::admin(None), &["1".to_string()])
        .await
        .unwrap_err();

    assert!(err.to_string().contains("product is in use"));
}
