#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use campus_api::auth::jwt::{generate_access_token, JwtConfig};
use campus_api::auth::password::hash_password;
use campus_api::config::{NotifyConfig, RateLimitConfig, ServerConfig};
use campus_api::middleware::auth::TENANT_HEADER;
use campus_api::router::build_app_router;
use campus_api::state::AppState;
use campus_core::roles::Role;
use campus_core::scheduling::SolverConfig;
use campus_core::store::{IdentityStore, MemoryStore, Store};
use campus_core::tenancy::{Membership, NewTenant, NewUser, Tenant, TenantType, User};
use campus_events::EventBus;

/// Plaintext password of every seeded user.
pub const PASSWORD: &str = "correct horse battery staple";

/// Build a test `ServerConfig` over the in-process store.
///
/// The rate limit is generous so ordinary tests never trip it.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        database_url: "memory://".to_string(),
        jwt: JwtConfig {
            secret: "test-secret-do-not-use-in-production".to_string(),
            access_token_expiry_mins: 15,
        },
        rate_limit: RateLimitConfig {
            capacity: 1000.0,
            refill_per_sec: 100.0,
        },
        solver: SolverConfig::default(),
        notify: NotifyConfig::default(),
    }
}

/// A running application over a seeded tenant.
///
/// The tenant has one user per role; all share [`PASSWORD`].
pub struct TestApp {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub event_bus: Arc<EventBus>,
    pub config: ServerConfig,
    pub tenant: Tenant,
    pub admin: User,
    pub advisor: User,
    pub instructor: User,
    pub student: User,
    pub other_student: User,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: ServerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let tenant = create_tenant(&store, "north").await;
        let password_hash = hash_password(PASSWORD).unwrap();

        let mut users = Vec::new();
        for (username, role) in [
            ("admin", Role::Admin),
            ("advisor", Role::Advisor),
            ("instructor", Role::Instructor),
            ("student", Role::Student),
            ("other", Role::Student),
        ] {
            let user = create_user(&store, username, &password_hash).await;
            add_membership(&store, &tenant, &user, role).await;
            users.push(user);
        }
        let mut users = users.into_iter();
        let mut next = || users.next().unwrap();

        let event_bus = Arc::new(EventBus::default());
        let dyn_store: Arc<dyn Store> = store.clone();
        let state = AppState::new(dyn_store, config.clone(), Arc::clone(&event_bus));
        let app = build_app_router(state, &config).unwrap();

        Self {
            app,
            store,
            event_bus,
            config,
            tenant,
            admin: next(),
            advisor: next(),
            instructor: next(),
            student: next(),
            other_student: next(),
        }
    }

    /// Access token for `user` logged into the seeded tenant.
    pub fn token(&self, user: &User) -> String {
        generate_access_token(user.id, self.tenant.id, Role::Student, &self.config.jwt).unwrap()
    }

    pub async fn get(&self, uri: &str, user: &User) -> Response<Body> {
        send(self.app.clone(), Method::GET, uri, Some(&self.token(user)), None).await
    }

    pub async fn post(&self, uri: &str, user: &User, body: serde_json::Value) -> Response<Body> {
        send(self.app.clone(), Method::POST, uri, Some(&self.token(user)), Some(body)).await
    }

    pub async fn put(&self, uri: &str, user: &User, body: serde_json::Value) -> Response<Body> {
        send(self.app.clone(), Method::PUT, uri, Some(&self.token(user)), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, user: &User, body: serde_json::Value) -> Response<Body> {
        send(self.app.clone(), Method::PATCH, uri, Some(&self.token(user)), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, user: &User) -> Response<Body> {
        send(self.app.clone(), Method::DELETE, uri, Some(&self.token(user)), None).await
    }
}

pub async fn create_tenant(store: &MemoryStore, slug: &str) -> Tenant {
    store
        .create_tenant(&NewTenant {
            slug: slug.to_string(),
            name: format!("{slug} university"),
            tenant_type: TenantType::University,
            enabled_services: vec![],
        })
        .await
        .unwrap()
}

pub async fn create_user(store: &MemoryStore, username: &str, password_hash: &str) -> User {
    store
        .create_user(&NewUser {
            username: username.to_string(),
            email: format!("{username}@example.edu"),
            password_hash: password_hash.to_string(),
            display_name: username.to_string(),
            program_id: None,
            cohort_id: None,
        })
        .await
        .unwrap()
}

pub async fn add_membership(store: &MemoryStore, tenant: &Tenant, user: &User, role: Role) {
    store
        .upsert_membership(&Membership {
            tenant_id: tenant.id,
            user_id: user.id,
            role,
        })
        .await
        .unwrap();
}

/// Send one request through the router.
pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

/// Send a request with an explicit `X-Tenant-ID` header.
pub async fn get_in_tenant(app: Router, uri: &str, token: &str, tenant: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .header(TENANT_HEADER, tenant)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Unauthenticated GET.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, None).await
}

/// Unauthenticated JSON POST.
pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, None, Some(body)).await
}

/// Collect and parse a JSON response body.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
