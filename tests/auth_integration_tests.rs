use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
};
use cms_backend::{
    AppState, MemoryRepository, RoleDirectory,
    auth::{Claims, DEV_USER_HEADER, Identity, issue_session_token, resolve_session},
    config::{AppConfig, Env},
    error::{AppError, ErrorKind},
    models::{
        CreateNavMenuRequest, NavMenu, NewPage, NewUser, Page, Role, UpdateNavMenuRequest,
        UpdatePageRequest, UpdateUserRequest, User,
    },
    repository::{Repository, RepositoryError, RepositoryResult, RepositoryState},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{sync::Arc, time::SystemTime};

// --- Mock Repository for a persistence outage ---

/// Every read fails, as if the database were unreachable.
struct UnreachableRepo;

fn outage<T>() -> RepositoryResult<T> {
    Err(RepositoryError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl Repository for UnreachableRepo {
    async fn list_roles(&self) -> RepositoryResult<Vec<Role>> {
        outage()
    }
    async fn find_user(&self, _id: i32) -> RepositoryResult<Option<User>> {
        outage()
    }
    async fn list_users(&self, _limit: i64, _offset: i64) -> RepositoryResult<Vec<User>> {
        outage()
    }
    async fn insert_user(&self, _user: NewUser) -> RepositoryResult<User> {
        outage()
    }
    async fn update_user(&self, _id: i32, _patch: UpdateUserRequest) -> RepositoryResult<Option<User>> {
        outage()
    }
    async fn delete_user(&self, _id: i32) -> RepositoryResult<bool> {
        outage()
    }
    async fn find_page(&self, _id: i32) -> RepositoryResult<Option<Page>> {
        outage()
    }
    async fn list_pages(&self, _limit: i64, _offset: i64) -> RepositoryResult<Vec<Page>> {
        outage()
    }
    async fn insert_page(&self, _page: NewPage) -> RepositoryResult<Page> {
        outage()
    }
    async fn update_page(&self, _id: i32, _patch: UpdatePageRequest) -> RepositoryResult<Option<Page>> {
        outage()
    }
    async fn delete_page(&self, _id: i32) -> RepositoryResult<bool> {
        outage()
    }
    async fn find_nav_menu(&self, _id: i32) -> RepositoryResult<Option<NavMenu>> {
        outage()
    }
    async fn list_nav_menus(&self, _limit: i64, _offset: i64) -> RepositoryResult<Vec<NavMenu>> {
        outage()
    }
    async fn insert_nav_menu(&self, _menu: CreateNavMenuRequest) -> RepositoryResult<NavMenu> {
        outage()
    }
    async fn update_nav_menu(
        &self,
        _id: i32,
        _patch: UpdateNavMenuRequest,
    ) -> RepositoryResult<Option<NavMenu>> {
        outage()
    }
    async fn delete_nav_menu(&self, _id: i32) -> RepositoryResult<bool> {
        outage()
    }
}

// --- Helpers ---

const EDITOR_ID: i32 = 7;

async fn repo_with_editor() -> RepositoryState {
    let repo = MemoryRepository::new();
    repo.seed_user(User {
        id: EDITOR_ID,
        first_name: "Eddie".to_string(),
        last_name: "Tor".to_string(),
        email: "eddie@example.com".to_string(),
        role_id: 3,
    })
    .await;
    Arc::new(repo)
}

fn now_secs() -> usize {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize
}

fn sign(claims: &Claims, secret: &str) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    headers
}

fn production_config() -> AppConfig {
    AppConfig {
        env: Env::Production,
        session_secret: "production-secret".to_string(),
        ..AppConfig::default()
    }
}

fn assert_unauthenticated(result: Result<Identity, AppError>) {
    let err = result.expect_err("session should have been rejected");
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

// --- Token flow ---

#[tokio::test]
async fn test_issued_token_resolves_to_identity() {
    let repo = repo_with_editor().await;
    let config = production_config();

    let token = issue_session_token(&config, EDITOR_ID).unwrap();
    let identity = resolve_session(&bearer(&token), &repo, &config)
        .await
        .unwrap();

    assert_eq!(
        identity,
        Identity {
            id: EDITOR_ID,
            role_id: 3
        }
    );
}

#[tokio::test]
async fn test_missing_authorization_header() {
    let repo = repo_with_editor().await;

    let result = resolve_session(&HeaderMap::new(), &repo, &production_config()).await;

    assert_unauthenticated(result);
}

#[tokio::test]
async fn test_non_bearer_scheme_is_rejected() {
    let repo = repo_with_editor().await;
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));

    let result = resolve_session(&headers, &repo, &production_config()).await;

    assert_unauthenticated(result);
}

#[tokio::test]
async fn test_token_signed_with_wrong_secret() {
    let repo = repo_with_editor().await;
    let claims = Claims {
        sub: EDITOR_ID.to_string(),
        exp: now_secs() + 3600,
        iat: now_secs(),
    };
    let token = sign(&claims, "some-other-secret");

    let result = resolve_session(&bearer(&token), &repo, &production_config()).await;

    assert_unauthenticated(result);
}

#[tokio::test]
async fn test_expired_token() {
    let repo = repo_with_editor().await;
    let config = production_config();
    let claims = Claims {
        sub: EDITOR_ID.to_string(),
        exp: now_secs() - 3600,
        iat: now_secs() - 7200,
    };
    let token = sign(&claims, &config.session_secret);

    let result = resolve_session(&bearer(&token), &repo, &config).await;

    assert_unauthenticated(result);
}

#[tokio::test]
async fn test_garbage_token() {
    let repo = repo_with_editor().await;

    let result = resolve_session(&bearer("not.a.jwt"), &repo, &production_config()).await;

    assert_unauthenticated(result);
}

#[tokio::test]
async fn test_subject_that_is_not_a_user_id() {
    let repo = repo_with_editor().await;
    let config = production_config();
    let claims = Claims {
        sub: "eddie".to_string(),
        exp: now_secs() + 3600,
        iat: now_secs(),
    };

    let result = resolve_session(&bearer(&sign(&claims, &config.session_secret)), &repo, &config).await;

    assert_unauthenticated(result);
}

#[tokio::test]
async fn test_valid_token_for_deleted_user() {
    let repo = repo_with_editor().await;
    let config = production_config();
    let token = issue_session_token(&config, EDITOR_ID).unwrap();

    repo.delete_user(EDITOR_ID).await.unwrap();
    let result = resolve_session(&bearer(&token), &repo, &config).await;

    assert_unauthenticated(result);
}

#[tokio::test]
async fn test_persistence_outage_is_not_an_auth_failure() {
    let repo = Arc::new(UnreachableRepo) as RepositoryState;
    let config = production_config();
    let token = issue_session_token(&config, EDITOR_ID).unwrap();

    let err = resolve_session(&bearer(&token), &repo, &config)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unexpected);
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// --- Local bypass ---

#[tokio::test]
async fn test_local_bypass_header() {
    let repo = repo_with_editor().await;
    let mut headers = HeaderMap::new();
    headers.insert(DEV_USER_HEADER, HeaderValue::from_static("7"));

    let identity = resolve_session(&headers, &repo, &AppConfig::default())
        .await
        .unwrap();

    assert_eq!(identity.id, EDITOR_ID);
    assert_eq!(identity.role_id, 3);
}

#[tokio::test]
async fn test_local_bypass_for_unknown_user_falls_back_to_token() {
    let repo = repo_with_editor().await;
    let mut headers = HeaderMap::new();
    headers.insert(DEV_USER_HEADER, HeaderValue::from_static("999"));

    let result = resolve_session(&headers, &repo, &AppConfig::default()).await;

    assert_unauthenticated(result);
}

#[tokio::test]
async fn test_bypass_header_ignored_in_production() {
    let repo = repo_with_editor().await;
    let mut headers = HeaderMap::new();
    headers.insert(DEV_USER_HEADER, HeaderValue::from_static("7"));

    let result = resolve_session(&headers, &repo, &production_config()).await;

    assert_unauthenticated(result);
}

// --- Extractor ---

#[tokio::test]
async fn test_identity_extractor_uses_app_state() {
    let repo = repo_with_editor().await;
    let config = production_config();
    let token = issue_session_token(&config, EDITOR_ID).unwrap();
    let roles = RoleDirectory::load(&repo).await.unwrap();
    let state = AppState {
        repo,
        config,
        roles: Arc::new(roles),
    };

    let request = Request::builder()
        .uri("/me")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(())
        .unwrap();
    let (mut parts, _) = request.into_parts();

    let identity = Identity::from_request_parts(&mut parts, &state).await.unwrap();
    assert_eq!(identity.id, EDITOR_ID);

    let (mut anonymous, _) = Request::builder().uri("/me").body(()).unwrap().into_parts();
    let rejection = Identity::from_request_parts(&mut anonymous, &state)
        .await
        .unwrap_err();
    assert_eq!(rejection.kind(), ErrorKind::Unauthenticated);
}
