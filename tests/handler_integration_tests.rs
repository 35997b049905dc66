use axum::{Json, extract::State};
use cms_backend::{
    AppState, MemoryRepository, RoleDirectory,
    auth::Identity,
    config::AppConfig,
    error::ErrorKind,
    handlers::{nav, pages, users},
    models::{NavMenu, NewPage, Page, User},
    repository::{Repository, RepositoryState},
    validation::RawInput,
};
use serde_json::json;
use std::sync::Arc;
use tokio::test;

// --- TEST UTILITIES ---

const ADMIN: Identity = Identity { id: 1, role_id: 1 };
const MANAGER: Identity = Identity { id: 2, role_id: 2 };
const EDITOR: Identity = Identity { id: 3, role_id: 3 };

fn user(identity: Identity, first_name: &str) -> User {
    User {
        id: identity.id,
        first_name: first_name.to_string(),
        last_name: "Tester".to_string(),
        email: format!("{}@example.com", first_name.to_lowercase()),
        role_id: identity.role_id,
    }
}

// Creates an AppState backed by an in-memory store holding one user per role.
async fn create_test_state() -> (AppState, Arc<MemoryRepository>) {
    let memory = Arc::new(MemoryRepository::new());
    for (identity, name) in [(ADMIN, "Ada"), (MANAGER, "Max"), (EDITOR, "Eve")] {
        memory.seed_user(user(identity, name)).await;
    }

    let repo = memory.clone() as RepositoryState;
    let roles = RoleDirectory::load(&repo).await.unwrap();
    let state = AppState {
        repo,
        config: AppConfig::default(),
        roles: Arc::new(roles),
    };
    (state, memory)
}

fn params(name: &str, value: i32) -> RawInput {
    RawInput::from_parts(Vec::new(), vec![(name.to_string(), value.to_string())], b"")
}

fn params_with_body(name: &str, value: i32, body: serde_json::Value) -> RawInput {
    RawInput::from_parts(
        Vec::new(),
        vec![(name.to_string(), value.to_string())],
        body.to_string().as_bytes(),
    )
}

async fn seed_page(memory: &MemoryRepository, slug: &str, creator: i32) -> Page {
    memory
        .insert_page(NewPage {
            title: "Title".to_string(),
            content: "Body".to_string(),
            slug: slug.to_string(),
            creator,
            status: "draft".to_string(),
        })
        .await
        .unwrap()
}

// --- USER HANDLERS ---

#[test]
async fn test_get_me_returns_public_profile() {
    let (state, _) = create_test_state().await;

    let Json(envelope) = users::get_me(EDITOR, State(state)).await.unwrap();

    assert_eq!(envelope.result.id, EDITOR.id);
    assert_eq!(envelope.result.first_name, "Eve");
}

#[test]
async fn test_list_users_requires_view_users() {
    let (state, _) = create_test_state().await;

    let err = users::list_users(EDITOR, State(state.clone()), RawInput::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAccess);

    let Json(envelope) = users::list_users(MANAGER, State(state), RawInput::default())
        .await
        .unwrap();
    assert_eq!(envelope.result.len(), 3);
}

#[test]
async fn test_list_users_rejects_bad_limit_before_authorizing() {
    let (state, _) = create_test_state().await;
    let input = RawInput::from_parts(vec![("limit".to_string(), "-1".to_string())], Vec::new(), b"");

    let err = users::list_users(EDITOR, State(state), input)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
async fn test_get_user_self_or_viewer() {
    let (state, _) = create_test_state().await;

    assert!(users::get_user(EDITOR, State(state.clone()), params("userId", EDITOR.id)).await.is_ok());
    assert!(users::get_user(MANAGER, State(state.clone()), params("userId", EDITOR.id)).await.is_ok());

    let err = users::get_user(EDITOR, State(state), params("userId", MANAGER.id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAccess);
}

#[test]
async fn test_missing_user_is_not_found_even_for_non_owner() {
    let (state, _) = create_test_state().await;

    let err = users::update_user(
        EDITOR,
        State(state),
        params_with_body("userId", 404, json!({ "firstName": "X" })),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
async fn test_update_self_changes_only_given_fields() {
    let (state, memory) = create_test_state().await;

    let Json(envelope) = users::update_user(
        EDITOR,
        State(state),
        params_with_body("userId", EDITOR.id, json!({ "lastName": "Updated" })),
    )
    .await
    .unwrap();

    assert_eq!(envelope.result.first_name, "Eve");
    assert_eq!(envelope.result.last_name, "Updated");

    let stored = memory.find_user(EDITOR.id).await.unwrap().unwrap();
    assert_eq!(stored.email, "eve@example.com");
}

#[test]
async fn test_manager_cannot_update_other_user() {
    let (state, memory) = create_test_state().await;

    let err = users::update_user(
        MANAGER,
        State(state),
        params_with_body("userId", EDITOR.id, json!({ "firstName": "Hacked" })),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidAccess);
    let stored = memory.find_user(EDITOR.id).await.unwrap().unwrap();
    assert_eq!(stored.first_name, "Eve");
}

#[test]
async fn test_update_with_taken_email_is_validation_error() {
    let (state, _) = create_test_state().await;

    let err = users::update_user(
        EDITOR,
        State(state),
        params_with_body("userId", EDITOR.id, json!({ "email": "ada@example.com" })),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.messages(), vec!["body.email is already in use".to_string()]);
}

#[test]
async fn test_admin_deletes_user_and_their_pages() {
    let (state, memory) = create_test_state().await;
    let page = seed_page(&memory, "eves-page", EDITOR.id).await;

    let Json(envelope) = users::delete_user(ADMIN, State(state), params("userId", EDITOR.id))
        .await
        .unwrap();

    assert_eq!(envelope.result.id, EDITOR.id);
    assert!(memory.find_user(EDITOR.id).await.unwrap().is_none());
    assert!(memory.find_page(page.id).await.unwrap().is_none());
}

// --- PAGE HANDLERS ---

#[test]
async fn test_create_page_uses_session_user_as_creator() {
    let (state, memory) = create_test_state().await;
    let input = RawInput::with_body(json!({
        "title": "About",
        "content": "Who we are",
        "slug": "about",
        "creator": ADMIN.id
    }));

    let Json(envelope) = pages::create_page(MANAGER, State(state), input).await.unwrap();

    assert_eq!(envelope.result.status, "draft");
    let stored = memory.find_page(envelope.result.id).await.unwrap().unwrap();
    assert_eq!(stored.creator, MANAGER.id);
}

#[test]
async fn test_editor_cannot_create_page() {
    let (state, memory) = create_test_state().await;
    let input = RawInput::with_body(json!({ "title": "T", "content": "C", "slug": "t" }));

    let err = pages::create_page(EDITOR, State(state), input).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidAccess);
    assert!(memory.list_pages(10, 0).await.unwrap().is_empty());
}

#[test]
async fn test_duplicate_slug_is_validation_error() {
    let (state, memory) = create_test_state().await;
    seed_page(&memory, "home", ADMIN.id).await;
    let input = RawInput::with_body(json!({ "title": "T", "content": "C", "slug": "home" }));

    let err = pages::create_page(ADMIN, State(state), input).await.unwrap_err();

    assert_eq!(err.messages(), vec!["body.slug is already in use".to_string()]);
}

#[test]
async fn test_persistence_failure_on_write_is_unexpected() {
    let (state, memory) = create_test_state().await;
    memory.set_fail_writes(true);
    let input = RawInput::with_body(json!({ "title": "T", "content": "C", "slug": "t" }));

    let err = pages::create_page(ADMIN, State(state), input).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unexpected);
}

#[test]
async fn test_update_page_checks_existence_before_role() {
    let (state, memory) = create_test_state().await;
    let page = seed_page(&memory, "news", ADMIN.id).await;

    let missing = pages::update_page(
        EDITOR,
        State(state.clone()),
        params_with_body("pageId", page.id + 100, json!({ "title": "New" })),
    )
    .await
    .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);

    let denied = pages::update_page(
        EDITOR,
        State(state),
        params_with_body("pageId", page.id, json!({ "title": "New" })),
    )
    .await
    .unwrap_err();
    assert_eq!(denied.kind(), ErrorKind::InvalidAccess);
}

#[test]
async fn test_publish_page() {
    let (state, memory) = create_test_state().await;
    let page = seed_page(&memory, "launch", ADMIN.id).await;

    let Json(envelope) = pages::update_page(
        MANAGER,
        State(state),
        params_with_body("pageId", page.id, json!({ "status": "published" })),
    )
    .await
    .unwrap();

    assert_eq!(envelope.result.status, "published");
    assert_eq!(envelope.result.title, "Title");
}

#[test]
async fn test_get_page_is_public_and_404s() {
    let (state, memory) = create_test_state().await;
    let page = seed_page(&memory, "faq", ADMIN.id).await;

    let Json(envelope) = pages::get_page(State(state.clone()), params("pageId", page.id))
        .await
        .unwrap();
    assert_eq!(envelope.result.slug, "faq");

    let err = pages::get_page(State(state), params("pageId", page.id + 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
async fn test_delete_page_returns_removed_page() {
    let (state, memory) = create_test_state().await;
    let page = seed_page(&memory, "old", ADMIN.id).await;

    let Json(envelope) = pages::delete_page(ADMIN, State(state), params("pageId", page.id))
        .await
        .unwrap();

    assert_eq!(envelope.result.id, page.id);
    assert!(memory.find_page(page.id).await.unwrap().is_none());
}

// --- NAVIGATION HANDLERS ---

#[test]
async fn test_nav_menu_lifecycle() {
    let (state, memory) = create_test_state().await;

    let Json(created) = nav::create_nav_menu(
        MANAGER,
        State(state.clone()),
        RawInput::with_body(json!({ "name": "Main", "hierarchy": "[1,[2,3]]" })),
    )
    .await
    .unwrap();
    let nav_id = created.result.id;

    let Json(updated) = nav::update_nav_menu(
        MANAGER,
        State(state.clone()),
        params_with_body("navId", nav_id, json!({ "hierarchy": null })),
    )
    .await
    .unwrap();
    assert_eq!(updated.result.name, "Main");
    assert_eq!(updated.result.hierarchy, None);

    let Json(listed) = nav::list_nav_menus(State(state.clone()), RawInput::default())
        .await
        .unwrap();
    assert_eq!(listed.result.len(), 1);

    nav::delete_nav_menu(ADMIN, State(state), params("navId", nav_id))
        .await
        .unwrap();
    assert_eq!(memory.find_nav_menu(nav_id).await.unwrap(), None::<NavMenu>);
}

#[test]
async fn test_editor_cannot_change_navigation() {
    let (state, _) = create_test_state().await;

    let err = nav::create_nav_menu(
        EDITOR,
        State(state),
        RawInput::with_body(json!({ "name": "Footer" })),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidAccess);
}
