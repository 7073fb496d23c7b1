mod support;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::Json;
use catalog_service::api_error::ApiError;
use catalog_service::movie_handlers::{list_movies, ListMoviesQuery, OrderDirection};
use catalog_service::user_handlers::{
    get_me, login, register, update_profile, LoginRequest, RegisterRequest, UpdateProfileRequest,
};
use catalog_service::AppState;
use common_auth::Role;
use support::{auth_context, test_state, unique_group_id, unique_username, TestDatabase};

fn register_request(username: &str, role: u8, group_id: i64) -> RegisterRequest {
    RegisterRequest {
        name: "Budi Setiawan".to_string(),
        username: username.to_string(),
        password: "Admin123-".to_string(),
        role,
        group_id,
    }
}

async fn login_token(state: &AppState, username: &str, password: &str) -> Result<String, ApiError> {
    let Json(response) = login(
        State(state.clone()),
        Json(LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        }),
    )
    .await?;
    Ok(response.access_token)
}

async fn group_movie_count(state: &AppState, token: &str) -> Result<i64> {
    let auth = auth_context(state, token)?;
    let Json(listing) = list_movies(
        State(state.clone()),
        auth,
        Query(ListMoviesQuery {
            title: None,
            page: None,
            limit: None,
            order_by: None,
            order_method: OrderDirection::Asc,
        }),
    )
    .await
    .map_err(|err| anyhow::anyhow!("listing failed: {err}"))?;
    Ok(listing.pagination.total_items)
}

#[tokio::test(flavor = "multi_thread")]
#[cfg_attr(
    not(feature = "integration"),
    ignore = "enable with --features integration (requires Postgres: embedded or external)"
)]
async fn register_login_me_round_trip() -> Result<()> {
    let Some(db) = TestDatabase::setup().await? else {
        return Ok(());
    };
    let state = test_state(db.pool_clone())?;

    let group_id = unique_group_id();
    let username = unique_username("budi_admin");

    let Json(created) = register(
        State(state.clone()),
        Json(register_request(&username, 1, group_id)),
    )
    .await
    .expect("registration succeeds");
    assert_eq!(created.message, "Account created successfully");

    let token = login_token(&state, &username, "Admin123-")
        .await
        .expect("login succeeds");

    let claims = state.verifier.verify(&token).expect("token verifies");
    assert_eq!(claims.username, username);
    assert_eq!(claims.group_id, group_id);
    assert_eq!(claims.role, Role::Admin);

    let auth = auth_context(&state, &token)?;
    let Json(profile) = get_me(State(state.clone()), auth)
        .await
        .expect("profile loads");
    assert_eq!(profile.name, "Budi Setiawan");
    assert_eq!(profile.username, username);
    assert_eq!(profile.role, "ADMIN");
    assert_eq!(profile.group_id, group_id);

    let auth = auth_context(&state, &token)?;
    let Json(updated) = update_profile(
        State(state.clone()),
        auth,
        Json(UpdateProfileRequest {
            name: "Asep".to_string(),
        }),
    )
    .await
    .expect("profile updates");
    assert_eq!(updated.name, "Asep");
    assert_eq!(updated.username, username);

    db.teardown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[cfg_attr(
    not(feature = "integration"),
    ignore = "enable with --features integration (requires Postgres: embedded or external)"
)]
async fn duplicate_username_is_rejected_across_groups() -> Result<()> {
    let Some(db) = TestDatabase::setup().await? else {
        return Ok(());
    };
    let state = test_state(db.pool_clone())?;

    let username = unique_username("siti_user");

    register(
        State(state.clone()),
        Json(register_request(&username, 0, unique_group_id())),
    )
    .await
    .expect("first registration succeeds");

    // Same username into a different group still violates global uniqueness.
    let err = register(
        State(state.clone()),
        Json(register_request(&username, 0, unique_group_id())),
    )
    .await
    .expect_err("second registration is rejected");
    assert!(matches!(err, ApiError::DuplicateCredential));

    db.teardown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[cfg_attr(
    not(feature = "integration"),
    ignore = "enable with --features integration (requires Postgres: embedded or external)"
)]
async fn login_failures_are_indistinguishable() -> Result<()> {
    let Some(db) = TestDatabase::setup().await? else {
        return Ok(());
    };
    let state = test_state(db.pool_clone())?;

    let username = unique_username("siti_user");
    register(
        State(state.clone()),
        Json(register_request(&username, 0, unique_group_id())),
    )
    .await
    .expect("registration succeeds");

    let wrong_password = login_token(&state, &username, "Admin123_")
        .await
        .expect_err("wrong password is rejected");
    let unknown_user = login_token(&state, &unique_username("ghost"), "Admin123-")
        .await
        .expect_err("unknown username is rejected");

    assert!(matches!(wrong_password, ApiError::InvalidCredentials));
    assert!(matches!(unknown_user, ApiError::InvalidCredentials));
    assert_eq!(wrong_password.to_string(), unknown_user.to_string());

    db.teardown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[cfg_attr(
    not(feature = "integration"),
    ignore = "enable with --features integration (requires Postgres: embedded or external)"
)]
async fn usernames_are_stored_lowercase() -> Result<()> {
    let Some(db) = TestDatabase::setup().await? else {
        return Ok(());
    };
    let state = test_state(db.pool_clone())?;

    let username = unique_username("Budi_Admin");
    register(
        State(state.clone()),
        Json(register_request(&username, 1, unique_group_id())),
    )
    .await
    .expect("registration succeeds");

    let token = login_token(&state, &username.to_uppercase(), "Admin123-")
        .await
        .expect("login is case-insensitive on username");
    let claims = state.verifier.verify(&token)?;
    assert_eq!(claims.username, username.to_lowercase());

    db.teardown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[cfg_attr(
    not(feature = "integration"),
    ignore = "enable with --features integration (requires Postgres: embedded or external)"
)]
async fn first_admin_seeds_the_group_catalog_once() -> Result<()> {
    let Some(db) = TestDatabase::setup().await? else {
        return Ok(());
    };
    let state = test_state(db.pool_clone())?;

    let group_id = unique_group_id();
    let admin = unique_username("budi_admin");

    register(
        State(state.clone()),
        Json(register_request(&admin, 1, group_id)),
    )
    .await
    .expect("admin registration succeeds");

    let token = login_token(&state, &admin, "Admin123-").await.expect("login");
    assert_eq!(group_movie_count(&state, &token).await?, 3);

    // A second member joining the now-populated group adds nothing.
    let second = unique_username("siti_user");
    register(
        State(state.clone()),
        Json(register_request(&second, 0, group_id)),
    )
    .await
    .expect("second registration succeeds");
    assert_eq!(group_movie_count(&state, &token).await?, 3);

    // Nor does a later admin joining the same group.
    let third = unique_username("tono_admin");
    register(
        State(state.clone()),
        Json(register_request(&third, 1, group_id)),
    )
    .await
    .expect("third registration succeeds");
    assert_eq!(group_movie_count(&state, &token).await?, 3);

    db.teardown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[cfg_attr(
    not(feature = "integration"),
    ignore = "enable with --features integration (requires Postgres: embedded or external)"
)]
async fn admin_joining_an_existing_group_does_not_seed() -> Result<()> {
    let Some(db) = TestDatabase::setup().await? else {
        return Ok(());
    };
    let state = test_state(db.pool_clone())?;

    let group_id = unique_group_id();

    // A regular user opens the group; the admin arrives second.
    register(
        State(state.clone()),
        Json(register_request(&unique_username("siti_user"), 0, group_id)),
    )
    .await
    .expect("user registration succeeds");

    let admin = unique_username("budi_admin");
    register(
        State(state.clone()),
        Json(register_request(&admin, 1, group_id)),
    )
    .await
    .expect("admin registration succeeds");

    let token = login_token(&state, &admin, "Admin123-").await.expect("login");
    assert_eq!(group_movie_count(&state, &token).await?, 0);

    db.teardown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[cfg_attr(
    not(feature = "integration"),
    ignore = "enable with --features integration (requires Postgres: embedded or external)"
)]
async fn concurrent_first_admins_seed_at_most_once() -> Result<()> {
    let Some(db) = TestDatabase::setup().await? else {
        return Ok(());
    };
    let state = test_state(db.pool_clone())?;

    let group_id = unique_group_id();
    let first = unique_username("budi_admin");
    let second = unique_username("tono_admin");

    let (left, right) = tokio::join!(
        register(
            State(state.clone()),
            Json(register_request(&first, 1, group_id)),
        ),
        register(
            State(state.clone()),
            Json(register_request(&second, 1, group_id)),
        ),
    );
    left.expect("first concurrent registration succeeds");
    right.expect("second concurrent registration succeeds");

    let token = login_token(&state, &first, "Admin123-").await.expect("login");
    assert_eq!(
        group_movie_count(&state, &token).await?,
        3,
        "exactly one starter catalog per group"
    );

    db.teardown().await?;
    Ok(())
}
