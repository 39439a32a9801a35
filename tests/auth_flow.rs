use axum::{
    Json,
    extract::{Path, State},
};
use marketplace_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::auth::{LoginRequest, RegisterRequest},
    error::AppError,
    middleware::auth::AuthUser,
    models::Role,
    routes::users::{UpdateUserRequest, update_user},
    services::auth_service::{login_user, register_user},
    state::AppState,
};

// Integration flow: register -> login with good and bad credentials, then
// patch a profile into a colliding identity.
#[tokio::test]
async fn register_login_and_profile_collision_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    // SAFETY: single test in this binary, nothing races on the env.
    unsafe { std::env::set_var("JWT_SECRET", "integration-secret") };

    let pool = create_pool(&database_url).await?;
    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;

    // Clean up earlier runs of this flow.
    sqlx::query("DELETE FROM users WHERE email IN ($1, $2)")
        .bind("ada@example.com")
        .bind("grace@example.com")
        .execute(&pool)
        .await?;

    // Correct registration hands back the user plus both tokens.
    let registered = register_user(
        &pool,
        RegisterRequest {
            username: "ada".into(),
            email: "ada@example.com".into(),
            password: "Sup3r!secret".into(),
            role: Role::Buyer,
            contact: None,
            image: None,
        },
    )
    .await?;
    let registered = registered.data.unwrap();
    assert_eq!(registered.user.role, Role::Buyer);
    assert!(!registered.tokens.access_token.is_empty());
    assert!(!registered.tokens.refresh_token.is_empty());

    // Correct credentials -> a fresh token pair.
    let tokens = login_user(
        &pool,
        LoginRequest {
            email: "ada@example.com".into(),
            password: "Sup3r!secret".into(),
        },
    )
    .await?;
    let tokens = tokens.data.unwrap();
    assert!(!tokens.access_token.is_empty());
    assert!(!tokens.refresh_token.is_empty());

    // Wrong password and unknown email are both rejected as unauthorized,
    // with distinct messages.
    let wrong_password = login_user(
        &pool,
        LoginRequest {
            email: "ada@example.com".into(),
            password: "Wr0ng!secret".into(),
        },
    )
    .await;
    match wrong_password {
        Err(AppError::Unauthorized(msg)) => assert_eq!(msg, "Invalid email or password"),
        other => panic!("expected unauthorized, got {other:?}"),
    }

    let unknown_email = login_user(
        &pool,
        LoginRequest {
            email: "nobody@example.com".into(),
            password: "Sup3r!secret".into(),
        },
    )
    .await;
    match unknown_email {
        Err(AppError::Unauthorized(msg)) => assert_eq!(msg, "User does not exist"),
        other => panic!("expected unauthorized, got {other:?}"),
    }

    // A second account cannot patch itself into the first one's identity.
    let grace = register_user(
        &pool,
        RegisterRequest {
            username: "grace".into(),
            email: "grace@example.com".into(),
            password: "Sup3r!secret".into(),
            role: Role::Buyer,
            contact: None,
            image: None,
        },
    )
    .await?;
    let grace = grace.data.unwrap().user;

    let state = AppState { pool, orm };
    let collision = update_user(
        State(state),
        AuthUser {
            user_id: grace.id,
            role: Role::Buyer,
        },
        Path(grace.id),
        Json(UpdateUserRequest {
            username: None,
            email: Some("ada@example.com".into()),
            password: None,
            contact: None,
            image: None,
        }),
    )
    .await;
    match collision {
        Err(AppError::BadRequest(msg)) => assert_eq!(msg, "Username or email is already taken"),
        other => panic!("expected bad request, got {other:?}"),
    }

    Ok(())
}
