use poem_openapi::payload::Json;

use crate::{
    companion_api::models::{
        AuthResponse, ErrorDto, LoginRequestDto, LogoutResponse, RegisterRequestDto,
    },
    domain::models::{Role, User},
    error::{ApiError, ApiResult},
    progress::ProgressTracker,
    session::SessionManager,
    shelf_client::RegisterRequest,
};

pub struct AccountService<'a> {
    pub sessions: &'a SessionManager,
    pub tracker: &'a ProgressTracker,
}

impl<'a> AccountService<'a> {
    pub fn new(sessions: &'a SessionManager, tracker: &'a ProgressTracker) -> Self {
        Self { sessions, tracker }
    }

    #[tracing::instrument(level = "debug", skip(self, body), fields(username = %body.username))]
    pub async fn login(&self, body: LoginRequestDto) -> AuthResponse {
        let result = self.sessions.login(&body.username, &body.password).await;
        self.signed_in(result).await
    }

    #[tracing::instrument(level = "debug", skip(self, body), fields(username = %body.username))]
    pub async fn register(&self, body: RegisterRequestDto) -> AuthResponse {
        let request = RegisterRequest {
            name: body.name,
            username: body.username,
            mobile: body.mobile,
            email: body.email,
            password: body.password,
            role: body.role.map(Role::from).unwrap_or(Role::User),
        };
        let result = self.sessions.register(&request).await;
        self.signed_in(result).await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn logout(&self) -> LogoutResponse {
        self.sessions.logout().await;
        self.tracker.clear();
        LogoutResponse::NoContent
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn refresh(&self) -> AuthResponse {
        let result = self.sessions.refresh().await;
        if matches!(result, Err(ApiError::Unauthorized)) {
            self.tracker.clear();
        }
        match result.and_then(|()| self.sessions.context().user().ok_or(ApiError::Unauthorized)) {
            Ok(user) => AuthResponse::Ok(Json(user.into())),
            Err(e) => {
                tracing::info!(error = %e, "token refresh failed");
                auth_failure(&e)
            }
        }
    }

    async fn signed_in(&self, result: ApiResult<User>) -> AuthResponse {
        match result {
            Ok(user) => {
                // the library page shows whatever the server has for this user
                if let Err(e) = self.tracker.refresh().await {
                    tracing::warn!(error = %e, "initial library fetch failed");
                }
                AuthResponse::Ok(Json(user.into()))
            }
            Err(e) => {
                tracing::info!(error = %e, "sign in failed");
                auth_failure(&e)
            }
        }
    }
}

fn auth_failure(e: &ApiError) -> AuthResponse {
    let body = Json(ErrorDto::from(e));
    match e {
        ApiError::Validation(_) | ApiError::InvalidRequest(_) => AuthResponse::BadRequest(body),
        ApiError::Unauthorized | ApiError::Forbidden(_) => AuthResponse::Unauthorized(body),
        ApiError::NotFound
        | ApiError::Status { .. }
        | ApiError::Transport(_)
        | ApiError::Decode(_) => AuthResponse::BadGateway(body),
    }
}
