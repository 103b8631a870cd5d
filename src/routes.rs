use crate::api::{admin, auth, phrase, verify};
use crate::traits::RequestBody;
use crate::AppState;

pub(crate) fn router() -> axum::Router<AppState> {
    use axum::routing::{get, post};

    axum::Router::new()
        // Authentication
        .route("/api/signup", post(auth::SignupRequest::as_json_handler))
        .route("/api/sign-out", post(auth::invalidate_current_token))
        .route("/api/me", get(phrase::Me::as_handler_query))
        // Phrase
        .route(
            "/api/phrase",
            get(phrase::GetPhrase::as_handler_query)
                .post(phrase::SubmitPhrase::as_json_handler),
        )
        .route("/api/can-submit", get(phrase::CanSubmit::as_handler_query))
        // Verification
        .route("/api/verify", post(verify::VerifyUser::as_json_handler))
        .route(
            "/api/verifications",
            get(verify::ListVerifications::as_handler_query),
        )
        .route(
            "/api/unverified-users",
            get(verify::ListUnverified::as_handler_query),
        )
        // Admin
        .route(
            "/api/admin/phrase/edit",
            post(phrase::EditPhrase::as_json_handler),
        )
        .route(
            "/api/admin/phrase/unsubmit",
            post(phrase::UnsubmitPhrase::as_json_handler),
        )
        .route(
            "/api/admin/windows",
            get(admin::ScheduledWindows::as_handler_query),
        )
        .route(
            "/api/admin/windows/cancel",
            post(admin::CancelWindow::as_json_handler),
        )
        .route(
            "/api/admin/manual-reset",
            post(admin::ManualReset::as_json_handler),
        )
        .route(
            "/api/admin/rollover",
            post(admin::TriggerRollover::as_json_handler),
        )
        .route(
            "/api/admin/eliminate",
            post(admin::EliminateUser::as_json_handler),
        )
        .route(
            "/api/admin/resurrect",
            post(admin::ResurrectUser::as_json_handler),
        )
        .route(
            "/api/admin/issue-token",
            post(admin::IssueToken::as_json_handler),
        )
        .route(
            "/api/admin/statistics",
            get(admin::Statistics::as_handler_query),
        )
        // Super admin
        .route(
            "/api/superadmin/promote",
            post(admin::PromoteUser::as_json_handler),
        )
        .route(
            "/api/superadmin/demote",
            post(admin::DemoteUser::as_json_handler),
        )
}
