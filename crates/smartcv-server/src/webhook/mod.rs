pub mod messaging;
pub mod payment;
pub mod recruiter;

use axum::Router;
use axum::routing::post;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook/ycloud", post(messaging::handle))
        .route("/webhook/paystack", post(payment::handle))
        .route("/api/recruiter/post-job", post(recruiter::handle))
}
