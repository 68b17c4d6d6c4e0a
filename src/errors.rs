use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use thiserror::Error;

use crate::domain::errors::{ErrorKind, OrderError};

/// Error returned by HTTP handlers built on this crate. Converts from
/// [`OrderError`] and renders as a `{"category","message"}` JSON body.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    BadRequest {
        category: &'static str,
        message: String,
    },

    #[error("{message}")]
    NotFound {
        category: &'static str,
        message: String,
    },

    #[error("{message}")]
    Conflict {
        category: &'static str,
        message: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        let category = e.category();
        match e.kind() {
            ErrorKind::Validation | ErrorKind::BusinessRule => AppError::BadRequest {
                category,
                message: e.to_string(),
            },
            ErrorKind::NotFound => AppError::NotFound {
                category,
                message: e.to_string(),
            },
            ErrorKind::Concurrency => AppError::Conflict {
                category,
                message: e.to_string(),
            },
            ErrorKind::Infrastructure => AppError::Internal(e.to_string()),
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (category, message) = match self {
            AppError::BadRequest { category, message }
            | AppError::NotFound { category, message }
            | AppError::Conflict { category, message } => (*category, message.as_str()),
            AppError::Internal(_) => ("store", "Internal server error"),
        };
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "category": category,
            "message": message
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::status::{OrderStatus, TransitionError};
    use actix_web::body::to_bytes;
    use actix_web::ResponseError;

    #[test]
    fn validation_returns_400() {
        let err: AppError = OrderError::validation("receiver name is required").into();
        assert_eq!(err.error_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn business_rule_returns_400() {
        let err: AppError = OrderError::Transition(TransitionError::Order {
            from: OrderStatus::PendingPayment,
            to: OrderStatus::Done,
        })
        .into();
        assert_eq!(err.error_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.to_string(),
            "order status cannot change from pending payment to done"
        );
    }

    #[test]
    fn not_found_returns_404() {
        let err: AppError = OrderError::NotFound("order").into();
        assert_eq!(err.error_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "order not found");
    }

    #[test]
    fn status_changed_returns_409() {
        let err: AppError = OrderError::StatusChanged { entity: "order" }.into();
        assert!(matches!(err, AppError::Conflict { .. }));
        assert_eq!(err.error_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn store_error_returns_500() {
        let err: AppError = OrderError::store("connection refused").into();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(
            err.error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[actix_web::test]
    async fn body_carries_category_and_message() {
        let err: AppError = OrderError::NotFound("commission").into();
        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["category"], "order-commission");
        assert_eq!(json["message"], "commission not found");
    }

    #[actix_web::test]
    async fn internal_message_is_hidden() {
        let err: AppError = OrderError::store("password authentication failed").into();
        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Internal server error");
    }
}
