//! APIエラーレスポンス型
//!
//! axum用の共通エラーハンドリング

use crate::common::error::ApiError;
use crate::pipeline::HandlerError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

/// クライアントに返すエラーボディ
///
/// `{"code": <int>, "message": <str>, "error": <str?>, "details": <any?>}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    /// HTTPステータスと同じ数値
    pub code: u16,
    /// 外部向けメッセージ
    pub message: String,
    /// 機械可読なエラー種別
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 追加情報（デバッグモードのスタックなど）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorBody {
    /// ステータスとメッセージから作成
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: status.as_u16(),
            message: message.into(),
            error: None,
            details: None,
        }
    }

    /// エラー種別を付与
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// 追加情報を付与
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// JSONレスポンスに変換
    pub fn respond(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// Axum用のエラーレスポンス型
#[derive(Debug)]
pub struct AppError(pub ApiError);

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // クライアントには external_message() のみを返し、詳細は監査ログへ回す
        let status = self.0.status_code();
        let mut response = ErrorBody::new(status, self.0.external_message()).respond(status);
        response
            .extensions_mut()
            .insert(HandlerError(self.0.to_string()));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn app_error_hides_detail_from_body() {
        let response =
            AppError(ApiError::Internal("store timeout at 10.0.0.3".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.extensions().get::<HandlerError>().map(|e| e.0.as_str()),
            Some("Internal error: store timeout at 10.0.0.3")
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["code"], 500);
        assert_eq!(value["message"], "Internal server error");
        assert!(value.get("error").is_none());
        assert!(!String::from_utf8_lossy(&body).contains("10.0.0.3"));
    }

    #[test]
    fn error_body_optional_fields() {
        let body = ErrorBody::new(StatusCode::BAD_REQUEST, "Signature verification failed")
            .with_error("bad_signature");
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["code"], 400);
        assert_eq!(value["error"], "bad_signature");
        assert!(value.get("details").is_none());
    }
}
