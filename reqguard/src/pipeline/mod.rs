//! リクエストパイプライン
//!
//! 1リクエストの状態遷移
//! `Received → SignatureChecked → SessionChecked → Handled → Audited`
//! を管理する。`Handled` より前の失敗は `Rejected` に短絡し、ハンドラーは呼ばれない。
//! 監査はどの経路でも必ず実行される。

/// axumミドルウェア
pub mod middleware;

/// ハンドラーpanicの捕捉
pub mod panic;

use crate::api::error::ErrorBody;
use crate::auth::extract;
use crate::auth::jwt::{self, VerifiedSession};
use crate::auth::replay::ReplayGuard;
use crate::auth::signature::SignedRequest;
use crate::common::error::AuthError;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use std::collections::HashSet;

pub use middleware::{audit_middleware, auth_middleware, PipelineState, RequestId};

/// パイプラインの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// 受信直後
    Received,
    /// 署名ゲート通過（署名不要のルートでも通過扱い）
    SignatureChecked,
    /// セッションゲート通過
    SessionChecked,
    /// ハンドラー実行済み（panic回復を含む）
    Handled,
    /// 監査レコード投入済み
    Audited,
    /// 認証ゲートで拒否
    Rejected(AuthError),
}

/// 拒否したゲート
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// リクエスト署名
    Signature,
    /// セッショントークン
    Session,
}

impl Gate {
    /// 拒否時のHTTPステータス
    pub fn status(self) -> StatusCode {
        match self {
            Self::Signature => StatusCode::BAD_REQUEST,
            Self::Session => StatusCode::UNAUTHORIZED,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Signature => "signature",
            Self::Session => "session",
        }
    }
}

/// ルートごとの認証要件
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutePolicy {
    /// 署名必須
    pub require_signature: bool,
    /// セッション必須
    pub require_session: bool,
}

/// ルート表から認証要件を引く
///
/// 署名はグローバル設定、セッションはマッチしたルートパターンで決まる。
/// OPTIONS（プリフライト）は署名を要求しない。
#[derive(Debug, Clone, Default)]
pub struct RoutePolicies {
    signature_required: bool,
    protected: HashSet<String>,
}

impl RoutePolicies {
    /// 作成
    pub fn new<I, S>(signature_required: bool, protected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            signature_required,
            protected: protected.into_iter().map(Into::into).collect(),
        }
    }

    /// リクエストに適用する要件
    pub fn policy_for(&self, method: &Method, matched_path: Option<&str>) -> RoutePolicy {
        RoutePolicy {
            require_signature: self.signature_required && method != Method::OPTIONS,
            require_session: matched_path.is_some_and(|p| self.protected.contains(p)),
        }
    }
}

/// リクエストから取り出した認証情報
///
/// 要求されないゲートの情報は解析しない。
#[derive(Debug, Clone)]
pub struct Credentials {
    /// 署名付きリクエスト
    pub signed: Result<Option<SignedRequest>, AuthError>,
    /// Bearerトークン
    pub bearer: Result<Option<String>, AuthError>,
}

impl Credentials {
    /// クエリ・フォーム・ヘッダーから収集する
    pub fn collect(
        policy: RoutePolicy,
        query: Option<&str>,
        form: Option<&[u8]>,
        headers: &HeaderMap,
    ) -> Self {
        let signed = if policy.require_signature {
            extract::signed_request(query, form, headers)
        } else {
            Ok(None)
        };
        let bearer = if policy.require_session {
            extract::bearer_token(headers)
        } else {
            Ok(None)
        };
        Self { signed, bearer }
    }
}

/// 認証ゲート通過結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authenticated {
    /// 到達した状態（常に `SessionChecked`）
    pub stage: Stage,
    /// 検証済みセッション（セッション不要のルートでは `None`）
    pub session: Option<VerifiedSession>,
}

/// 認証ゲートでの拒否
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{} gate rejected request: {}", .gate.as_str(), .error.code())]
pub struct Rejection {
    /// 拒否したゲート
    pub gate: Gate,
    /// 理由
    pub error: AuthError,
}

impl Rejection {
    /// 拒否後の状態
    pub fn stage(&self) -> Stage {
        Stage::Rejected(self.error)
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = self.gate.status();
        ErrorBody::new(status, self.error.external_message())
            .with_error(self.error.code())
            .respond(status)
    }
}

/// 署名ゲートとセッションゲートの検証器
///
/// 秘密情報は読み取り専用で、リクエスト間で共有される。
#[derive(Debug)]
pub struct Authenticator {
    guard: ReplayGuard,
    app_secret: String,
    jwt_secret: Vec<u8>,
}

impl Authenticator {
    /// 作成
    pub fn new(
        guard: ReplayGuard,
        app_secret: impl Into<String>,
        jwt_secret: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            guard,
            app_secret: app_secret.into(),
            jwt_secret: jwt_secret.into(),
        }
    }

    /// セッショントークン署名用の鍵
    pub fn jwt_secret(&self) -> &[u8] {
        &self.jwt_secret
    }

    /// 2つのゲートを順に評価する
    ///
    /// 署名ゲートは app_key → 鮮度 → 署名 → ノンスの順に検査する。
    /// `now` はUNIX秒で、リクエストごとに1回だけ読み取った値を渡す。
    pub fn authenticate(
        &self,
        policy: RoutePolicy,
        credentials: &Credentials,
        now: i64,
    ) -> Result<Authenticated, Rejection> {
        if policy.require_signature {
            self.check_signature(&credentials.signed, now)
                .map_err(|error| Rejection {
                    gate: Gate::Signature,
                    error,
                })?;
        }

        let session = if policy.require_session {
            let session = self
                .check_session(&credentials.bearer, now)
                .map_err(|error| Rejection {
                    gate: Gate::Session,
                    error,
                })?;
            Some(session)
        } else {
            None
        };

        Ok(Authenticated {
            stage: Stage::SessionChecked,
            session,
        })
    }

    fn check_signature(
        &self,
        signed: &Result<Option<SignedRequest>, AuthError>,
        now: i64,
    ) -> Result<(), AuthError> {
        let request = match signed {
            Ok(Some(request)) => request,
            Ok(None) => return Err(AuthError::MissingCredentials),
            Err(e) => return Err(*e),
        };
        self.guard.check(request, now)?;
        if !request.verify(&self.app_secret) {
            return Err(AuthError::BadSignature);
        }
        self.guard.admit_nonce(request, now)
    }

    fn check_session(
        &self,
        bearer: &Result<Option<String>, AuthError>,
        now: i64,
    ) -> Result<VerifiedSession, AuthError> {
        match bearer {
            Ok(Some(token)) => jwt::verify_token_at(token, &self.jwt_secret, now),
            Ok(None) => Err(AuthError::MissingCredentials),
            Err(e) => Err(*e),
        }
    }
}

/// ハンドラーが返したエラーの内部テキスト
///
/// レスポンスの拡張データに格納され、監査レコードの `error` に記録される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError(pub String);
