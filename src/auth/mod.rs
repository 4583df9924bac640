//! 認証・認可機能
//!
//! トークン検証は外部認証オラクル（users/meエンドポイント）への問い合わせで
//! 行う。公開ルートでは検証失敗を匿名アイデンティティに降格させる。

use crate::api::error::AppError;
use crate::common::error::{ChainLogError, ChainResult};
use crate::AppState;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// 認証オラクル呼び出しのタイムアウト（秒）
///
/// 劣化したオラクルでパイプライン全体が無期限にハングしないよう保守的に短くする。
const AUTH_TIMEOUT_SECS: u64 = 5;

/// 認証済みユーザー情報（オラクルのレスポンス）
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    /// ユーザー名
    pub username: String,
}

/// 認証オラクルクライアント
#[derive(Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    me_url: String,
}

impl AuthClient {
    /// 新しいオラクルクライアントを作成する
    pub fn new(me_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(AUTH_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            http,
            me_url: me_url.into(),
        }
    }

    /// ベアラートークンをオラクルで検証する
    ///
    /// オラクルの拒否は`Authentication`、到達不能は`AuthServiceUnavailable`。
    pub async fn verify_token(&self, token: &str) -> ChainResult<AuthUser> {
        let response = self
            .http
            .get(&self.me_url)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| ChainLogError::AuthServiceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ChainLogError::Authentication(format!(
                "Token rejected by auth service (status {})",
                status
            )));
        }

        response
            .json::<AuthUser>()
            .await
            .map_err(|e| ChainLogError::Authentication(format!("Invalid auth response: {}", e)))
    }
}

/// AuthorizationヘッダーからBearerトークンを取り出す
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
}

/// 認証必須のエクストラクタ
///
/// トークンが無い・無効な場合はリクエストを拒否する。
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            AppError(ChainLogError::Authentication(
                "Missing bearer token".to_string(),
            ))
        })?;
        let user = state.auth.verify_token(&token).await.map_err(AppError)?;
        Ok(AuthenticatedUser(user))
    }
}

/// 公開ルート用の任意認証エクストラクタ
///
/// トークンが無い・無効・オラクル不達の場合は匿名（None）に降格し、
/// リクエスト自体は通す。ブロックチェーンの透明性原則に基づく公開閲覧用。
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthUser>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(MaybeUser(None));
        };
        match state.auth.verify_token(&token).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(e) => {
                warn!(error = %e, "Token verification failed, treating as anonymous");
                Ok(MaybeUser(None))
            }
        }
    }
}
