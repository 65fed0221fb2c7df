//! Tower Service for tenant resolution.

use crate::config::TenantConfig;
use crate::error::TenantError;
use crate::extract::resolve_tenant;
use axum::body::Body;
use axum::response::IntoResponse;
use http::{Method, Request, Response};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_service::Service;

/// Tower Service that resolves the tenant before calling the inner service.
///
/// On success the [`TenantContext`](crate::TenantContext) and its
/// [`TenantId`](shopdesk_core::TenantId) are inserted into request
/// extensions. On failure, when a tenant is required, the request is
/// answered with a 400 envelope and the inner service is never called.
/// `OPTIONS` requests pass through untouched.
#[derive(Debug, Clone)]
pub struct TenantService<S> {
    inner: S,
    config: Arc<TenantConfig>,
}

impl<S> TenantService<S> {
    pub fn new(inner: S, config: Arc<TenantConfig>) -> Self {
        Self { inner, config }
    }

    fn forward<ReqBody>(&mut self, req: Request<ReqBody>) -> TenantServiceFuture<S, ReqBody>
    where
        S: Service<Request<ReqBody>, Response = Response<Body>> + Clone,
    {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        TenantServiceFuture::Inner {
            future: inner.call(req),
        }
    }
}

impl<S, ReqBody> Service<Request<ReqBody>> for TenantService<S>
where
    S: Service<Request<ReqBody>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = TenantServiceFuture<S, ReqBody>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        // CORS preflight carries no tenant
        if req.method() == Method::OPTIONS {
            return self.forward(req);
        }

        match resolve_tenant(&req, &self.config) {
            Ok(ctx) => {
                req.extensions_mut().insert(ctx.tenant_id());
                req.extensions_mut().insert(ctx);

                tracing::debug!(
                    tenant_id = %ctx.tenant_id(),
                    source = ctx.source().as_str(),
                    "Tenant context resolved"
                );

                self.forward(req)
            }
            Err(err) if self.config.require_tenant || !matches!(err, TenantError::Missing) => {
                tracing::warn!(
                    error = %err,
                    method = %req.method(),
                    path = req.uri().path(),
                    "Tenant context rejected"
                );
                TenantServiceFuture::Error { error: Some(err) }
            }
            Err(_) => {
                tracing::debug!("Tenant context not required, proceeding without");
                self.forward(req)
            }
        }
    }
}

pin_project! {
    /// Future for TenantService.
    #[project = TenantServiceFutureProj]
    pub enum TenantServiceFuture<S, ReqBody>
    where
        S: Service<Request<ReqBody>, Response = Response<Body>>,
    {
        Inner {
            #[pin]
            future: S::Future,
        },
        Error {
            error: Option<TenantError>,
        },
    }
}

impl<S, ReqBody> Future for TenantServiceFuture<S, ReqBody>
where
    S: Service<Request<ReqBody>, Response = Response<Body>>,
{
    type Output = Result<Response<Body>, S::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            TenantServiceFutureProj::Inner { future } => future.poll(cx),
            TenantServiceFutureProj::Error { error } => {
                let err = error.take().unwrap_or(TenantError::Missing);
                Poll::Ready(Ok(err.into_response()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{TenantContext, TenantSignalSource};
    use axum::body::to_bytes;
    use http::StatusCode;
    use serde_json::Value;
    use shopdesk_core::TenantId;
    use std::convert::Infallible;
    use tower::ServiceExt;

    const TENANT: &str = "550e8400-e29b-41d4-a716-446655440000";

    // Echoes the resolved tenant, or "no_tenant".
    #[derive(Clone)]
    struct MockService;

    impl Service<Request<Body>> for MockService {
        type Response = Response<Body>;
        type Error = Infallible;
        type Future = std::future::Ready<Result<Response<Body>, Infallible>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Body>) -> Self::Future {
            let body = match (req.extensions().get::<TenantContext>(), req.extensions().get::<TenantId>()) {
                (Some(ctx), Some(id)) if ctx.tenant_id() == *id => id.to_string(),
                _ => "no_tenant".to_string(),
            };
            std::future::ready(Ok(Response::new(Body::from(body))))
        }
    }

    fn service(config: TenantConfig) -> TenantService<MockService> {
        TenantService::new(MockService, Arc::new(config))
    }

    async fn body_string(response: Response<Body>) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_valid_header_reaches_inner() {
        let req = Request::builder()
            .uri("/customers")
            .header("X-Tenant-Id", TENANT)
            .body(Body::empty())
            .unwrap();

        let response = service(TenantConfig::default()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, TENANT);
    }

    #[tokio::test]
    async fn test_missing_tenant_is_400_envelope() {
        let req = Request::builder().uri("/customers").body(Body::empty()).unwrap();

        let response = service(TenantConfig::default()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["errors"]["code"], "invalid_tenant_context");
    }

    #[tokio::test]
    async fn test_malformed_tenant_is_400() {
        let req = Request::builder()
            .uri("/customers")
            .header("X-Tenant-Id", "not-a-uuid")
            .body(Body::empty())
            .unwrap();

        let response = service(TenantConfig::default()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_options_bypasses_resolution() {
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/customers")
            .body(Body::empty())
            .unwrap();

        let response = service(TenantConfig::default()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "no_tenant");
    }

    #[tokio::test]
    async fn test_optional_tenant_proceeds_without_context() {
        let config = TenantConfig::builder().require_tenant(false).build();
        let req = Request::builder().uri("/customers").body(Body::empty()).unwrap();

        let response = service(config).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "no_tenant");
    }

    #[tokio::test]
    async fn test_optional_tenant_still_rejects_malformed() {
        let config = TenantConfig::builder().require_tenant(false).build();
        let req = Request::builder()
            .uri("/customers")
            .header("X-Tenant-Id", "bogus")
            .body(Body::empty())
            .unwrap();

        let response = service(config).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_context_records_source() {
        #[derive(Clone)]
        struct SourceEcho;

        impl Service<Request<Body>> for SourceEcho {
            type Response = Response<Body>;
            type Error = Infallible;
            type Future = std::future::Ready<Result<Response<Body>, Infallible>>;

            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn call(&mut self, req: Request<Body>) -> Self::Future {
                let source = req
                    .extensions()
                    .get::<TenantContext>()
                    .map(|ctx| ctx.source())
                    .unwrap_or(TenantSignalSource::Claim);
                std::future::ready(Ok(Response::new(Body::from(source.as_str()))))
            }
        }

        let config = TenantConfig::builder().base_domain("shops.example.com").build();
        let req = Request::builder()
            .uri("/customers")
            .header("Host", format!("{TENANT}.shops.example.com"))
            .body(Body::empty())
            .unwrap();

        let response = TenantService::new(SourceEcho, Arc::new(config))
            .oneshot(req)
            .await
            .unwrap();
        assert_eq!(body_string(response).await, "subdomain");
    }
}
