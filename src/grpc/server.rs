//! gRPC server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;
use tracing::{error, info};

use super::promotions::PromotionsService;
use super::proto::storeguard::v1::login_throttle_server::LoginThrottleServer;
use super::proto::storeguard::v1::promotions_server::PromotionsServer;
use super::throttle::LoginThrottleService;
use crate::config::LoginThrottleConfig;
use crate::error::{Result, StoreguardError};
use crate::promo::PromoStore;
use crate::ratelimit::RateLimiterBackend;

/// gRPC server hosting the LoginThrottle and Promotions services.
pub struct GrpcServer<R: RateLimiterBackend + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    rate_limiter: Arc<R>,
    /// Limits applied to login attempts
    limits: LoginThrottleConfig,
    /// The promo code store
    promos: Arc<PromoStore>,
}

impl<R: RateLimiterBackend + 'static> GrpcServer<R> {
    /// Create a new gRPC server.
    pub fn new(
        addr: SocketAddr,
        rate_limiter: Arc<R>,
        limits: LoginThrottleConfig,
        promos: Arc<PromoStore>,
    ) -> Self {
        Self {
            addr,
            rate_limiter,
            limits,
            promos,
        }
    }

    /// Address the server binds to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start the gRPC server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        let throttle = LoginThrottleService::new(self.rate_limiter, self.limits);
        let promotions = PromotionsService::new(self.promos);

        info!(
            addr = %self.addr,
            "Starting gRPC server for LoginThrottle and Promotions"
        );

        Server::builder()
            .add_service(LoginThrottleServer::new(throttle))
            .add_service(PromotionsServer::new(promotions))
            .serve_with_shutdown(self.addr, signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                StoreguardError::Grpc(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::RateLimiter;

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let server = GrpcServer::new(
            addr,
            Arc::new(RateLimiter::new()),
            LoginThrottleConfig::default(),
            Arc::new(PromoStore::new()),
        );
        assert_eq!(server.addr(), addr);
    }

    #[tokio::test]
    async fn test_serve_stops_on_signal() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = GrpcServer::new(
            addr,
            Arc::new(RateLimiter::new()),
            LoginThrottleConfig::default(),
            Arc::new(PromoStore::new()),
        );

        let result = server.serve_with_shutdown(async {}).await;
        assert!(result.is_ok());
    }
}
