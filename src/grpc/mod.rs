//! gRPC surface for login throttling and promo codes.

mod identity;
mod promotions;
mod server;
mod throttle;

pub use identity::{client_identifier, UNKNOWN_CLIENT};
pub use promotions::PromotionsService;
pub use server::GrpcServer;
pub use throttle::LoginThrottleService;

// Include the generated protobuf code
pub mod proto {
    pub mod storeguard {
        pub mod v1 {
            tonic::include_proto!("storeguard.v1");
        }
    }
}

// Re-export commonly used types
pub use proto::storeguard::v1::{
    login_throttle_server::LoginThrottleServer, promotions_server::PromotionsServer,
};
