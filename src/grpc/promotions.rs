//! Promotions service implementation.

use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_stream::Stream;
use tonic::{Request, Response, Status};
use tracing::{debug, instrument, warn};

use super::proto::storeguard::v1 as proto;
use super::proto::storeguard::v1::promotions_server::Promotions;
use crate::clock::{Clock, SystemClock};
use crate::error::StoreguardError;
use crate::promo::{
    ContentType, NewPromoCode, PromoCode, PromoCodeUpdate, PromoRedemption, PromoStore,
    PromoValidation,
};

/// Implementation of the Promotions gRPC interface.
pub struct PromotionsService<C: Clock = SystemClock> {
    promos: Arc<PromoStore<C>>,
}

impl<C: Clock> PromotionsService<C> {
    /// Create a new PromotionsService over the given store.
    pub fn new(promos: Arc<PromoStore<C>>) -> Self {
        Self { promos }
    }
}

fn to_status(err: StoreguardError) -> Status {
    match err {
        StoreguardError::Validation(message) => Status::invalid_argument(message),
        other => {
            warn!(error = %other, "Promo operation failed");
            Status::internal(other.to_string())
        }
    }
}

fn require<'a>(value: &'a str, field: &str) -> Result<&'a str, Status> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Status::invalid_argument(format!("{} is required", field)));
    }
    Ok(value)
}

fn content_type(value: &str) -> Result<ContentType, Status> {
    require(value, "content_type")?.parse().map_err(to_status)
}

fn content_scope(value: &str) -> Result<Option<ContentType>, Status> {
    ContentType::parse_scope(value).map_err(to_status)
}

fn email(value: &str) -> Result<&str, Status> {
    let value = require(value, "email")?;
    if !value.contains('@') {
        return Err(Status::invalid_argument("email is not a valid address"));
    }
    Ok(value)
}

fn to_datetime(ts: prost_types::Timestamp) -> Result<DateTime<Utc>, Status> {
    u32::try_from(ts.nanos)
        .ok()
        .and_then(|nanos| DateTime::from_timestamp(ts.seconds, nanos))
        .ok_or_else(|| Status::invalid_argument("timestamp out of range"))
}

fn to_timestamp(dt: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    }
}

/// `clear` wins over a value; neither leaves the field untouched.
fn nullable_timestamp(
    value: Option<prost_types::Timestamp>,
    clear: bool,
) -> Result<Option<Option<DateTime<Utc>>>, Status> {
    if clear {
        return Ok(Some(None));
    }
    value.map(to_datetime).transpose().map(|dt| dt.map(Some))
}

impl From<PromoValidation> for proto::PromoValidation {
    fn from(validation: PromoValidation) -> Self {
        Self {
            valid: validation.valid,
            discount: u32::from(validation.discount),
            message: validation.message,
        }
    }
}

impl From<PromoCode> for proto::PromoCode {
    fn from(promo: PromoCode) -> Self {
        Self {
            code: promo.code,
            discount_percent: u32::from(promo.discount_percent),
            content_type: promo
                .applicable_content_type
                .map(|ct| ct.to_string())
                .unwrap_or_default(),
            content_id: promo.applicable_content_id.unwrap_or_default(),
            valid_from: promo.valid_from.map(to_timestamp),
            valid_until: promo.valid_until.map(to_timestamp),
            max_uses: promo.max_uses,
            used_count: promo.used_count,
            active: promo.active,
        }
    }
}

impl From<PromoRedemption> for proto::Redemption {
    fn from(redemption: PromoRedemption) -> Self {
        Self {
            id: redemption.id.to_string(),
            code: redemption.code,
            email: redemption.email,
            content_type: redemption.content_type.to_string(),
            content_id: redemption.content_id,
            discount_percent: u32::from(redemption.discount_percent),
            redeemed_at: Some(to_timestamp(redemption.redeemed_at)),
        }
    }
}

impl TryFrom<proto::CreatePromoCodeRequest> for NewPromoCode {
    type Error = Status;

    fn try_from(req: proto::CreatePromoCodeRequest) -> Result<Self, Status> {
        Ok(NewPromoCode {
            code: req.code,
            discount_percent: req.discount_percent,
            applicable_content_type: content_scope(&req.content_type)?,
            applicable_content_id: Some(req.content_id),
            valid_from: req.valid_from.map(to_datetime).transpose()?,
            valid_until: req.valid_until.map(to_datetime).transpose()?,
            max_uses: req.max_uses,
            active: req.active.unwrap_or(true),
        })
    }
}

impl TryFrom<proto::UpdatePromoCodeRequest> for PromoCodeUpdate {
    type Error = Status;

    fn try_from(req: proto::UpdatePromoCodeRequest) -> Result<Self, Status> {
        Ok(PromoCodeUpdate {
            discount_percent: req.discount_percent,
            applicable_content_type: req
                .content_type
                .as_deref()
                .map(content_scope)
                .transpose()?,
            applicable_content_id: req.content_id.map(Some),
            valid_from: nullable_timestamp(req.valid_from, req.clear_valid_from)?,
            valid_until: nullable_timestamp(req.valid_until, req.clear_valid_until)?,
            max_uses: if req.clear_max_uses {
                Some(None)
            } else {
                req.max_uses.map(Some)
            },
            active: req.active,
        })
    }
}

type RedemptionStream = Pin<Box<dyn Stream<Item = Result<proto::Redemption, Status>> + Send>>;

#[tonic::async_trait]
impl<C: Clock + 'static> Promotions for PromotionsService<C> {
    /// Check a code against a content item without using it.
    #[instrument(skip(self, request), fields(code = %request.get_ref().code))]
    async fn validate_promo_code(
        &self,
        request: Request<proto::ValidatePromoCodeRequest>,
    ) -> Result<Response<proto::PromoValidation>, Status> {
        let req = request.into_inner();
        let code = require(&req.code, "code")?;
        let content_type = content_type(&req.content_type)?;
        let content_id = require(&req.content_id, "content_id")?;

        let validation = self.promos.validate(code, content_type, content_id);
        Ok(Response::new(validation.into()))
    }

    /// Validate and record a use of a code in one atomic step.
    #[instrument(skip(self, request), fields(code = %request.get_ref().code))]
    async fn redeem_promo_code(
        &self,
        request: Request<proto::RedeemPromoCodeRequest>,
    ) -> Result<Response<proto::RedeemPromoCodeResponse>, Status> {
        let req = request.into_inner();
        let code = require(&req.code, "code")?;
        let email = email(&req.email)?;
        let content_type = content_type(&req.content_type)?;
        let content_id = require(&req.content_id, "content_id")?;

        // The audit log append is blocking file I/O
        let promos = self.promos.clone();
        let (code, email, content_id) = (code.to_string(), email.to_string(), content_id.to_string());
        let outcome = tokio::task::spawn_blocking(move || {
            promos.redeem(&code, &email, content_type, &content_id)
        })
        .await
        .map_err(|e| {
            warn!(error = %e, "Redemption task failed");
            Status::internal("redemption failed")
        })?;

        let response = match outcome {
            Ok(redemption) => proto::RedeemPromoCodeResponse {
                validation: Some(PromoValidation::accepted(redemption.discount_percent).into()),
                redemption: Some(redemption.into()),
            },
            Err(reason) => {
                debug!(reason = %reason, "Redemption refused");
                proto::RedeemPromoCodeResponse {
                    validation: Some(PromoValidation::rejected(reason).into()),
                    redemption: None,
                }
            }
        };

        Ok(Response::new(response))
    }

    #[instrument(skip(self, request), fields(code = %request.get_ref().code))]
    async fn create_promo_code(
        &self,
        request: Request<proto::CreatePromoCodeRequest>,
    ) -> Result<Response<proto::PromoCode>, Status> {
        let data = NewPromoCode::try_from(request.into_inner())?;
        let promo = self.promos.create(data).map_err(to_status)?;
        Ok(Response::new(promo.into()))
    }

    #[instrument(skip(self, request), fields(code = %request.get_ref().code))]
    async fn update_promo_code(
        &self,
        request: Request<proto::UpdatePromoCodeRequest>,
    ) -> Result<Response<proto::PromoCode>, Status> {
        let req = request.into_inner();
        let code = require(&req.code, "code")?.to_string();
        let update = PromoCodeUpdate::try_from(req)?;

        match self.promos.update(&code, update).map_err(to_status)? {
            Some(promo) => Ok(Response::new(promo.into())),
            None => Err(Status::not_found(format!("promo code {} not found", code))),
        }
    }

    #[instrument(skip(self, request), fields(code = %request.get_ref().code))]
    async fn delete_promo_code(
        &self,
        request: Request<proto::DeletePromoCodeRequest>,
    ) -> Result<Response<proto::DeletePromoCodeResponse>, Status> {
        let req = request.into_inner();
        let code = require(&req.code, "code")?;

        Ok(Response::new(proto::DeletePromoCodeResponse {
            deleted: self.promos.delete(code),
        }))
    }

    #[instrument(skip(self, _request))]
    async fn list_promo_codes(
        &self,
        _request: Request<proto::ListPromoCodesRequest>,
    ) -> Result<Response<proto::ListPromoCodesResponse>, Status> {
        let codes = self.promos.list().into_iter().map(Into::into).collect();
        Ok(Response::new(proto::ListPromoCodesResponse { codes }))
    }

    type ListRedemptionsStream = RedemptionStream;

    #[instrument(skip(self, request), fields(code = %request.get_ref().code))]
    async fn list_redemptions(
        &self,
        request: Request<proto::ListRedemptionsRequest>,
    ) -> Result<Response<Self::ListRedemptionsStream>, Status> {
        let req = request.into_inner();
        let filter = Some(req.code.trim()).filter(|code| !code.is_empty());

        let redemptions: Vec<Result<proto::Redemption, Status>> = self
            .promos
            .redemptions(filter)
            .into_iter()
            .map(|r| Ok(r.into()))
            .collect();

        let stream: Self::ListRedemptionsStream = Box::pin(tokio_stream::iter(redemptions));
        Ok(Response::new(stream))
    }
}
