use crate::{
    core::Verdict,
    k8s::{
        configuration::{KongClusterPlugin, KongConsumer, KongPlugin},
        Resource, Secret,
    },
    metrics::{AdmissionMetrics, ReviewResult},
    validator::{self, Validator},
};
use anyhow::{anyhow, Result};
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use kube::core::{admission::Operation, DynamicObject};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};


/// Serves admission reviews for the resources the proxy consumes.
#[derive(Clone)]
pub struct Admission {
    validator: Arc<dyn Validator>,
    metrics: AdmissionMetrics,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type Review = kube::core::admission::AdmissionReview<DynamicObject>;
type AdmissionRequest = kube::core::admission::AdmissionRequest<DynamicObject>;
type AdmissionResponse = kube::core::admission::AdmissionResponse;
type AdmissionReview = kube::core::admission::AdmissionReview<DynamicObject>;

type Body = http_body_util::Full<bytes::Bytes>;

// === impl Admission ===

impl tower::Service<Request<hyper::body::Incoming>> for Admission {
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        if req.method() != http::Method::POST || req.uri().path() != "/" {
            return Box::pin(future::ok(
                Response::builder()
                    .status(http::StatusCode::NOT_FOUND)
                    .body(Body::default())
                    .expect("not found response must be valid"),
            ));
        }

        let admission = self.clone();
        Box::pin(async move {
            use bytes::Buf;
            let bytes = req.into_body().collect().await?.to_bytes();
            let review: Review = match serde_json::from_reader(bytes.reader()) {
                Ok(review) => review,
                Err(error) => {
                    warn!(%error, "Failed to parse request body");
                    return json_response(AdmissionResponse::invalid(error).into_review());
                }
            };
            trace!(?review);

            let rsp = match review.try_into() {
                Ok(req) => {
                    debug!(?req);
                    match admission.admit(&req).await {
                        Ok(rsp) => rsp,
                        Err(error) => return Ok(error_response(&error)),
                    }
                }
                Err(error) => {
                    warn!(%error, "Invalid admission request");
                    AdmissionResponse::invalid(error)
                }
            };
            debug!(?rsp);
            json_response(rsp.into_review())
        })
    }
}

impl Admission {
    pub fn new(validator: Arc<dyn Validator>, metrics: AdmissionMetrics) -> Self {
        Self { validator, metrics }
    }

    /// Reviews a request.
    ///
    /// Returns an error when the validator could not reach a verdict, in which
    /// case the API server's failure policy decides.
    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, validator::Error> {
        let kind = &req.kind.kind;
        let rsp = AdmissionResponse::from(req);

        let verdict = match self.review(req).await {
            Ok(verdict) => verdict,
            Err(error) => {
                warn!(%error, %kind, name = %req.name, "Failed to validate resource");
                self.metrics.observe(kind, ReviewResult::Error);
                return Err(error);
            }
        };

        match verdict {
            Verdict::Accept => {
                self.metrics.observe(kind, ReviewResult::Allowed);
                Ok(rsp)
            }
            Verdict::Reject(reason) => {
                info!(%reason, %kind, ns = ?req.namespace, name = %req.name, "Denied");
                self.metrics.observe(kind, ReviewResult::Denied);
                Ok(rsp.deny(reason))
            }
        }
    }

    async fn review(&self, req: &AdmissionRequest) -> Result<Verdict, validator::Error> {
        if !matches!(req.operation, Operation::Create | Operation::Update) {
            return Ok(Verdict::Accept);
        }

        if is_kind::<KongConsumer>(req) {
            let consumer = match parse::<KongConsumer>(req.object.as_ref()) {
                Ok(consumer) => consumer,
                Err(error) => return Ok(parse_failed(req, error)),
            };
            if req.operation == Operation::Update {
                let old = match parse::<KongConsumer>(req.old_object.as_ref()) {
                    Ok(old) => old,
                    Err(error) => return Ok(parse_failed(req, error)),
                };
                // Only a new username can collide with an existing consumer.
                if old.username == consumer.username {
                    return Ok(Verdict::Accept);
                }
            }
            return self.validator.validate_consumer(&consumer).await;
        }

        if is_kind::<KongPlugin>(req) {
            let plugin = match parse::<KongPlugin>(req.object.as_ref()) {
                Ok(plugin) => plugin,
                Err(error) => return Ok(parse_failed(req, error)),
            };
            let ns = req
                .namespace
                .as_deref()
                .or(plugin.metadata.namespace.as_deref());
            return self.validator.validate_plugin(ns, &plugin.plugin).await;
        }

        if is_kind::<KongClusterPlugin>(req) {
            let plugin = match parse::<KongClusterPlugin>(req.object.as_ref()) {
                Ok(plugin) => plugin,
                Err(error) => return Ok(parse_failed(req, error)),
            };
            return self.validator.validate_plugin(None, &plugin.plugin).await;
        }

        if is_kind::<Secret>(req) {
            let secret = match parse::<Secret>(req.object.as_ref()) {
                Ok(secret) => secret,
                Err(error) => return Ok(parse_failed(req, error)),
            };
            return self.validator.validate_credential(&secret).await;
        }

        // The webhook configuration decides which kinds are sent here.
        debug!(kind = ?req.kind, "Allowing unvalidated resource kind");
        Ok(Verdict::Accept)
    }
}

fn is_kind<T>(req: &AdmissionRequest) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    req.kind.group.eq_ignore_ascii_case(&T::group(&dt))
        && req.kind.kind.eq_ignore_ascii_case(&T::kind(&dt))
}

fn parse<T: DeserializeOwned>(obj: Option<&DynamicObject>) -> Result<T> {
    let obj = obj.ok_or_else(|| anyhow!("admission request missing 'object'"))?;
    let value = serde_json::to_value(obj)?;
    Ok(serde_json::from_value(value)?)
}

fn parse_failed(req: &AdmissionRequest, error: anyhow::Error) -> Verdict {
    info!(%error, "Failed to parse {}", req.kind.kind);
    Verdict::Reject(error.to_string())
}

fn json_response(rsp: AdmissionReview) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}

fn error_response(error: &validator::Error) -> Response<Body> {
    Response::builder()
        .status(http::StatusCode::INTERNAL_SERVER_ERROR)
        .header(http::header::CONTENT_TYPE, "text/plain")
        .body(Body::from(error.to_string()))
        .expect("error response must be valid")
}
