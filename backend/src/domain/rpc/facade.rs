//! One-to-one wrappers over the executor for each downstream resource.
//!
//! Wrappers add no behaviour: each maps to exactly one executor call and
//! returns the raw [`ServiceResponse`]. Use [`ServiceResponse::decode`] to
//! obtain typed payloads.

use std::sync::Arc;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Value, json};

use super::executor::RetryingRequestExecutor;
use super::registry::ServiceName;
use super::response::ServiceResponse;
use crate::domain::ports::RpcMethod;

/// Everything except RFC 3986 unreserved characters is escaped.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// `collection/segment` with `segment` escaped so it stays one path segment.
fn segment_path(collection: &str, segment: &str) -> String {
    format!("{collection}/{}", utf8_percent_encode(segment, PATH_SEGMENT))
}

/// Convenience surface over the downstream services.
#[derive(Clone)]
pub struct DomainFacade {
    executor: Arc<RetryingRequestExecutor>,
}

impl DomainFacade {
    /// Services every wrapper in this facade may call.
    pub const REQUIRED_SERVICES: [ServiceName; 7] = ServiceName::ALL;

    /// Facade over `executor`.
    #[must_use]
    pub fn new(executor: Arc<RetryingRequestExecutor>) -> Self {
        Self { executor }
    }

    /// Executor the wrappers delegate to.
    #[must_use]
    pub fn executor(&self) -> &RetryingRequestExecutor {
        &self.executor
    }

    async fn send(
        &self,
        service: ServiceName,
        method: RpcMethod,
        path: &str,
        body: Option<Value>,
        query: Option<&[(&str, &str)]>,
    ) -> ServiceResponse<Value> {
        self.executor.call(service, method, path, body, query).await
    }
}

macro_rules! resource_operations {
    ($service:ident, $singular:ident, $plural:ident, $path:literal) => {
        paste::paste! {
            impl DomainFacade {
                #[doc = "Fetch one " $singular " by id."]
                pub async fn [<get_ $singular>](&self, id: &str) -> ServiceResponse<Value> {
                    let path = segment_path($path, id);
                    self.send(ServiceName::$service, RpcMethod::Get, &path, None, None)
                        .await
                }

                #[doc = "List " $plural ", filtered by `query`."]
                pub async fn [<list_ $plural>](
                    &self,
                    query: &[(&str, &str)],
                ) -> ServiceResponse<Value> {
                    let query = (!query.is_empty()).then_some(query);
                    self.send(ServiceName::$service, RpcMethod::Get, $path, None, query)
                        .await
                }

                #[doc = "Create a " $singular "."]
                pub async fn [<create_ $singular>](&self, body: Value) -> ServiceResponse<Value> {
                    self.send(ServiceName::$service, RpcMethod::Post, $path, Some(body), None)
                        .await
                }

                #[doc = "Update the " $singular " identified by `id`."]
                pub async fn [<update_ $singular>](
                    &self,
                    id: &str,
                    body: Value,
                ) -> ServiceResponse<Value> {
                    let path = segment_path($path, id);
                    self.send(ServiceName::$service, RpcMethod::Put, &path, Some(body), None)
                        .await
                }

                #[doc = "Delete the " $singular " identified by `id`."]
                pub async fn [<delete_ $singular>](&self, id: &str) -> ServiceResponse<Value> {
                    let path = segment_path($path, id);
                    self.send(ServiceName::$service, RpcMethod::Delete, &path, None, None)
                        .await
                }
            }
        }
    };
}

resource_operations!(User, user, users, "/users");
resource_operations!(Customer, customer, customers, "/customers");
resource_operations!(Carrier, carrier, carriers, "/carriers");
resource_operations!(Seller, seller, sellers, "/sellers");
resource_operations!(Pricing, price_rule, price_rules, "/pricing/rules");
resource_operations!(Translation, translation, translations, "/translations");

impl DomainFacade {
    /// Price a shipment.
    pub async fn calculate_price(&self, request: Value) -> ServiceResponse<Value> {
        self.send(
            ServiceName::Pricing,
            RpcMethod::Post,
            "/pricing/calculate",
            Some(request),
            None,
        )
        .await
    }

    /// Translations of every key for `locale`.
    pub async fn translations_for_locale(&self, locale: &str) -> ServiceResponse<Value> {
        let path = segment_path("/translations/locale", locale);
        self.send(ServiceName::Translation, RpcMethod::Get, &path, None, None)
            .await
    }

    /// Exchange credentials for tokens.
    pub async fn login(&self, credentials: Value) -> ServiceResponse<Value> {
        self.send(
            ServiceName::Auth,
            RpcMethod::Post,
            "/auth/login",
            Some(credentials),
            None,
        )
        .await
    }

    /// Register a new account.
    pub async fn register(&self, registration: Value) -> ServiceResponse<Value> {
        self.send(
            ServiceName::Auth,
            RpcMethod::Post,
            "/auth/register",
            Some(registration),
            None,
        )
        .await
    }

    /// Check an access token and return its claims.
    pub async fn verify_token(&self, token: &str) -> ServiceResponse<Value> {
        self.send(
            ServiceName::Auth,
            RpcMethod::Post,
            "/auth/verify",
            Some(json!({ "token": token })),
            None,
        )
        .await
    }

    /// Trade a refresh token for a new token pair.
    pub async fn refresh_token(&self, refresh_token: &str) -> ServiceResponse<Value> {
        self.send(
            ServiceName::Auth,
            RpcMethod::Post,
            "/auth/refresh",
            Some(json!({ "refreshToken": refresh_token })),
            None,
        )
        .await
    }

    /// Revoke a session.
    pub async fn logout(&self, token: &str) -> ServiceResponse<Value> {
        self.send(
            ServiceName::Auth,
            RpcMethod::Post,
            "/auth/logout",
            Some(json!({ "token": token })),
            None,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;
    use url::Url;

    use super::*;
    use crate::domain::ports::{MockServiceTransport, TransportResponse};
    use crate::domain::rpc::{ServiceConfig, ServiceRegistry};

    fn facade_expecting(
        method: RpcMethod,
        path: &'static str,
        body: Option<Value>,
    ) -> DomainFacade {
        let registry = ServiceName::ALL
            .into_iter()
            .fold(ServiceRegistry::builder(), |builder, name| {
                let url = Url::parse(&format!("http://{name}.internal")).expect("url");
                builder.register(
                    name,
                    ServiceConfig::new(url).with_retries(0, Duration::ZERO),
                )
            })
            .build();
        let mut transport = MockServiceTransport::new();
        transport
            .expect_send()
            .withf(move |request| {
                request.method == method && request.url.path() == path && request.body == body
            })
            .times(1)
            .returning(|request| {
                Ok(TransportResponse {
                    status: 200,
                    body: json!({ "host": request.url.host_str() }),
                })
            });
        let executor = RetryingRequestExecutor::new(Arc::new(registry), Arc::new(transport));
        DomainFacade::new(Arc::new(executor))
    }

    #[rstest]
    #[case::user("/users/u-1", "user.internal")]
    #[case::translations("/translations/locale/fr", "translation.internal")]
    #[tokio::test]
    async fn read_wrappers_target_their_service(#[case] path: &'static str, #[case] host: &str) {
        let facade = facade_expecting(RpcMethod::Get, path, None);
        let response = if path.starts_with("/users") {
            facade.get_user("u-1").await
        } else {
            facade.translations_for_locale("fr").await
        };
        assert_eq!(response.data, Some(json!({ "host": host })));
    }

    #[tokio::test]
    async fn crud_wrappers_map_to_verbs_and_paths() {
        let body = json!({"name": "Acme"});

        let facade = facade_expecting(RpcMethod::Post, "/customers", Some(body.clone()));
        assert!(facade.create_customer(body.clone()).await.is_success());

        let facade = facade_expecting(RpcMethod::Put, "/carriers/c-7", Some(body.clone()));
        assert!(facade.update_carrier("c-7", body.clone()).await.is_success());

        let facade = facade_expecting(RpcMethod::Delete, "/sellers/s-2", None);
        assert!(facade.delete_seller("s-2").await.is_success());

        let facade = facade_expecting(RpcMethod::Get, "/pricing/rules", None);
        assert!(facade.list_price_rules(&[]).await.is_success());

        let facade = facade_expecting(RpcMethod::Get, "/translations/t-1", None);
        assert!(facade.get_translation("t-1").await.is_success());
    }

    #[rstest]
    #[case::query_and_fragment("a?b#c", "a%3Fb%23c")]
    #[case::slash("a/b", "a%2Fb")]
    #[case::space("a b", "a%20b")]
    #[case::unreserved("u-1.v_2~", "u-1.v_2~")]
    fn ids_stay_a_single_path_segment(#[case] id: &str, #[case] encoded: &str) {
        assert_eq!(segment_path("/users", id), format!("/users/{encoded}"));
    }

    #[tokio::test]
    async fn reserved_characters_in_ids_do_not_rewrite_the_target() {
        let facade = facade_expecting(RpcMethod::Delete, "/sellers/s%2F2%3Fforce%3D1%23x", None);
        assert!(facade.delete_seller("s/2?force=1#x").await.is_success());

        let facade = facade_expecting(RpcMethod::Get, "/translations/locale/..%2Fadmin", None);
        assert!(facade.translations_for_locale("../admin").await.is_success());
    }

    #[tokio::test]
    async fn list_wrappers_forward_query_pairs() {
        let registry = ServiceRegistry::builder()
            .register(
                ServiceName::User,
                ServiceConfig::new(Url::parse("http://user.internal").expect("url")),
            )
            .build();
        let mut transport = MockServiceTransport::new();
        transport
            .expect_send()
            .withf(|request| request.query == vec![("role".to_owned(), "admin".to_owned())])
            .times(1)
            .returning(|_| {
                Ok(TransportResponse {
                    status: 200,
                    body: json!([]),
                })
            });
        let facade = DomainFacade::new(Arc::new(RetryingRequestExecutor::new(
            Arc::new(registry),
            Arc::new(transport),
        )));

        let response = facade.list_users(&[("role", "admin")]).await;
        assert_eq!(response.data, Some(json!([])));
    }

    #[tokio::test]
    async fn auth_wrappers_post_tokens_in_the_body() {
        let facade = facade_expecting(
            RpcMethod::Post,
            "/auth/verify",
            Some(json!({"token": "abc"})),
        );
        assert!(facade.verify_token("abc").await.is_success());

        let facade = facade_expecting(
            RpcMethod::Post,
            "/auth/refresh",
            Some(json!({"refreshToken": "r-1"})),
        );
        assert!(facade.refresh_token("r-1").await.is_success());

        let facade = facade_expecting(
            RpcMethod::Post,
            "/pricing/calculate",
            Some(json!({"weight": 3})),
        );
        assert!(facade.calculate_price(json!({"weight": 3})).await.is_success());
    }
}
