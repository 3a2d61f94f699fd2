use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::{InstrumentResolver, Session};
use crate::config::BrokerConfig;
use crate::error::TradingError;
use crate::execution::{BrokerApi, OrderKind, OrderRequest, PendingOrder};
use crate::models::{Action, OpenPosition};
use crate::Result;

const API_VERSION: &str = "3";
const PRODUCT_INTRADAY: &str = "MIS";

type KiteRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderIdData {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct OrderData {
    order_id: String,
    tradingsymbol: String,
    transaction_type: String,
    quantity: u64,
    #[serde(default)]
    trigger_price: f64,
    status: String,
}

#[derive(Debug, Deserialize)]
struct PositionsData {
    day: Vec<PositionData>,
}

#[derive(Debug, Deserialize)]
struct PositionData {
    tradingsymbol: String,
    quantity: i64,
    average_price: f64,
}

#[derive(Debug, Deserialize)]
struct MarginsData {
    equity: SegmentMargin,
}

#[derive(Debug, Deserialize)]
struct SegmentMargin {
    available: AvailableMargin,
}

#[derive(Debug, Deserialize)]
struct AvailableMargin {
    live_balance: f64,
}

// ============== Implementation ==============

/// HTTP client for the Kite Connect order API, rate limited per second
#[derive(Clone)]
pub struct KiteClient {
    client: Client,
    base_url: String,
    exchange: String,
    session: Session,
    rate_limiter: Arc<KiteRateLimiter>,
}

impl KiteClient {
    pub fn new(config: &BrokerConfig, session: Session) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TradingError::Config(format!("failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(config.requests_per_second)
            .ok_or_else(|| TradingError::Config("broker.requests_per_second must be positive".into()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            exchange: config.exchange.clone(),
            session,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        })
    }

    async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.rate_limiter.until_ready().await;

        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("X-Kite-Version", API_VERSION)
            .header("Authorization", self.session.authorization())
    }

    /// Send and unwrap the `{status, data}` envelope
    async fn call<T: DeserializeOwned>(&self, operation: &str, request: RequestBuilder) -> Result<T> {
        let response = send(operation, request).await?;
        let envelope: Envelope<T> = response.json().await.map_err(|e| TradingError::Broker {
            operation: operation.to_string(),
            reason: format!("malformed response: {}", e),
        })?;

        match envelope {
            Envelope {
                status,
                data: Some(data),
                ..
            } if status == "success" => Ok(data),
            Envelope { message, .. } => Err(TradingError::Broker {
                operation: operation.to_string(),
                reason: message.unwrap_or_else(|| "no data in response".to_string()),
            }),
        }
    }

    /// Instrument dump of this client's exchange
    pub async fn instruments(&self) -> Result<InstrumentResolver> {
        let path = format!("/instruments/{}", self.exchange);
        let response = send("instruments", self.request(Method::GET, &path).await).await?;
        let body = response
            .text()
            .await
            .map_err(|e| TradingError::transient("instruments", e))?;

        InstrumentResolver::from_csv(&self.exchange, &body)
    }
}

/// Send a request, classifying failures as transient or as broker rejections
async fn send(operation: &str, request: RequestBuilder) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| TradingError::transient(operation, e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let reason = format!("{}: {}", status, body);

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        tracing::warn!(operation, "Broker returned {}", status);
        Err(TradingError::transient(operation, reason))
    } else {
        Err(TradingError::Broker {
            operation: operation.to_string(),
            reason,
        })
    }
}

fn transaction_type(action: Action) -> &'static str {
    match action {
        Action::Buy => "BUY",
        Action::Sell => "SELL",
    }
}

#[async_trait]
impl BrokerApi for KiteClient {
    async fn place_order(&self, request: &OrderRequest) -> Result<String> {
        let quantity = request.quantity.to_string();
        let mut form = vec![
            ("tradingsymbol", request.symbol.clone()),
            ("exchange", self.exchange.clone()),
            ("transaction_type", transaction_type(request.action).to_string()),
            ("quantity", quantity),
            ("product", PRODUCT_INTRADAY.to_string()),
            ("validity", "DAY".to_string()),
        ];
        match request.kind {
            OrderKind::Market => form.push(("order_type", "MARKET".to_string())),
            OrderKind::StopLossMarket => {
                form.push(("order_type", "SL-M".to_string()));
                if let Some(trigger) = request.trigger_price {
                    form.push(("trigger_price", format!("{:.2}", trigger)));
                }
            }
        }

        let builder = self.request(Method::POST, "/orders/regular").await.form(&form);
        let data: OrderIdData = self.call("place_order", builder).await?;
        Ok(data.order_id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let path = format!("/orders/regular/{}", order_id);
        let builder = self.request(Method::DELETE, &path).await;
        let _: OrderIdData = self.call("cancel_order", builder).await?;
        Ok(())
    }

    async fn positions(&self) -> Result<Vec<OpenPosition>> {
        let builder = self.request(Method::GET, "/portfolio/positions").await;
        let data: PositionsData = self.call("positions", builder).await?;

        Ok(data
            .day
            .into_iter()
            .map(|p| OpenPosition {
                symbol: p.tradingsymbol,
                quantity: p.quantity,
                average_price: p.average_price,
            })
            .collect())
    }

    async fn pending_orders(&self) -> Result<Vec<PendingOrder>> {
        let builder = self.request(Method::GET, "/orders").await;
        let orders: Vec<OrderData> = self.call("pending_orders", builder).await?;

        Ok(orders
            .into_iter()
            .filter(|o| matches!(o.status.as_str(), "TRIGGER PENDING" | "OPEN"))
            .filter_map(|o| {
                let action = match o.transaction_type.as_str() {
                    "BUY" => Action::Buy,
                    "SELL" => Action::Sell,
                    other => {
                        tracing::warn!(order_id = %o.order_id, "Unknown transaction type {}", other);
                        return None;
                    }
                };
                Some(PendingOrder {
                    order_id: o.order_id,
                    symbol: o.tradingsymbol,
                    action,
                    quantity: o.quantity,
                    trigger_price: o.trigger_price,
                })
            })
            .collect())
    }

    async fn available_cash(&self) -> Result<f64> {
        let builder = self.request(Method::GET, "/user/margins").await;
        let data: MarginsData = self.call("available_cash", builder).await?;
        Ok(data.equity.available.live_balance)
    }
}
