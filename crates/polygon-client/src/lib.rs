use async_trait::async_trait;
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use portfolio_core::{PortfolioError, PriceHistoryProvider, PricePoint};
use reqwest::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://api.polygon.io";
/// Free tier allowance.
const DEFAULT_RATE_LIMIT: usize = 5;
const MAX_RETRIES: u32 = 3;
/// How far back `max` reaches.
const MAX_HISTORY_YEARS: u32 = 50;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait until the oldest request falls out of the window
            let Some(&oldest) = ts.front() else { continue };
            let sleep_dur = (oldest + self.window).duration_since(now) + Duration::from_millis(50);
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for Polygon API slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Daily close history from Polygon's aggregates endpoint.
#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl PolygonClient {
    /// Rate limit comes from `POLYGON_RATE_LIMIT` (requests per minute), default 5.
    pub fn new(api_key: String) -> Self {
        let rate_limit: usize = std::env::var("POLYGON_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT);
        Self::with_rate_limit(api_key, rate_limit)
    }

    pub fn with_rate_limit(api_key: String, requests_per_minute: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            client,
            rate_limiter: RateLimiter::new(requests_per_minute, Duration::from_secs(60)),
        }
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, PortfolioError> {
        let request = builder.build().map_err(|e| PortfolioError::ApiError(e.to_string()))?;

        for attempt in 0..MAX_RETRIES {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| PortfolioError::ApiError("Cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| PortfolioError::ApiError(e.to_string()))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            let wait_secs = 15u64;
            tracing::warn!(
                "Polygon 429 rate limited, waiting {}s before retry {}/{}",
                wait_secs,
                attempt + 1,
                MAX_RETRIES
            );
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(PortfolioError::ApiError(format!(
            "Rate limited by Polygon after {} retries",
            MAX_RETRIES
        )))
    }

    /// Adjusted daily closes for `symbol` between `from` and `to` inclusive.
    pub async fn get_daily_closes(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortfolioError> {
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            BASE_URL,
            symbol,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let response = self
            .send_request(self.client.get(&url).query(&[
                ("apiKey", self.api_key.as_str()),
                ("adjusted", "true"),
                ("sort", "asc"),
                ("limit", "50000"),
            ]))
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(PortfolioError::DataUnavailable(format!("{} is not known to Polygon", symbol)));
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(PortfolioError::Configuration(format!(
                "Polygon rejected the API key (HTTP {})",
                status
            )));
        }
        if !status.is_success() {
            return Err(PortfolioError::ApiError(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            )));
        }

        let agg_response: AggregateResponse = response
            .json()
            .await
            .map_err(|e| PortfolioError::ApiError(e.to_string()))?;

        let points = agg_response.into_price_points();
        tracing::debug!("Fetched {} daily closes for {}", points.len(), symbol);
        Ok(points)
    }
}

#[async_trait]
impl PriceHistoryProvider for PolygonClient {
    async fn fetch_history(&self, ticker: &str, period: &str) -> Result<Vec<PricePoint>, PortfolioError> {
        let (from, to) = parse_period(period, Utc::now().date_naive())?;
        self.get_daily_closes(ticker, from, to).await
    }
}

/// Map a relative period such as `5y`, `5 years`, `6mo`, `30d`, `1w`, `ytd` or
/// `max` to an inclusive `(from, to)` date range ending at `today`.
pub fn parse_period(period: &str, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), PortfolioError> {
    let normalized = period.trim().to_ascii_lowercase();
    let invalid = || PortfolioError::Configuration(format!("unrecognized period '{}'", period));

    let from = match normalized.as_str() {
        "ytd" => NaiveDate::from_ymd_opt(today.year(), 1, 1),
        "max" => today.checked_sub_months(Months::new(MAX_HISTORY_YEARS * 12)),
        _ => {
            let split = normalized
                .find(|c: char| !c.is_ascii_digit())
                .ok_or_else(invalid)?;
            let (count, unit) = normalized.split_at(split);
            let count: u32 = count.parse().map_err(|_| invalid())?;
            if count == 0 {
                return Err(invalid());
            }

            match unit.trim() {
                "y" | "yr" | "yrs" | "year" | "years" => count
                    .checked_mul(12)
                    .and_then(|months| today.checked_sub_months(Months::new(months))),
                "mo" | "mos" | "month" | "months" => today.checked_sub_months(Months::new(count)),
                "w" | "wk" | "wks" | "week" | "weeks" => {
                    today.checked_sub_days(chrono::Days::new(u64::from(count) * 7))
                }
                "d" | "day" | "days" => today.checked_sub_days(chrono::Days::new(u64::from(count))),
                _ => return Err(invalid()),
            }
        }
    };

    from.map(|from| (from, today)).ok_or_else(invalid)
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp (ms)
    c: f64, // close
}

impl AggregateResponse {
    fn into_price_points(self) -> Vec<PricePoint> {
        self.results
            .into_iter()
            .filter_map(|r| {
                let date = DateTime::from_timestamp_millis(r.t)?.date_naive();
                Some(PricePoint::new(date, r.c))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_period_years() {
        let today = day(2024, 6, 14);
        assert_eq!(parse_period("5y", today).unwrap(), (day(2019, 6, 14), today));
        assert_eq!(parse_period("5 years", today).unwrap(), (day(2019, 6, 14), today));
        assert_eq!(parse_period("1 Year", today).unwrap(), (day(2023, 6, 14), today));
    }

    #[test]
    fn test_parse_period_short_units() {
        let today = day(2024, 3, 31);
        assert_eq!(parse_period("6mo", today).unwrap().0, day(2023, 9, 30));
        assert_eq!(parse_period("30d", today).unwrap().0, day(2024, 3, 1));
        assert_eq!(parse_period("1w", today).unwrap().0, day(2024, 3, 24));
    }

    #[test]
    fn test_parse_period_keywords() {
        let today = day(2024, 8, 20);
        assert_eq!(parse_period("ytd", today).unwrap().0, day(2024, 1, 1));
        assert_eq!(parse_period("max", today).unwrap().0, day(1974, 8, 20));
    }

    #[test]
    fn test_parse_period_rejects_garbage() {
        let today = day(2024, 8, 20);
        for bad in ["", "years", "5", "0y", "5 fortnights", "dummy"] {
            assert!(
                matches!(parse_period(bad, today), Err(PortfolioError::Configuration(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_aggregate_response_to_closes() {
        let body = r#"{
            "ticker": "AAPL",
            "status": "OK",
            "results": [
                {"v": 1000.0, "o": 180.0, "c": 181.5, "h": 182.0, "l": 179.0, "t": 1704171600000},
                {"v": 1200.0, "o": 181.5, "c": 183.25, "h": 184.0, "l": 181.0, "t": 1704258000000}
            ]
        }"#;
        let response: AggregateResponse = serde_json::from_str(body).unwrap();
        let points = response.into_price_points();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, day(2024, 1, 2));
        assert_eq!(points[1].close, 183.25);
    }

    #[test]
    fn test_missing_results_is_empty() {
        let response: AggregateResponse =
            serde_json::from_str(r#"{"ticker": "ZZZZ", "status": "OK", "resultsCount": 0}"#).unwrap();
        assert!(response.into_price_points().is_empty());
    }
}
