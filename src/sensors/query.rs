use chrono::{Duration, NaiveDate};
use reqwest::blocking::Client;
use reqwest::StatusCode;

use super::{parse_series, FetchError, SensorTimeSeries};
use crate::config::ApiSettings;
use crate::registry::SensorRecord;

/// Inclusive date range sent as `date=<start>@<end>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Missing bounds default to `window_days` before `today` and to tomorrow.
    ///
    /// A window reaching past the calendar range starts at the earliest representable date.
    pub fn resolve(start: Option<NaiveDate>, end: Option<NaiveDate>, window_days: i64, today: NaiveDate) -> Self {
        let window_start = || {
            Duration::try_days(window_days)
                .and_then(|window| today.checked_sub_signed(window))
                .unwrap_or(NaiveDate::MIN)
        };
        DateRange {
            start: start.unwrap_or_else(window_start),
            end: end.unwrap_or_else(|| today.succ_opt().unwrap_or(today)),
        }
    }

    fn query_value(&self) -> String {
        format!("{}@{}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }
}

pub struct Fetcher {
    client: Client,
    base_url: String,
    user: String,
}

impl Fetcher {
    pub fn new(api: &ApiSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(api.timeout_secs))
            .build()
            .map_err(|err| FetchError::Network(format!("could not build HTTP client: {err}")))?;

        Ok(Self::with_client(client, api))
    }

    fn with_client(client: Client, api: &ApiSettings) -> Self {
        Fetcher {
            client,
            base_url: api.base_url.clone(),
            user: api.user.clone(),
        }
    }

    /// One blocking GET for the sensor's site over `range`.
    pub fn fetch(
        &self,
        record: &SensorRecord,
        range: &DateRange,
        variables: &[String],
    ) -> Result<SensorTimeSeries, FetchError> {
        let site_id = &record.site_id;
        let mut params = vec![
            ("user", self.user.clone()),
            ("site_id", site_id.to_string()),
            ("query", "filter_site".to_string()),
            ("date", range.query_value()),
        ];
        if !variables.is_empty() {
            params.push(("variables", variables.join(",")));
        }

        log::debug!("GET {} site_id={site_id} date={}", self.base_url, range.query_value());
        let result = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .map_err(|err| FetchError::Network(err.to_string()))
            .and_then(|response| {
                let status = response.status();
                if status != StatusCode::OK {
                    return Err(FetchError::Status(status.as_u16()));
                }
                response.text().map_err(|err| FetchError::Network(err.to_string()))
            })
            .and_then(|body| parse_series(&body));

        let name = &record.name;
        match &result {
            Ok(series) => {
                log::debug!("{name} (id {site_id}): {} readings", series.len());
                series.log_invalid_cells(record);
            }
            Err(FetchError::NoData) => log::warn!(
                "{name} (id {site_id}): no data between {} and {}",
                range.start,
                range.end
            ),
            Err(err) => log::warn!("{name} (id {site_id}): {err}"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{SiteId, SiteMetadata};
    use std::thread::{self, JoinHandle};
    use tiny_http::{Response, Server, StatusCode as MockStatus};

    fn serve_once(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let handle = thread::spawn(move || {
            let request = server.recv().unwrap();
            let url = request.url().to_string();
            request
                .respond(Response::from_string(body).with_status_code(MockStatus(status)))
                .unwrap();
            url
        });
        (format!("http://{addr}/api_new"), handle)
    }

    fn fetcher(base_url: String) -> Fetcher {
        let api = ApiSettings {
            base_url,
            user: "operador@example.com".to_string(),
            timeout_secs: 5,
            ..Default::default()
        };
        // The mock server is local; ignore any proxy configured in the environment.
        let client = Client::builder().no_proxy().build().unwrap();
        Fetcher::with_client(client, &api)
    }

    fn carabelas() -> SensorRecord {
        SensorRecord {
            name: "Carabelas".to_string(),
            site_id: SiteId::new("30"),
            site: SiteMetadata::default(),
        }
    }

    fn range() -> DateRange {
        DateRange {
            start: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(),
        }
    }

    #[test]
    fn test_resolve_defaults() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let range = DateRange::resolve(None, None, 360, today);
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2023, 6, 7).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());

        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let range = DateRange::resolve(Some(start), None, 360, today);
        assert_eq!(range.start, start);
        assert_eq!(range.query_value(), "2024-01-01@2024-06-02");
    }

    #[test]
    fn test_resolve_huge_window_does_not_overflow() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let range = DateRange::resolve(None, None, 1_000_000_000, today);
        assert_eq!(range.start, NaiveDate::MIN);
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());

        let range = DateRange::resolve(None, None, i64::MAX, today);
        assert_eq!(range.start, NaiveDate::MIN);
    }

    #[test]
    fn test_fetch_sends_query_and_parses_series() {
        let (url, server) = serve_once(
            200,
            r#"[{"hora": "2024-06-01 10:00:00", "nivel": "1.5", "bateria": "125", "senal": "21"}]"#,
        );
        let variables = vec!["nivel".to_string(), "bateria".to_string()];
        let series = fetcher(url).fetch(&carabelas(), &range(), &variables).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.last().battery, 125.0);

        let requested = server.join().unwrap();
        assert!(requested.starts_with("/api_new?"));
        assert!(requested.contains("user=operador%40example.com"));
        assert!(requested.contains("site_id=30"));
        assert!(requested.contains("query=filter_site"));
        assert!(requested.contains("date=2024-05-01%402024-06-02"));
        assert!(requested.contains("variables=nivel%2Cbateria"));
    }

    #[test]
    fn test_fetch_omits_empty_variables() {
        let (url, server) = serve_once(200, r#"[{"hora": "2024-06-01 10:00:00"}]"#);
        fetcher(url).fetch(&carabelas(), &range(), &[]).unwrap();
        assert!(!server.join().unwrap().contains("variables="));
    }

    #[test]
    fn test_fetch_empty_response_is_no_data() {
        let (url, server) = serve_once(200, "[]");
        let err = fetcher(url).fetch(&carabelas(), &range(), &[]).unwrap_err();
        assert_eq!(err, FetchError::NoData);
        server.join().unwrap();
    }

    #[test]
    fn test_fetch_non_200_is_status_error() {
        let (url, server) = serve_once(500, "internal error");
        let err = fetcher(url).fetch(&carabelas(), &range(), &[]).unwrap_err();
        assert_eq!(err, FetchError::Status(500));
        server.join().unwrap();
    }

    #[test]
    fn test_fetch_garbage_body_is_parse_error() {
        let (url, server) = serve_once(200, "<html>maintenance</html>");
        let err = fetcher(url).fetch(&carabelas(), &range(), &[]).unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
        server.join().unwrap();
    }

    #[test]
    fn test_fetch_unreachable_host_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = fetcher(format!("http://{addr}/api_new"))
            .fetch(&carabelas(), &range(), &[])
            .unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }
}
